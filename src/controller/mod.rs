//! # Controller
//!
//! Core controller modules for the Backup Bucket Controller.
//!
//! - `backupbucket`: provisioning and credential lifecycle of a bucket
//! - `reconciler`: `kube_runtime` reconcile and error policy
//! - `server`: HTTP server for metrics and health checks
//! - `utils`: deadlines for external calls

pub mod backupbucket;
pub mod reconciler;
pub mod server;
pub mod utils;
