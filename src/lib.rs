//! Backup Bucket Controller Library
//!
//! Provisions Azure storage accounts backing `BackupBucket` resources and
//! keeps the generated credential secrets in sync and rotated.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
