//! # Custom Resource Definitions
//!
//! CRD types for the Backup Bucket Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `BackupBucket` specification and the cloud configuration override
//! - `status.rs` - Status types, the generated secret reference and status patches

mod spec;
mod status;

pub use spec::{BackupBucket, BackupBucketSpec, CloudConfiguration};
pub use status::{BackupBucketStatus, BackupBucketStatusPatch, SecretReference};
