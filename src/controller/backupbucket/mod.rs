//! # Backup Bucket
//!
//! Provisioning and credential lifecycle of `BackupBucket` resources.
//!
//! - `naming`: storage account, resource group and generated secret names
//! - `provisioner`: resource group and storage account provisioning
//! - `secret`: generated secret lifecycle and the status back-reference
//! - `rotation`: key rotation policy
//! - `store`: Kubernetes persistence for secrets and bucket status
//! - `actuator`: reconcile and delete entry points

pub mod actuator;
pub mod naming;
pub mod provisioner;
pub mod rotation;
pub mod secret;
pub mod store;

pub use actuator::{Actuator, ReconcileOutcome};
pub use provisioner::{BucketCredentials, BucketProvisioner};
pub use rotation::RotationPolicy;
pub use secret::{SecretLifecycleManager, SecretRefError, StorageCredentials};
pub use store::{BucketStatusStore, KubeBucketStatusStore, KubeSecretStore, SecretStore};
