//! # Azure Provider
//!
//! - `cloud`: which Azure cloud a bucket lives in and its endpoints
//! - `errors`: classification of Azure and Kubernetes error shapes
//! - `arm`: Resource Manager client for resource groups and storage accounts

pub mod arm;
pub mod cloud;
pub mod errors;

// Re-export for convenience
pub use arm::{ArmClient, AzureCredentialConfig};
pub use cloud::{CloudConfigError, CloudRealm};
pub use errors::{
    classify, filter_not_found, ignore_not_found, is_not_found, is_unauthorized, ErrorCategory,
};
