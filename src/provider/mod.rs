//! # Provider Modules
//!
//! Cloud resource provider seams used to back a bucket with storage.
//!
//! Each provider implements:
//! - `ResourceGroupClient` for the resource group hosting the storage account
//! - `StorageAccountClient` for the storage account and its access keys
//!
//! Errors are returned in the provider's native shapes so that
//! `provider::azure::errors` can classify them.

use anyhow::Result;
use async_trait::async_trait;

/// Resource group operations
#[async_trait]
pub trait ResourceGroupClient: Send + Sync {
    /// Create the resource group, or update it in place if it already exists
    async fn create_or_update(&self, name: &str, location: &str) -> Result<()>;
}

/// Storage account operations
#[async_trait]
pub trait StorageAccountClient: Send + Sync {
    /// Create the storage account, or update it in place if it already exists
    async fn create_storage_account(
        &self,
        resource_group: &str,
        account_name: &str,
        location: &str,
    ) -> Result<()>;

    /// Return the first access key of the storage account
    async fn list_storage_account_key(&self, resource_group: &str, account_name: &str)
        -> Result<String>;

    /// Regenerate a key and return the new key material
    ///
    /// `current_key` is a hint naming the key in use, not a precondition.
    async fn rotate_key(
        &self,
        resource_group: &str,
        account_name: &str,
        current_key: &str,
    ) -> Result<String>;
}

pub mod azure;
