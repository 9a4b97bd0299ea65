//! # Bucket Provisioner
//!
//! Makes sure the resource group and storage account behind a bucket exist
//! and hands back the credentials to reach it.
//!
//! Every step is create-or-update, so `ensure` can be repeated after a
//! partial failure. Errors are returned exactly as the provider produced them.

use crate::controller::backupbucket::naming;
use crate::controller::utils::with_deadline;
use crate::crd::BackupBucket;
use crate::provider::{ResourceGroupClient, StorageAccountClient};
use anyhow::Result;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;

/// Storage account name and one of its access keys
#[derive(Clone, PartialEq, Eq)]
pub struct BucketCredentials {
    pub account_name: String,
    pub access_key: String,
}

impl std::fmt::Debug for BucketCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketCredentials")
            .field("account_name", &self.account_name)
            .finish_non_exhaustive()
    }
}

pub struct BucketProvisioner {
    resource_groups: Arc<dyn ResourceGroupClient>,
    storage_accounts: Arc<dyn StorageAccountClient>,
    operation_timeout: Option<Duration>,
}

impl std::fmt::Debug for BucketProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketProvisioner")
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl BucketProvisioner {
    pub fn new(
        resource_groups: Arc<dyn ResourceGroupClient>,
        storage_accounts: Arc<dyn StorageAccountClient>,
    ) -> Self {
        Self {
            resource_groups,
            storage_accounts,
            operation_timeout: None,
        }
    }

    /// Bound every provider call; `None` waits indefinitely
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Ensure the resource group and storage account exist and return the first access key
    pub async fn ensure(&self, bucket: &BackupBucket) -> Result<BucketCredentials> {
        let bucket_name = bucket.name_any();
        let region = bucket.spec.region.as_str();
        let resource_group = naming::resource_group_name(&bucket_name);
        let account_name = naming::storage_account_name(&bucket_name);

        with_deadline(
            "create or update resource group",
            self.operation_timeout,
            self.resource_groups.create_or_update(&resource_group, region),
        )
        .await?;

        with_deadline(
            "create or update storage account",
            self.operation_timeout,
            self.storage_accounts
                .create_storage_account(&resource_group, &account_name, region),
        )
        .await?;

        let access_key = with_deadline(
            "list storage account keys",
            self.operation_timeout,
            self.storage_accounts
                .list_storage_account_key(&resource_group, &account_name),
        )
        .await?;

        Ok(BucketCredentials {
            account_name,
            access_key,
        })
    }

    /// Regenerate a storage account key and return the new key
    pub async fn rotate_key(
        &self,
        resource_group: &str,
        account_name: &str,
        current_key: &str,
    ) -> Result<String> {
        with_deadline(
            "rotate storage account key",
            self.operation_timeout,
            self.storage_accounts
                .rotate_key(resource_group, account_name, current_key),
        )
        .await
    }
}
