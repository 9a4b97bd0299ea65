//! Common test utilities
//!
//! In-memory fakes for the provider and Kubernetes seams, so the bucket
//! lifecycle can be driven end to end without a cluster or Azure account.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use backup_bucket_controller::controller::backupbucket::{BucketStatusStore, SecretStore};
use backup_bucket_controller::crd::{
    BackupBucket, BackupBucketSpec, BackupBucketStatus, BackupBucketStatusPatch, CloudConfiguration,
};
use backup_bucket_controller::provider::{ResourceGroupClient, StorageAccountClient};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

pub const SECRET_NAMESPACE: &str = "garden";

/// Build a bucket as the API server would return it
pub fn bucket(name: &str, region: &str, cloud: Option<&str>) -> BackupBucket {
    let mut bucket = BackupBucket::new(
        name,
        BackupBucketSpec {
            region: region.to_string(),
            cloud_configuration: cloud.map(CloudConfiguration::new),
        },
    );
    bucket.metadata.resource_version = Some("1".to_string());
    bucket.metadata.generation = Some(1);
    bucket
}

pub fn kube_time(at: DateTime<Utc>) -> Time {
    serde_json::from_value(serde_json::json!(at.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .expect("valid RFC 3339 timestamp")
}

pub fn not_found(kind: &str, name: &str) -> anyhow::Error {
    kube::Error::Api(
        kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{kind} \"{name}\" not found"),
            reason: "NotFound".to_string(),
            code: 404,
        }
        .into(),
    )
    .into()
}

/// Secret store keyed by namespace and name
///
/// New secrets get a creation timestamp from the store's clock; re-applied
/// secrets keep the timestamp they were created with.
#[derive(Debug)]
pub struct InMemorySecretStore {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    clock: Mutex<DateTime<Utc>>,
    applies: Mutex<usize>,
    fail_apply: Mutex<Option<String>>,
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self {
            secrets: Mutex::new(BTreeMap::new()),
            clock: Mutex::new(Utc::now()),
            applies: Mutex::new(0),
            fail_apply: Mutex::new(None),
        }
    }
}

impl InMemorySecretStore {
    /// Make the next `apply` fail without writing anything
    pub fn fail_next_apply(&self, message: &str) {
        *self.fail_apply.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = now;
    }

    /// Backdate an existing secret
    pub fn set_created(&self, namespace: &str, name: &str, created: DateTime<Utc>) {
        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("secret exists");
        secret.metadata.creation_timestamp = Some(kube_time(created));
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.secrets
            .lock()
            .unwrap()
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.secrets
            .lock()
            .unwrap()
            .keys()
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }

    pub fn applies(&self) -> usize {
        *self.applies.lock().unwrap()
    }

    pub fn insert(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(key, secret);
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn apply(&self, mut secret: Secret) -> Result<Secret> {
        if let Some(message) = self.fail_apply.lock().unwrap().take() {
            anyhow::bail!(message);
        }
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        let mut secrets = self.secrets.lock().unwrap();
        secret.metadata.creation_timestamp = match secrets.get(&key) {
            Some(existing) => existing.metadata.creation_timestamp.clone(),
            None => Some(kube_time(*self.clock.lock().unwrap())),
        };
        secrets.insert(key, secret.clone());
        *self.applies.lock().unwrap() += 1;
        Ok(secret)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("secrets", name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("secrets", name))
    }
}

/// Status store applying patches to a private copy of each bucket
#[derive(Debug, Default)]
pub struct InMemoryBucketStatusStore {
    patches: Mutex<Vec<BackupBucketStatusPatch>>,
    fail_with: Mutex<Option<String>>,
}

impl InMemoryBucketStatusStore {
    pub fn patches(&self) -> Vec<BackupBucketStatusPatch> {
        self.patches.lock().unwrap().clone()
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl BucketStatusStore for InMemoryBucketStatusStore {
    async fn patch_status(
        &self,
        bucket: &BackupBucket,
        patch: &BackupBucketStatusPatch,
    ) -> Result<BackupBucket> {
        if let Some(message) = self.fail_with.lock().unwrap().take() {
            anyhow::bail!(message);
        }
        self.patches.lock().unwrap().push(patch.clone());

        let mut updated = bucket.clone();
        let mut status = updated.status.take().unwrap_or_default();
        patch.apply_to(&mut status);
        updated.status = Some(status);
        let version: u64 = bucket
            .metadata
            .resource_version
            .as_deref()
            .and_then(|version| version.parse().ok())
            .unwrap_or_default();
        updated.metadata.resource_version = Some((version + 1).to_string());
        Ok(updated)
    }
}

/// Provider calls a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AzureOperation {
    CreateResourceGroup,
    CreateStorageAccount,
    ListKeys,
    RotateKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub resource_group: String,
    pub location: String,
    pub keys: [String; 2],
}

/// Resource groups and storage accounts with deterministic key material
#[derive(Debug, Default)]
pub struct InMemoryAzure {
    resource_groups: Mutex<HashMap<String, String>>,
    accounts: Mutex<HashMap<String, StorageAccount>>,
    account_calls: Mutex<usize>,
    rotations: Mutex<usize>,
    fail_with: Mutex<Option<anyhow::Error>>,
    fail_on: Mutex<HashMap<AzureOperation, anyhow::Error>>,
}

impl InMemoryAzure {
    pub fn resource_group_location(&self, name: &str) -> Option<String> {
        self.resource_groups.lock().unwrap().get(name).cloned()
    }

    pub fn account(&self, name: &str) -> Option<StorageAccount> {
        self.accounts.lock().unwrap().get(name).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn account_calls(&self) -> usize {
        *self.account_calls.lock().unwrap()
    }

    pub fn rotations(&self) -> usize {
        *self.rotations.lock().unwrap()
    }

    /// Make the next provider call fail with `err`
    pub fn fail_next(&self, err: anyhow::Error) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    /// Make the next call of `operation` fail with `err`, leaving other calls alone
    pub fn fail_on(&self, operation: AzureOperation, err: anyhow::Error) {
        self.fail_on.lock().unwrap().insert(operation, err);
    }

    fn injected_failure(&self, operation: AzureOperation) -> Result<()> {
        if let Some(err) = self.fail_with.lock().unwrap().take() {
            return Err(err);
        }
        match self.fail_on.lock().unwrap().remove(&operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceGroupClient for InMemoryAzure {
    async fn create_or_update(&self, name: &str, location: &str) -> Result<()> {
        self.injected_failure(AzureOperation::CreateResourceGroup)?;
        self.resource_groups
            .lock()
            .unwrap()
            .insert(name.to_string(), location.to_string());
        Ok(())
    }
}

#[async_trait]
impl StorageAccountClient for InMemoryAzure {
    async fn create_storage_account(
        &self,
        resource_group: &str,
        account_name: &str,
        location: &str,
    ) -> Result<()> {
        self.injected_failure(AzureOperation::CreateStorageAccount)?;
        *self.account_calls.lock().unwrap() += 1;
        self.accounts
            .lock()
            .unwrap()
            .entry(account_name.to_string())
            .or_insert_with(|| StorageAccount {
                resource_group: resource_group.to_string(),
                location: location.to_string(),
                keys: [format!("{account_name}-key1-0"), format!("{account_name}-key2-0")],
            });
        Ok(())
    }

    async fn list_storage_account_key(
        &self,
        _resource_group: &str,
        account_name: &str,
    ) -> Result<String> {
        self.injected_failure(AzureOperation::ListKeys)?;
        self.accounts
            .lock()
            .unwrap()
            .get(account_name)
            .map(|account| account.keys[0].clone())
            .ok_or_else(|| not_found("storageAccounts", account_name))
    }

    async fn rotate_key(
        &self,
        _resource_group: &str,
        account_name: &str,
        current_key: &str,
    ) -> Result<String> {
        self.injected_failure(AzureOperation::RotateKey)?;
        let mut rotations = self.rotations.lock().unwrap();
        *rotations += 1;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(account_name)
            .ok_or_else(|| not_found("storageAccounts", account_name))?;
        // Regenerate the key not in use so the current one stays valid
        let slot = usize::from(account.keys[0] == current_key);
        account.keys[slot] = format!("{account_name}-key{}-{}", slot + 1, *rotations);
        Ok(account.keys[slot].clone())
    }
}

/// Status with a generated secret reference, for buckets that were reconciled before
pub fn status_with_ref(name: &str) -> BackupBucketStatus {
    BackupBucketStatus {
        generated_secret_ref: Some(
            backup_bucket_controller::crd::SecretReference::new(name, SECRET_NAMESPACE),
        ),
        ..Default::default()
    }
}
