//! # Generated Secret Lifecycle
//!
//! Creates, reads and deletes the secret publishing a bucket's storage
//! credentials, and keeps `status.generatedSecretRef` pointing at it.
//!
//! The status reference is only moved after the secret write succeeded, so a
//! reference never points at a secret that was never written. When the status
//! write fails, the secret just written is removed again.

use crate::controller::backupbucket::naming;
use crate::controller::backupbucket::store::{BucketStatusStore, SecretStore};
use crate::crd::{BackupBucket, BackupBucketStatusPatch, SecretReference};
use crate::provider::azure::ignore_not_found;
use anyhow::Result;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Secret data key holding the storage account name
pub const STORAGE_ACCOUNT_FIELD: &str = "storageAccount";
/// Secret data key holding the storage account access key
pub const STORAGE_KEY_FIELD: &str = "storageKey";
/// Secret data key holding the blob service domain
pub const DOMAIN_FIELD: &str = "domain";

/// Label linking a generated secret to its bucket
pub const BUCKET_LABEL: &str = "backup.microscaler.io/bucket";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretRefError {
    #[error("generated secret reference is missing")]
    MissingReference,
    #[error("secret {secret} has no {field} field")]
    MissingField { secret: String, field: &'static str },
}

/// The three fields published in a generated secret
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub account_name: String,
    pub access_key: String,
    pub domain: String,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("account_name", &self.account_name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl StorageCredentials {
    /// Read the credentials back out of a generated secret
    pub fn from_secret(secret: &Secret) -> Result<Self, SecretRefError> {
        let field = |field: &'static str| {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(field))
                .and_then(|value| String::from_utf8(value.0.clone()).ok())
                .ok_or_else(|| SecretRefError::MissingField {
                    secret: secret.name_any(),
                    field,
                })
        };
        Ok(Self {
            account_name: field(STORAGE_ACCOUNT_FIELD)?,
            access_key: field(STORAGE_KEY_FIELD)?,
            domain: field(DOMAIN_FIELD)?,
        })
    }
}

/// Build the generated secret object
#[must_use]
pub fn generated_secret(
    name: &str,
    namespace: &str,
    bucket_name: &str,
    credentials: &StorageCredentials,
) -> Secret {
    let data = BTreeMap::from([
        (
            STORAGE_ACCOUNT_FIELD.to_string(),
            ByteString(credentials.account_name.as_bytes().to_vec()),
        ),
        (
            STORAGE_KEY_FIELD.to_string(),
            ByteString(credentials.access_key.as_bytes().to_vec()),
        ),
        (
            DOMAIN_FIELD.to_string(),
            ByteString(credentials.domain.as_bytes().to_vec()),
        ),
    ]);
    let labels = BTreeMap::from([
        (BUCKET_LABEL.to_string(), bucket_name.to_string()),
        (
            MANAGED_BY_LABEL.to_string(),
            crate::constants::FIELD_MANAGER.to_string(),
        ),
    ]);

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// The bucket's current generated secret reference, if any
#[must_use]
pub fn generated_secret_ref(bucket: &BackupBucket) -> Option<&SecretReference> {
    bucket
        .status
        .as_ref()
        .and_then(|status| status.generated_secret_ref.as_ref())
}

pub struct SecretLifecycleManager {
    secrets: Arc<dyn SecretStore>,
    buckets: Arc<dyn BucketStatusStore>,
    namespace: String,
}

impl std::fmt::Debug for SecretLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretLifecycleManager")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SecretLifecycleManager {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        buckets: Arc<dyn BucketStatusStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            buckets,
            namespace: namespace.into(),
        }
    }

    /// Write a freshly named secret and point the bucket status at it
    ///
    /// Returns the bucket as updated by the status write.
    pub async fn create_or_update(
        &self,
        bucket: &BackupBucket,
        account_name: &str,
        key: &str,
        domain: &str,
    ) -> Result<BackupBucket> {
        self.create_or_update_at(bucket, account_name, key, domain, Utc::now())
            .await
    }

    /// [`Self::create_or_update`] with the naming timestamp supplied by the caller
    pub async fn create_or_update_at(
        &self,
        bucket: &BackupBucket,
        account_name: &str,
        key: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<BackupBucket> {
        let bucket_name = bucket.name_any();
        let name = naming::generated_secret_name(&bucket_name, now);
        let credentials = StorageCredentials {
            account_name: account_name.to_string(),
            access_key: key.to_string(),
            domain: domain.to_string(),
        };

        self.secrets
            .apply(generated_secret(
                &name,
                &self.namespace,
                &bucket_name,
                &credentials,
            ))
            .await?;

        let reference = SecretReference::new(name, self.namespace.clone());
        let patch = BackupBucketStatusPatch::generated_secret_ref(reference.clone());
        match self.buckets.patch_status(bucket, &patch).await {
            Ok(updated) => Ok(updated),
            Err(err) => {
                // Nothing points at the new secret, so it would outlive the bucket
                if generated_secret_ref(bucket) != Some(&reference) {
                    if let Err(cleanup_err) = self
                        .secrets
                        .delete(&reference.namespace, &reference.name)
                        .await
                    {
                        warn!(
                            "Failed to remove unreferenced secret {}: {:#}",
                            reference, cleanup_err
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// The secret referenced by the bucket status
    ///
    /// `None` when there is no reference or the referenced secret is gone.
    pub async fn get(&self, bucket: &BackupBucket) -> Result<Option<Secret>> {
        let Some(reference) = generated_secret_ref(bucket) else {
            return Ok(None);
        };
        ignore_not_found(
            self.secrets
                .get(&reference.namespace, &reference.name)
                .await,
        )
    }

    /// Delete the secret referenced by the bucket status; no reference is a no-op
    pub async fn delete(&self, bucket: &BackupBucket) -> Result<()> {
        match generated_secret_ref(bucket) {
            Some(reference) => self.delete_by_ref(Some(reference)).await,
            None => Ok(()),
        }
    }

    /// Delete a secret by reference; store errors, including not-found, are returned as is
    pub async fn delete_by_ref(&self, reference: Option<&SecretReference>) -> Result<()> {
        let reference = reference.ok_or(SecretRefError::MissingReference)?;
        self.secrets
            .delete(&reference.namespace, &reference.name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> StorageCredentials {
        StorageCredentials {
            account_name: "bkp0123456789abcde".to_string(),
            access_key: "c2VjcmV0".to_string(),
            domain: "blob.core.windows.net".to_string(),
        }
    }

    #[test]
    fn test_generated_secret_round_trips_credentials() {
        let secret = generated_secret("generated-bucket-b-1234", "garden", "b", &credentials());
        assert_eq!(secret.metadata.namespace.as_deref(), Some("garden"));
        assert_eq!(
            secret
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(BUCKET_LABEL))
                .map(String::as_str),
            Some("b")
        );
        assert_eq!(StorageCredentials::from_secret(&secret).unwrap(), credentials());
    }

    #[test]
    fn test_from_secret_missing_field() {
        let mut secret = generated_secret("s", "garden", "b", &credentials());
        if let Some(data) = secret.data.as_mut() {
            data.remove(DOMAIN_FIELD);
        }
        assert_eq!(
            StorageCredentials::from_secret(&secret),
            Err(SecretRefError::MissingField {
                secret: "s".to_string(),
                field: DOMAIN_FIELD
            })
        );
    }

    #[test]
    fn test_credentials_debug_hides_key() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("bkp0123456789abcde"));
    }
}
