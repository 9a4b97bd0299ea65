//! # Key Rotation Policy
//!
//! A generated secret is stale once it was created more than `max_age` ago.
//! Rotating regenerates a storage account key and publishes it in a new
//! generated secret; the superseded secret is left for the caller to delete.

use crate::constants::DEFAULT_KEY_ROTATION_MAX_AGE_DAYS;
use crate::controller::backupbucket::provisioner::BucketProvisioner;
use crate::controller::backupbucket::secret::{SecretLifecycleManager, StorageCredentials};
use crate::crd::BackupBucket;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Secret;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    max_age: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_KEY_ROTATION_MAX_AGE_DAYS))
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Whether the secret is older than `max_age`, measured against the current time
    #[must_use]
    pub fn should_rotate(&self, secret: &Secret) -> bool {
        self.should_rotate_at(secret, Utc::now())
    }

    /// Whether the secret was created strictly before `now - max_age`
    ///
    /// A secret without a readable creation timestamp is stale.
    #[must_use]
    pub fn should_rotate_at(&self, secret: &Secret, now: DateTime<Utc>) -> bool {
        let Some(created) = creation_time(secret) else {
            return true;
        };
        // A threshold before the earliest representable time leaves nothing stale
        now.checked_sub_signed(self.max_age)
            .is_some_and(|threshold| created < threshold)
    }

    /// Regenerate the key behind `secret` and publish it in a new generated secret
    ///
    /// The new secret carries `domain`, the blob domain of the bucket's cloud.
    /// Returns the bucket with its status pointing at the new secret.
    #[allow(
        clippy::too_many_arguments,
        reason = "collaborators plus the account coordinates"
    )]
    pub async fn rotate(
        &self,
        provisioner: &BucketProvisioner,
        secrets: &SecretLifecycleManager,
        bucket: &BackupBucket,
        resource_group: &str,
        account_name: &str,
        domain: &str,
        secret: &Secret,
    ) -> Result<BackupBucket> {
        let current = StorageCredentials::from_secret(secret)?;
        let key = provisioner
            .rotate_key(resource_group, account_name, &current.access_key)
            .await?;
        secrets
            .create_or_update(bucket, account_name, &key, domain)
            .await
    }
}

/// Creation timestamp of a secret, read through its RFC 3339 wire form
#[must_use]
pub fn creation_time(secret: &Secret) -> Option<DateTime<Utc>> {
    let timestamp = secret.metadata.creation_timestamp.as_ref()?;
    let rendered = serde_json::to_value(timestamp).ok()?;
    DateTime::parse_from_rfc3339(rendered.as_str()?)
        .ok()
        .map(|created| created.with_timezone(&Utc))
}
