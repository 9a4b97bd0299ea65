//! # Stores
//!
//! Kubernetes persistence used by the secret lifecycle.
//!
//! - [`SecretStore`] writes, reads and deletes generated secrets
//! - [`BucketStatusStore`] applies partial status updates to a `BackupBucket`
//!
//! Not-found surfaces as `kube::Error::Api` with code 404, which the error
//! classifier recognises.

use crate::constants::FIELD_MANAGER;
use crate::crd::{BackupBucket, BackupBucketStatusPatch};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Storage for generated secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create the secret, or replace the fields this controller owns
    async fn apply(&self, secret: Secret) -> Result<Secret>;

    async fn get(&self, namespace: &str, name: &str) -> Result<Secret>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Partial updates of a bucket's status
#[async_trait]
pub trait BucketStatusStore: Send + Sync {
    /// Write the fields set in `patch` and return the updated bucket
    ///
    /// Fails if `bucket` is no longer the latest version.
    async fn patch_status(
        &self,
        bucket: &BackupBucket,
        patch: &BackupBucketStatusPatch,
    ) -> Result<BackupBucket>;
}

/// [`SecretStore`] backed by the Kubernetes API, writing with server-side apply
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn apply(&self, secret: Secret) -> Result<Secret> {
        let namespace = secret
            .metadata
            .namespace
            .clone()
            .context("secret has no namespace")?;
        let name = secret.metadata.name.clone().context("secret has no name")?;

        debug!("Applying secret {}/{}", namespace, name);
        let applied = self
            .api(&namespace)
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await?;
        Ok(applied)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Secret> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        debug!("Deleting secret {}/{}", namespace, name);
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// [`BucketStatusStore`] backed by the Kubernetes API
///
/// Sends a JSON merge patch on the status subresource. The patch carries the
/// bucket's `resourceVersion`, so the API server rejects it with a conflict if
/// the bucket changed in the meantime.
#[derive(Clone)]
pub struct KubeBucketStatusStore {
    client: Client,
}

impl std::fmt::Debug for KubeBucketStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBucketStatusStore").finish_non_exhaustive()
    }
}

impl KubeBucketStatusStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BucketStatusStore for KubeBucketStatusStore {
    async fn patch_status(
        &self,
        bucket: &BackupBucket,
        patch: &BackupBucketStatusPatch,
    ) -> Result<BackupBucket> {
        let api: Api<BackupBucket> = Api::all(self.client.clone());
        let body = status_merge_patch(bucket, patch)?;
        let updated = api
            .patch_status(
                &bucket.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&body),
            )
            .await?;
        Ok(updated)
    }
}

/// Merge patch body for a status delta, pinned to the bucket's resource version
pub fn status_merge_patch(
    bucket: &BackupBucket,
    patch: &BackupBucketStatusPatch,
) -> Result<serde_json::Value> {
    let mut body = serde_json::json!({
        "status": serde_json::to_value(patch).context("Failed to serialize status patch")?,
    });
    if let Some(resource_version) = bucket.resource_version() {
        body["metadata"] = serde_json::json!({ "resourceVersion": resource_version });
    }
    Ok(body)
}
