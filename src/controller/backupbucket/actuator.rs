//! # Actuator
//!
//! Single entry point for reconciling and deleting a `BackupBucket`.
//!
//! ## Reconciliation Flow
//!
//! 1. Resolve the Azure cloud from `spec.cloudConfiguration` / `spec.region`
//! 2. Ensure the resource group and storage account exist
//! 3. Read the generated secret referenced by the status
//! 4. Missing secret: publish the ensured credentials
//! 5. Stale secret: rotate the key, publish it, delete the superseded secret
//! 6. Fresh secret: nothing to do

use crate::controller::backupbucket::naming;
use crate::controller::backupbucket::provisioner::BucketProvisioner;
use crate::controller::backupbucket::rotation::RotationPolicy;
use crate::controller::backupbucket::secret::{generated_secret_ref, SecretLifecycleManager};
use crate::crd::{BackupBucket, SecretReference};
use crate::observability::metrics;
use crate::provider::azure::{filter_not_found, CloudRealm};
use anyhow::Result;
use kube::ResourceExt;
use tracing::{debug, info};

/// Result of a successful reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub account_name: String,
    pub secret_ref: Option<SecretReference>,
    pub rotated: bool,
    /// Latest version of the bucket, including any status written during reconciliation
    pub bucket: BackupBucket,
}

#[derive(Debug)]
pub struct Actuator {
    provisioner: BucketProvisioner,
    secrets: SecretLifecycleManager,
    rotation: RotationPolicy,
}

impl Actuator {
    pub fn new(
        provisioner: BucketProvisioner,
        secrets: SecretLifecycleManager,
        rotation: RotationPolicy,
    ) -> Self {
        Self {
            provisioner,
            secrets,
            rotation,
        }
    }

    pub async fn reconcile(&self, bucket: &BackupBucket) -> Result<ReconcileOutcome> {
        let bucket_name = bucket.name_any();
        let realm = CloudRealm::resolve(
            bucket.spec.cloud_configuration.as_ref(),
            Some(bucket.spec.region.as_str()),
        )?;
        let domain = realm.storage_domain();
        debug!("Bucket {} resolved to cloud {}", bucket_name, realm);

        let credentials = self.provisioner.ensure(bucket).await?;

        let (updated, rotated) = match self.secrets.get(bucket).await? {
            None => {
                info!(
                    "Publishing credentials of storage account {} for bucket {}",
                    credentials.account_name, bucket_name
                );
                let updated = self
                    .secrets
                    .create_or_update(
                        bucket,
                        &credentials.account_name,
                        &credentials.access_key,
                        domain,
                    )
                    .await?;
                metrics::increment_generated_secrets_written();
                (updated, false)
            }
            Some(secret) if self.rotation.should_rotate(&secret) => {
                let superseded = generated_secret_ref(bucket).cloned();
                info!(
                    "Generated secret {} of bucket {} is older than {} days, rotating key",
                    secret.name_any(),
                    bucket_name,
                    self.rotation.max_age().num_days()
                );
                let updated = self
                    .rotation
                    .rotate(
                        &self.provisioner,
                        &self.secrets,
                        bucket,
                        &naming::resource_group_name(&bucket_name),
                        &credentials.account_name,
                        domain,
                        &secret,
                    )
                    .await?;
                metrics::increment_key_rotations();
                metrics::increment_generated_secrets_written();

                // Same-second rotation reuses the name; the superseded secret is the new one
                if superseded.as_ref() != generated_secret_ref(&updated) {
                    self.delete_superseded(superseded.as_ref()).await?;
                }
                (updated, true)
            }
            Some(_) => {
                debug!("Generated secret of bucket {} is current", bucket_name);
                (bucket.clone(), false)
            }
        };

        Ok(ReconcileOutcome {
            account_name: credentials.account_name,
            secret_ref: generated_secret_ref(&updated).cloned(),
            rotated,
            bucket: updated,
        })
    }

    /// Delete the bucket's generated secret; a secret that is already gone is fine
    ///
    /// The storage account and resource group are left in place.
    pub async fn delete(&self, bucket: &BackupBucket) -> Result<()> {
        match filter_not_found(self.secrets.delete(bucket).await.err()) {
            Some(err) => Err(err),
            None => {
                info!("Removed generated secret of bucket {}", bucket.name_any());
                Ok(())
            }
        }
    }

    async fn delete_superseded(&self, reference: Option<&SecretReference>) -> Result<()> {
        let Some(reference) = reference else {
            return Ok(());
        };
        match filter_not_found(self.secrets.delete_by_ref(Some(reference)).await.err()) {
            Some(err) => Err(err),
            None => {
                info!("Deleted superseded generated secret {}", reference);
                metrics::increment_generated_secrets_deleted();
                Ok(())
            }
        }
    }
}
