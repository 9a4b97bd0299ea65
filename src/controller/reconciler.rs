//! # Reconciler
//!
//! Runtime glue between `kube_runtime::Controller` and the [`Actuator`].
//!
//! The reconciler:
//! - Keeps a finalizer on every `BackupBucket` so the generated secret can be
//!   removed when the bucket is deleted
//! - Builds an Azure Resource Manager client for the bucket's cloud
//! - Runs the actuator and records the outcome in the bucket status
//! - Chooses how long to wait before the next attempt
//!
//! ## Requeue Policy
//!
//! - Success: after the resync interval, so key age is re-checked
//! - Unauthorized: after the (longer) unauthorized interval
//! - Cloud configuration errors: not until the bucket changes
//! - Anything else: after the flat error interval

use crate::config::ControllerConfig;
use crate::constants::{BUCKET_FINALIZER, FIELD_MANAGER, PHASE_FAILED, PHASE_PENDING, PHASE_READY};
use crate::controller::backupbucket::{
    Actuator, BucketProvisioner, BucketStatusStore, KubeBucketStatusStore, KubeSecretStore,
    ReconcileOutcome, RotationPolicy, SecretLifecycleManager,
};
use crate::crd::{BackupBucket, BackupBucketStatusPatch};
use crate::observability::metrics;
use crate::provider::azure::{
    classify, ArmClient, AzureCredentialConfig, CloudConfigError, CloudRealm, ErrorCategory,
};
use anyhow::{Context, Result};
use azure_core::credentials::TokenCredential;
use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0:#}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ReconciliationFailed(err) => classify(err),
        }
    }

    /// Whether the bucket's cloud configuration cannot be resolved
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::ReconciliationFailed(err) => {
                err.chain().any(|cause| cause.is::<CloudConfigError>())
            }
        }
    }
}

/// Shared state for all reconciliations
pub struct Reconciler {
    pub client: Client,
    pub config: ControllerConfig,
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// # Errors
    /// Returns an error if the Azure credential or HTTP client cannot be created
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self> {
        let credential = AzureCredentialConfig::from_client_id(config.client_id.clone()).build()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            config,
            http,
            credential,
        })
    }

    fn status_store(&self) -> KubeBucketStatusStore {
        KubeBucketStatusStore::new(self.client.clone())
    }

    /// Actuator wired to Azure in `realm` and to the Kubernetes stores
    fn actuator(&self, realm: CloudRealm) -> Actuator {
        let arm = Arc::new(ArmClient::new(
            self.http.clone(),
            Arc::clone(&self.credential),
            self.config.subscription_id.clone(),
            realm,
            self.config.lro_poll_interval(),
        ));
        let storage_accounts = Arc::clone(&arm);
        let provisioner = BucketProvisioner::new(arm, storage_accounts)
            .with_operation_timeout(self.config.operation_timeout());
        let secrets = SecretLifecycleManager::new(
            Arc::new(KubeSecretStore::new(self.client.clone())),
            Arc::new(self.status_store()),
            self.config.generated_secret_namespace.clone(),
        );
        Actuator::new(
            provisioner,
            secrets,
            RotationPolicy::new(self.config.key_rotation_max_age()),
        )
    }
}

/// Entry point called by `kube_runtime::Controller`
pub async fn reconcile(
    bucket: Arc<BackupBucket>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = bucket.name_any();
    metrics::increment_reconciliations();

    let span = info_span!("reconcile", resource.name = %name, resource.kind = "BackupBucket");
    let result: Result<Action, ReconcilerError> = async {
        if bucket.metadata.deletion_timestamp.is_some() {
            return cleanup(&bucket, &ctx).await;
        }
        if !has_finalizer(&bucket) {
            info!("Adding finalizer to BackupBucket {}", name);
            add_finalizer(&bucket, &ctx).await?;
            return Ok(Action::requeue(Duration::from_secs(1)));
        }
        apply(&bucket, &ctx).await
    }
    .instrument(span)
    .await;

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    result
}

/// Entry point called by `kube_runtime::Controller` when [`reconcile`] fails
pub fn error_policy(
    bucket: Arc<BackupBucket>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let category = error.category();
    metrics::increment_reconciliation_errors(category.as_str());
    error!(
        "Reconciliation error for {} ({}): {}",
        bucket.name_any(),
        category.as_str(),
        error
    );
    match requeue_after(error, &ctx.config) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Delay before retrying a failed reconciliation; `None` waits for a spec change
#[must_use]
pub fn requeue_after(error: &ReconcilerError, config: &ControllerConfig) -> Option<Duration> {
    if error.is_configuration_error() {
        return None;
    }
    match error.category() {
        ErrorCategory::Unauthorized => Some(config.unauthorized_requeue_duration()),
        ErrorCategory::NotFound | ErrorCategory::Generic => {
            Some(config.reconciliation_error_requeue_duration())
        }
    }
}

async fn apply(bucket: &BackupBucket, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = bucket.name_any();
    let outcome: Result<ReconcileOutcome> = async {
        let realm = CloudRealm::resolve(
            bucket.spec.cloud_configuration.as_ref(),
            Some(bucket.spec.region.as_str()),
        )?;
        ctx.actuator(realm).reconcile(bucket).await
    }
    .await;

    match outcome {
        Ok(outcome) => {
            if needs_ready_status(&outcome) {
                let patch = ready_status(bucket.metadata.generation, &outcome, Utc::now());
                ctx.status_store()
                    .patch_status(&outcome.bucket, &patch)
                    .await
                    .context("Failed to update BackupBucket status")?;
            }
            info!(
                "BackupBucket {} reconciled (storage account {}, rotated: {})",
                name, outcome.account_name, outcome.rotated
            );
            Ok(Action::requeue(ctx.config.resync_interval()))
        }
        Err(err) => {
            let patch = failed_status(bucket.metadata.generation, &err, Utc::now());
            if needs_failed_status(bucket, &patch) {
                if let Err(status_err) = ctx.status_store().patch_status(bucket, &patch).await {
                    warn!("Failed to record failure in status of {}: {:#}", name, status_err);
                }
            }
            Err(err.into())
        }
    }
}

async fn cleanup(bucket: &BackupBucket, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = bucket.name_any();
    if !has_finalizer(bucket) {
        return Ok(Action::await_change());
    }

    // Deletion never calls Azure, so an unresolvable cloud does not block it
    let realm = CloudRealm::resolve(
        bucket.spec.cloud_configuration.as_ref(),
        Some(bucket.spec.region.as_str()),
    )
    .unwrap_or(CloudRealm::Public);
    ctx.actuator(realm).delete(bucket).await?;

    remove_finalizer(bucket, ctx).await?;
    info!("BackupBucket {} cleaned up", name);
    Ok(Action::await_change())
}

fn has_finalizer(bucket: &BackupBucket) -> bool {
    bucket
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == BUCKET_FINALIZER))
}

async fn add_finalizer(bucket: &BackupBucket, ctx: &Reconciler) -> Result<()> {
    let mut finalizers = bucket.finalizers().to_vec();
    finalizers.push(BUCKET_FINALIZER.to_string());
    patch_finalizers(bucket, ctx, finalizers).await?;

    if bucket.status.is_none() {
        let patch = BackupBucketStatusPatch {
            phase: Some(PHASE_PENDING.to_string()),
            ..Default::default()
        };
        // Finalizer patch bumped the resource version, so no pinning here
        let api: Api<BackupBucket> = Api::all(ctx.client.clone());
        api.patch_status(
            &bucket.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&serde_json::json!({ "status": patch })),
        )
        .await
        .context("Failed to set BackupBucket phase")?;
    }
    Ok(())
}

async fn remove_finalizer(bucket: &BackupBucket, ctx: &Reconciler) -> Result<()> {
    let finalizers: Vec<String> = bucket
        .finalizers()
        .iter()
        .filter(|f| *f != BUCKET_FINALIZER)
        .cloned()
        .collect();
    patch_finalizers(bucket, ctx, finalizers).await
}

async fn patch_finalizers(
    bucket: &BackupBucket,
    ctx: &Reconciler,
    finalizers: Vec<String>,
) -> Result<()> {
    let api: Api<BackupBucket> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(
        &bucket.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await
    .context("Failed to update BackupBucket finalizers")?;
    debug!("Updated finalizers of {}", bucket.name_any());
    Ok(())
}

/// Skip status writes that would change nothing but timestamps
///
/// Every status write is a watch event, so unconditional writes would
/// reconcile the bucket in a loop.
fn needs_ready_status(outcome: &ReconcileOutcome) -> bool {
    let status = outcome.bucket.status.as_ref();
    outcome.rotated
        || status.and_then(|s| s.phase.as_deref()) != Some(PHASE_READY)
        || status.and_then(|s| s.observed_generation) != outcome.bucket.metadata.generation
}

fn needs_failed_status(bucket: &BackupBucket, patch: &BackupBucketStatusPatch) -> bool {
    let status = bucket.status.as_ref();
    status.and_then(|s| s.phase.as_deref()) != Some(PHASE_FAILED)
        || status.and_then(|s| s.message.as_ref()) != patch.message.as_ref()
}

fn ready_status(
    generation: Option<i64>,
    outcome: &ReconcileOutcome,
    now: DateTime<Utc>,
) -> BackupBucketStatusPatch {
    let now = now.to_rfc3339();
    BackupBucketStatusPatch {
        phase: Some(PHASE_READY.to_string()),
        message: Some(format!("Storage account {} is ready", outcome.account_name)),
        observed_generation: generation,
        last_reconcile_time: Some(now.clone()),
        last_key_rotation_time: outcome.rotated.then_some(now),
        ..Default::default()
    }
}

fn failed_status(
    generation: Option<i64>,
    err: &anyhow::Error,
    now: DateTime<Utc>,
) -> BackupBucketStatusPatch {
    BackupBucketStatusPatch {
        phase: Some(PHASE_FAILED.to_string()),
        message: Some(format!("{err:#}")),
        observed_generation: generation,
        last_reconcile_time: Some(now.to_rfc3339()),
        ..Default::default()
    }
}
