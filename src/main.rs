//! # Backup Bucket Controller
//!
//! A Kubernetes controller that backs `BackupBucket` resources with Azure storage accounts.
//!
//! ## Overview
//!
//! For every `BackupBucket` the controller:
//!
//! 1. **Provisions storage** - Creates or updates a resource group and a storage account
//!    in the bucket's region, in the Azure cloud derived from the region or set explicitly
//! 2. **Publishes credentials** - Writes the account name, access key and blob domain to a
//!    generated secret referenced from the bucket status
//! 3. **Rotates keys** - Regenerates the storage key once the generated secret is older than
//!    the rotation age and replaces the secret
//! 4. **Cleans up** - Deletes the generated secret when the bucket is deleted
//!
//! ## Features
//!
//! - **Sovereign clouds**: Public, US Government and China clouds
//! - **Workload Identity**: Authenticates with Workload Identity or Managed Identity
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::{Context, Result};
use backup_bucket_controller::config::ControllerConfig;
use backup_bucket_controller::controller::reconciler::{self, Reconciler};
use backup_bucket_controller::controller::server::{start_server, ServerState};
use backup_bucket_controller::crd::BackupBucket;
use backup_bucket_controller::observability::metrics;
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Required by kube and reqwest when both pull in rustls
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backup_bucket_controller=info".into()),
        )
        .init();

    info!(
        "Starting Backup Bucket Controller {} (build {} at {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATETIME")
    );

    let config = ControllerConfig::from_env();
    if config.subscription_id.is_empty() {
        anyhow::bail!("AZURE_SUBSCRIPTION_ID must be set");
    }
    info!(
        "Generated secrets go to namespace {}, keys rotate after {} days",
        config.generated_secret_namespace, config.key_rotation_max_age_days
    );

    // Initialize metrics
    metrics::register_metrics()?;

    // Start HTTP server for metrics and probes
    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    // BackupBucket is cluster-scoped
    let buckets: Api<BackupBucket> = Api::all(client.clone());

    let reconciler = Arc::new(Reconciler::new(client, config)?);

    server_state.mark_ready();

    Controller::new(buckets, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconciler::reconcile, reconciler::error_policy, reconciler)
        .for_each(|result| {
            if let Err(e) = result {
                warn!("Controller event error: {}", e);
            }
            std::future::ready(())
        })
        .await;

    info!("Controller stopped");

    Ok(())
}
