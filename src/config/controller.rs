//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_GENERATED_SECRET_NAMESPACE, DEFAULT_KEY_ROTATION_MAX_AGE_DAYS,
    DEFAULT_LRO_POLL_INTERVAL_SECS, DEFAULT_METRICS_PORT, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, DEFAULT_RESYNC_INTERVAL_SECS,
    DEFAULT_UNAUTHORIZED_REQUEUE_SECS, MAX_KEY_ROTATION_MAX_AGE_DAYS,
    MIN_KEY_ROTATION_MAX_AGE_DAYS, MIN_RESYNC_INTERVAL_SECS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Azure subscription hosting the backup resource groups
    /// Required by the controller binary, empty when unset
    pub subscription_id: String,
    /// Client ID of the workload identity used against Azure
    /// When unset the pod's managed identity is used
    pub client_id: Option<String>,
    /// Namespace the generated bucket secrets are written to
    pub generated_secret_namespace: String,
    /// Age after which storage keys are rotated (days)
    pub key_rotation_max_age_days: i64,
    /// Upper bound on a single external call (seconds, 0 disables the bound)
    pub operation_timeout_secs: u64,
    /// Fallback poll interval for Azure long-running operations (seconds)
    pub lro_poll_interval_secs: u64,
    /// Requeue interval after a successful reconcile (seconds)
    pub resync_interval_secs: u64,
    /// Reconciliation error requeue interval (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// Requeue interval after an authorization failure (seconds)
    pub unauthorized_requeue_secs: u64,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            client_id: None,
            generated_secret_namespace: DEFAULT_GENERATED_SECRET_NAMESPACE.to_string(),
            key_rotation_max_age_days: DEFAULT_KEY_ROTATION_MAX_AGE_DAYS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            lro_poll_interval_secs: DEFAULT_LRO_POLL_INTERVAL_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            unauthorized_requeue_secs: DEFAULT_UNAUTHORIZED_REQUEUE_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to their defaults. The rotation age and
    /// the resync interval are clamped to their enforced bounds.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            subscription_id: lookup("AZURE_SUBSCRIPTION_ID").unwrap_or_default(),
            client_id: lookup("AZURE_CLIENT_ID").filter(|id| !id.is_empty()),
            generated_secret_namespace: lookup("GENERATED_SECRET_NAMESPACE")
                .filter(|ns| !ns.is_empty())
                .unwrap_or(defaults.generated_secret_namespace),
            key_rotation_max_age_days: parse_or(
                &lookup,
                "KEY_ROTATION_MAX_AGE_DAYS",
                defaults.key_rotation_max_age_days,
            )
            .clamp(MIN_KEY_ROTATION_MAX_AGE_DAYS, MAX_KEY_ROTATION_MAX_AGE_DAYS),
            operation_timeout_secs: parse_or(
                &lookup,
                "OPERATION_TIMEOUT_SECS",
                defaults.operation_timeout_secs,
            ),
            lro_poll_interval_secs: parse_or(
                &lookup,
                "LRO_POLL_INTERVAL_SECS",
                defaults.lro_poll_interval_secs,
            ),
            resync_interval_secs: parse_or(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                defaults.resync_interval_secs,
            )
            .max(MIN_RESYNC_INTERVAL_SECS),
            reconciliation_error_requeue_secs: parse_or(
                &lookup,
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                defaults.reconciliation_error_requeue_secs,
            ),
            unauthorized_requeue_secs: parse_or(
                &lookup,
                "UNAUTHORIZED_REQUEUE_SECS",
                defaults.unauthorized_requeue_secs,
            ),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
        }
    }

    /// Maximum age of a generated secret before its key is rotated
    #[must_use]
    pub fn key_rotation_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(
            self.key_rotation_max_age_days
                .clamp(MIN_KEY_ROTATION_MAX_AGE_DAYS, MAX_KEY_ROTATION_MAX_AGE_DAYS),
        )
    }

    /// Per-call deadline, `None` when disabled
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }

    pub fn lro_poll_interval(&self) -> Duration {
        Duration::from_secs(self.lro_poll_interval_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(MIN_RESYNC_INTERVAL_SECS))
    }

    /// Get reconciliation error requeue duration
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    pub fn unauthorized_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.unauthorized_requeue_secs)
    }
}

/// Read a key and parse it, or return the default
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
