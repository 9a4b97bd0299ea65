//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Namespace holding generated bucket secrets unless overridden
pub const DEFAULT_GENERATED_SECRET_NAMESPACE: &str = "garden";

/// Age after which a generated secret's storage key is rotated (days)
pub const DEFAULT_KEY_ROTATION_MAX_AGE_DAYS: i64 = 14;

/// Enforced bounds on the key rotation age (days)
/// Below one day every fresh secret is stale and the key is regenerated in a loop
pub const MIN_KEY_ROTATION_MAX_AGE_DAYS: i64 = 1;
pub const MAX_KEY_ROTATION_MAX_AGE_DAYS: i64 = 3650;

/// Upper bound on a single cloud or Kubernetes call (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

/// Interval between polls of an Azure long-running operation (seconds)
/// Used when the service does not send a `Retry-After` header
pub const DEFAULT_LRO_POLL_INTERVAL_SECS: u64 = 5;

/// Requeue interval after a successful reconcile (seconds)
/// Re-evaluates the key rotation policy without any external scheduler
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 3600;

/// Enforced minimum resync interval (seconds)
/// Prevents a zero-delay requeue loop against the API server and Azure
pub const MIN_RESYNC_INTERVAL_SECS: u64 = 60;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Requeue interval when Azure rejects the controller's credentials (seconds)
/// Retrying quickly cannot succeed until the identity is fixed
pub const DEFAULT_UNAUTHORIZED_REQUEUE_SECS: u64 = 600;

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "backup-bucket-controller";

/// Finalizer keeping a bucket around until its generated secret is deleted
pub const BUCKET_FINALIZER: &str = "backup.microscaler.io/generated-secret";

/// Status phases
pub const PHASE_PENDING: &str = "Pending";
pub const PHASE_READY: &str = "Ready";
pub const PHASE_FAILED: &str = "Failed";
