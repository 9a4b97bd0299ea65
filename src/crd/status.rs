//! # BackupBucket Status
//!
//! Status types for tracking the generated secret and reconciliation state.

use serde::{Deserialize, Serialize};

/// Status of the BackupBucket resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupBucketStatus {
    /// Reference to the generated secret holding the current storage credentials
    #[serde(default)]
    pub generated_secret_ref: Option<SecretReference>,
    /// Current phase of reconciliation
    /// Values: Pending, Ready, Failed
    #[serde(default)]
    pub phase: Option<String>,
    /// Human-readable description of the current state
    #[serde(default)]
    pub message: Option<String>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
    /// Last time the storage account key was rotated (RFC3339)
    #[serde(default)]
    pub last_key_rotation_time: Option<String>,
}

/// Name and namespace of a secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

impl SecretReference {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for SecretReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Partial status update
///
/// Only the fields that are `Some` are written, so a merge patch built from
/// this never clobbers fields owned by other writers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBucketStatusPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_secret_ref: Option<SecretReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_key_rotation_time: Option<String>,
}

impl BackupBucketStatusPatch {
    /// Patch that only moves the generated secret reference
    pub fn generated_secret_ref(reference: SecretReference) -> Self {
        Self {
            generated_secret_ref: Some(reference),
            ..Self::default()
        }
    }

    /// Apply this delta on top of an existing status
    pub fn apply_to(&self, status: &mut BackupBucketStatus) {
        if let Some(reference) = &self.generated_secret_ref {
            status.generated_secret_ref = Some(reference.clone());
        }
        if let Some(phase) = &self.phase {
            status.phase = Some(phase.clone());
        }
        if let Some(message) = &self.message {
            status.message = Some(message.clone());
        }
        if let Some(generation) = self.observed_generation {
            status.observed_generation = Some(generation);
        }
        if let Some(time) = &self.last_reconcile_time {
            status.last_reconcile_time = Some(time.clone());
        }
        if let Some(time) = &self.last_key_rotation_time {
            status.last_key_rotation_time = Some(time.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = BackupBucketStatusPatch::generated_secret_ref(SecretReference::new(
            "generated-bucket-foo-ab12",
            "garden",
        ));
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "generatedSecretRef": {"name": "generated-bucket-foo-ab12", "namespace": "garden"}
            })
        );
    }

    #[test]
    fn test_apply_keeps_untouched_fields() {
        let mut status = BackupBucketStatus {
            phase: Some("Ready".to_string()),
            message: Some("ok".to_string()),
            ..Default::default()
        };
        BackupBucketStatusPatch::generated_secret_ref(SecretReference::new("s", "ns"))
            .apply_to(&mut status);

        assert_eq!(status.phase.as_deref(), Some("Ready"));
        assert_eq!(status.message.as_deref(), Some("ok"));
        assert_eq!(status.generated_secret_ref, Some(SecretReference::new("s", "ns")));
    }

    #[test]
    fn test_status_deserializes_without_ref() {
        let status: BackupBucketStatus = serde_json::from_str(r#"{"phase":"Pending"}"#).unwrap();
        assert!(status.generated_secret_ref.is_none());
        assert_eq!(status.phase.as_deref(), Some("Pending"));
    }
}
