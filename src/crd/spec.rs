//! # BackupBucket Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};

/// BackupBucket Custom Resource Definition
///
/// A logical backup destination owned by a managed cluster. The controller
/// backs it with an Azure storage account and publishes the account's
/// credentials as a generated secret referenced from the status.
///
/// # Example
///
/// ```yaml
/// apiVersion: backup.microscaler.io/v1
/// kind: BackupBucket
/// metadata:
///   name: shoot--dev--etcd-main
/// spec:
///   region: westeurope
///   cloudConfiguration:
///     name: AzurePublic
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "BackupBucket",
    group = "backup.microscaler.io",
    version = "v1",
    status = "crate::crd::BackupBucketStatus",
    shortname = "bb",
    printcolumn = r#"{"name":"Region", "type":"string", "jsonPath":".spec.region"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".status.generatedSecretRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupBucketSpec {
    /// Azure region the resource group and storage account are created in
    /// Examples: "westeurope", "usgovarizona", "chinanorth"
    pub region: String,
    /// Explicit Azure cloud to use
    /// Takes precedence over inferring the cloud from the region
    #[serde(default)]
    pub cloud_configuration: Option<CloudConfiguration>,
}

/// Named Azure cloud instance
///
/// Known names: `AzurePublic`, `AzureGovernment`, `AzureChina` (matched case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfiguration {
    pub name: String,
}

impl CloudConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
