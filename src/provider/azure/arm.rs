//! # Azure Resource Manager Client
//!
//! Client for the Resource Manager REST API, covering resource groups and
//! storage accounts.
//!
//! This module provides functionality to:
//! - Create or update resource groups
//! - Create or update storage accounts, waiting for the long-running operation
//! - List and regenerate storage account keys
//! - Support Workload Identity and Managed Identity authentication
//!
//! Non-success responses surface as [`ResponseError`], poller failures as
//! [`DetailedError`] and token failures as [`AuthenticationError`].

use super::cloud::CloudRealm;
use super::errors::{AuthenticationError, DetailedError, HttpResponse, ResponseError};
use crate::observability::metrics;
use crate::provider::{ResourceGroupClient, StorageAccountClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use azure_core::credentials::TokenCredential;
use azure_core::error::ErrorKind;
use azure_core::http::StatusCode as AzureStatusCode;
use azure_identity::{ManagedIdentityCredential, WorkloadIdentityCredential};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, Instrument};

pub const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
pub const STORAGE_API_VERSION: &str = "2023-01-01";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// How the controller authenticates against Azure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AzureCredentialConfig {
    /// Federated token of a Kubernetes service account
    WorkloadIdentity { client_id: String },
    /// Identity assigned to the node or pod
    ManagedIdentity,
}

impl AzureCredentialConfig {
    #[must_use]
    pub fn from_client_id(client_id: Option<String>) -> Self {
        match client_id {
            Some(client_id) => Self::WorkloadIdentity { client_id },
            None => Self::ManagedIdentity,
        }
    }

    /// Build the token credential
    /// # Errors
    /// Returns an error if the Azure identity client cannot be created
    pub fn build(&self) -> Result<Arc<dyn TokenCredential>> {
        let credential: Arc<dyn TokenCredential> = match self {
            Self::WorkloadIdentity { client_id } => {
                info!(
                    "Using Azure Workload Identity authentication with client ID: {}",
                    client_id
                );
                let options = azure_identity::WorkloadIdentityCredentialOptions {
                    client_id: Some(client_id.clone()),
                    ..Default::default()
                };
                WorkloadIdentityCredential::new(Some(options))
                    .context("Failed to create WorkloadIdentityCredential")?
            }
            Self::ManagedIdentity => {
                info!("No client ID configured, using Managed Identity");
                ManagedIdentityCredential::new(None)
                    .context("Failed to create ManagedIdentityCredential")?
            }
        };
        Ok(credential)
    }
}

/// A single storage account access key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountKey {
    pub key_name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct StorageAccountKeys {
    #[serde(default)]
    keys: Vec<StorageAccountKey>,
}

#[derive(Debug, Default, Deserialize)]
struct AsyncOperationStatus {
    status: Option<String>,
    error: Option<AsyncOperationError>,
}

#[derive(Debug, Deserialize)]
struct AsyncOperationError {
    code: Option<String>,
    message: Option<String>,
}

/// Resource Manager client bound to one subscription and one cloud
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    subscription_id: String,
    realm: CloudRealm,
    poll_interval: Duration,
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("subscription_id", &self.subscription_id)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    pub fn new(
        http: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        subscription_id: impl Into<String>,
        realm: CloudRealm,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            credential,
            subscription_id: subscription_id.into(),
            realm,
            poll_interval,
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        let scope = format!("{}/.default", self.realm.resource_manager_endpoint());
        let token = self
            .credential
            .get_token(&[scope.as_str()], None)
            .await
            .map_err(|e| token_error(&e))?;
        Ok(token.token.secret().to_string())
    }

    /// Send a request and turn non-success statuses into [`ResponseError`]
    async fn send(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let token = self.bearer_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("{operation}: request to Azure Resource Manager failed"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(ResponseError::from_body(operation, status.as_u16(), &text).into())
    }

    /// Wait for a `202 Accepted` long-running operation to finish
    async fn wait_for_completion(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> Result<()> {
        if response.status() != StatusCode::ACCEPTED {
            return Ok(());
        }
        let Some(mut status_url) = poll_url(response.headers()) else {
            debug!("{}: accepted without a poll URL, treating as done", operation);
            return Ok(());
        };
        let mut delay = retry_after(response.headers()).unwrap_or(self.poll_interval);

        loop {
            tokio::time::sleep(delay).await;
            debug!("{}: polling long-running operation", operation);

            let token = self.bearer_token().await?;
            let poll = self
                .http
                .get(&status_url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| DetailedError {
                    operation: operation.to_string(),
                    status_code: e.status().map(|status| status.as_u16()),
                    response: None,
                    message: e.to_string(),
                })?;

            let status = poll.status();
            if status == StatusCode::ACCEPTED {
                delay = retry_after(poll.headers()).unwrap_or(self.poll_interval);
                if let Some(next) = poll_url(poll.headers()) {
                    status_url = next;
                }
                continue;
            }
            if !status.is_success() {
                let text = poll.text().await.unwrap_or_default();
                return Err(DetailedError {
                    operation: operation.to_string(),
                    status_code: None,
                    response: Some(HttpResponse {
                        status_code: status.as_u16(),
                    }),
                    message: text,
                }
                .into());
            }

            let next_delay = retry_after(poll.headers()).unwrap_or(self.poll_interval);
            // Location polling ends with the resource itself,
            // Azure-AsyncOperation polling with a status document
            let body: AsyncOperationStatus = poll.json().await.unwrap_or_default();
            match body.status.as_deref() {
                None | Some("Succeeded") => return Ok(()),
                Some("Failed" | "Canceled") => {
                    let detail = body.error.map_or_else(
                        || "operation did not succeed".to_string(),
                        |e| {
                            format!(
                                "{}: {}",
                                e.code.unwrap_or_default(),
                                e.message.unwrap_or_default()
                            )
                        },
                    );
                    return Err(DetailedError {
                        operation: operation.to_string(),
                        status_code: None,
                        response: Some(HttpResponse {
                            status_code: status.as_u16(),
                        }),
                        message: detail,
                    }
                    .into());
                }
                Some(_) => delay = next_delay,
            }
        }
    }

    async fn list_keys(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<StorageAccountKey>> {
        let url = storage_account_url(
            self.realm.resource_manager_endpoint(),
            &self.subscription_id,
            resource_group,
            account_name,
            Some("listKeys"),
        );
        let response = self
            .send("list storage account keys", Method::POST, &url, None)
            .await?;
        let keys: StorageAccountKeys = response
            .json()
            .await
            .context("Failed to decode storage account keys")?;
        Ok(keys.keys)
    }
}

#[async_trait]
impl ResourceGroupClient for ArmClient {
    async fn create_or_update(&self, name: &str, location: &str) -> Result<()> {
        let span = info_span!(
            "azure.arm.resource_group.create_or_update",
            resource_group = name,
            location = location
        );
        let start = Instant::now();

        async move {
            let url = resource_group_url(
                self.realm.resource_manager_endpoint(),
                &self.subscription_id,
                name,
            );
            let result = self
                .send(
                    "create or update resource group",
                    Method::PUT,
                    &url,
                    Some(json!({ "location": location })),
                )
                .await
                .map(|_| ());
            record("resource_group_create_or_update", start, &result);
            result
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl StorageAccountClient for ArmClient {
    async fn create_storage_account(
        &self,
        resource_group: &str,
        account_name: &str,
        location: &str,
    ) -> Result<()> {
        let span = info_span!(
            "azure.arm.storage_account.create",
            resource_group = resource_group,
            storage_account = account_name,
            location = location
        );
        let start = Instant::now();

        async move {
            let operation = "create or update storage account";
            let url = storage_account_url(
                self.realm.resource_manager_endpoint(),
                &self.subscription_id,
                resource_group,
                account_name,
                None,
            );
            let result: Result<()> = async {
                let response = self
                    .send(operation, Method::PUT, &url, Some(storage_account_body(location)))
                    .await?;
                self.wait_for_completion(operation, response).await
            }
            .await;
            record("storage_account_create", start, &result);
            if result.is_ok() {
                info!("Storage account {} is present", account_name);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn list_storage_account_key(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<String> {
        let start = Instant::now();
        let result = self
            .list_keys(resource_group, account_name)
            .await
            .and_then(|keys| {
                keys.into_iter()
                    .next()
                    .map(|key| key.value)
                    .with_context(|| format!("storage account {account_name} has no access keys"))
            });
        record("storage_account_list_keys", start, &result);
        result
    }

    async fn rotate_key(
        &self,
        resource_group: &str,
        account_name: &str,
        current_key: &str,
    ) -> Result<String> {
        let span = info_span!(
            "azure.arm.storage_account.rotate_key",
            resource_group = resource_group,
            storage_account = account_name
        );
        let start = Instant::now();

        async move {
            let result: Result<String> = async {
                let keys = self.list_keys(resource_group, account_name).await?;
                let key_name = select_key_to_rotate(&keys, current_key)
                    .with_context(|| format!("storage account {account_name} has no access keys"))?
                    .to_string();

                info!("Regenerating key {} of storage account {}", key_name, account_name);
                let url = storage_account_url(
                    self.realm.resource_manager_endpoint(),
                    &self.subscription_id,
                    resource_group,
                    account_name,
                    Some("regenerateKey"),
                );
                let response = self
                    .send(
                        "regenerate storage account key",
                        Method::POST,
                        &url,
                        Some(json!({ "keyName": key_name })),
                    )
                    .await?;
                let regenerated: StorageAccountKeys = response
                    .json()
                    .await
                    .context("Failed to decode regenerated storage account keys")?;
                regenerated
                    .keys
                    .into_iter()
                    .find(|key| key.key_name == key_name)
                    .map(|key| key.value)
                    .with_context(|| format!("regenerated key {key_name} missing from response"))
            }
            .await;
            record("storage_account_rotate_key", start, &result);
            result
        }
        .instrument(span)
        .await
    }
}

/// Map a credential failure onto the authentication error shapes
///
/// Only a rejection of the identity is an authentication failure. Transport
/// errors and server-side failures of the token endpoint or IMDS are call
/// failures and retry like any other error.
fn token_error(err: &azure_core::Error) -> AuthenticationError {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::Io => AuthenticationError::CallFailed {
            response: None,
            message,
        },
        ErrorKind::HttpResponse { status, .. }
            if !matches!(
                status,
                AzureStatusCode::BadRequest
                    | AzureStatusCode::Unauthorized
                    | AzureStatusCode::Forbidden
            ) =>
        {
            AuthenticationError::CallFailed {
                response: None,
                message,
            }
        }
        _ => AuthenticationError::AuthenticationFailed { message },
    }
}

fn record<T>(operation: &str, start: Instant, result: &Result<T>) {
    metrics::record_provider_operation(operation, start.elapsed().as_secs_f64());
    if result.is_err() {
        metrics::increment_provider_operation_errors(operation);
    }
}

/// Pick the key to regenerate: the one not currently in use
///
/// Falls back to the first key when `current_key` matches none of them.
#[must_use]
pub fn select_key_to_rotate<'a>(
    keys: &'a [StorageAccountKey],
    current_key: &str,
) -> Option<&'a str> {
    keys.iter()
        .find(|key| key.value != current_key)
        .or_else(|| keys.first())
        .map(|key| key.key_name.as_str())
}

#[must_use]
pub fn resource_group_url(endpoint: &str, subscription_id: &str, resource_group: &str) -> String {
    format!(
        "{endpoint}/subscriptions/{subscription_id}/resourcegroups/{resource_group}?api-version={RESOURCE_GROUP_API_VERSION}"
    )
}

#[must_use]
pub fn storage_account_url(
    endpoint: &str,
    subscription_id: &str,
    resource_group: &str,
    account_name: &str,
    action: Option<&str>,
) -> String {
    let action = action.map(|a| format!("/{a}")).unwrap_or_default();
    format!(
        "{endpoint}/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{account_name}{action}?api-version={STORAGE_API_VERSION}"
    )
}

fn storage_account_body(location: &str) -> serde_json::Value {
    json!({
        "location": location,
        "kind": "StorageV2",
        "sku": { "name": "Standard_ZRS" },
        "properties": {
            "minimumTlsVersion": "TLS1_2",
            "allowBlobPublicAccess": false,
            "supportsHttpsTrafficOnly": true
        }
    })
}

/// `Azure-AsyncOperation` takes precedence over `Location`
fn poll_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AZURE_ASYNC_OPERATION)
        .or_else(|| headers.get(LOCATION))
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
