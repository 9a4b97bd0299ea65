//! # Azure Error Classification
//!
//! Errors reaching the controller come in several incompatible shapes:
//!
//! - [`DetailedError`] - legacy shape from the long-running-operation poller,
//!   with a status code as a typed field and/or an embedded response
//! - [`ResponseError`] - structured Resource Manager API error with a numeric status
//! - [`AuthenticationError`] - token acquisition failures
//! - `kube::Error::Api` - Kubernetes API status, used by the secret and bucket stores
//!
//! The classifier walks an `anyhow` cause chain and downcasts each cause
//! against this closed set. Unrecognised causes and missing inner fields fall
//! through to "not matched". Nothing here wraps or logs.

use reqwest::StatusCode;
use serde::Deserialize;
use std::error::Error as StdError;
use thiserror::Error;

/// Minimal view of an HTTP response attached to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
}

/// Legacy error shape produced while polling long-running operations
///
/// Either field may be missing; both are consulted.
#[derive(Debug, Error)]
#[error("{operation}: {message}")]
pub struct DetailedError {
    pub operation: String,
    pub status_code: Option<u16>,
    pub response: Option<HttpResponse>,
    pub message: String,
}

/// Resource Manager API error
#[derive(Debug, Error)]
#[error("{operation} returned {status_code} ({code}): {message}", code = .error_code.as_deref().unwrap_or("Unknown"))]
pub struct ResponseError {
    pub operation: String,
    pub status_code: u16,
    pub error_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl ResponseError {
    /// Build from a non-success response, reading the ARM `{"error": {...}}` envelope if present
    pub fn from_body(operation: impl Into<String>, status_code: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<ArmErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error);
        let (error_code, message) = match detail {
            Some(detail) => (
                detail.code,
                detail.message.unwrap_or_else(|| body.to_string()),
            ),
            None => (None, body.to_string()),
        };
        Self {
            operation: operation.into(),
            status_code,
            error_code,
            message,
        }
    }
}

/// Authentication library error
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The token endpoint answered with an error
    #[error("token request failed: {message}")]
    CallFailed {
        response: Option<HttpResponse>,
        message: String,
    },
    /// No credential could produce a token
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },
}

/// Capability shared by every recognised error shape
pub trait ClassifiableError {
    /// Whether the shape carries this HTTP-like status code
    fn status_code_matches(&self, status: u16) -> bool;

    fn is_authentication_failure(&self) -> bool {
        false
    }
}

impl ClassifiableError for DetailedError {
    fn status_code_matches(&self, status: u16) -> bool {
        self.status_code == Some(status)
            || self
                .response
                .is_some_and(|response| response.status_code == status)
    }
}

impl ClassifiableError for ResponseError {
    fn status_code_matches(&self, status: u16) -> bool {
        self.status_code == status
    }
}

impl ClassifiableError for AuthenticationError {
    fn status_code_matches(&self, status: u16) -> bool {
        match self {
            Self::CallFailed { response, .. } => {
                response.is_some_and(|response| response.status_code == status)
            }
            Self::AuthenticationFailed { .. } => false,
        }
    }

    fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

impl ClassifiableError for kube::Error {
    fn status_code_matches(&self, status: u16) -> bool {
        match self {
            kube::Error::Api(response) => response.code == status,
            _ => false,
        }
    }
}

/// Semantic category of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Unauthorized,
    Generic,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Generic => "generic",
        }
    }
}

/// Match a single cause against the known shapes
fn recognize<'a>(cause: &'a (dyn StdError + 'static)) -> Option<&'a dyn ClassifiableError> {
    if let Some(err) = cause.downcast_ref::<DetailedError>() {
        return Some(err);
    }
    if let Some(err) = cause.downcast_ref::<ResponseError>() {
        return Some(err);
    }
    if let Some(err) = cause.downcast_ref::<AuthenticationError>() {
        return Some(err);
    }
    if let Some(err) = cause.downcast_ref::<kube::Error>() {
        return Some(err);
    }
    None
}

fn has_status(err: &anyhow::Error, status: StatusCode) -> bool {
    err.chain()
        .filter_map(recognize)
        .any(|known| known.status_code_matches(status.as_u16()))
}

/// Whether the error means the resource does not exist
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    has_status(err, StatusCode::NOT_FOUND)
}

/// Whether the error is an authentication or authorization failure
#[must_use]
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    has_status(err, StatusCode::UNAUTHORIZED)
        || err
            .chain()
            .filter_map(recognize)
            .any(|known| known.is_authentication_failure())
}

#[must_use]
pub fn classify(err: &anyhow::Error) -> ErrorCategory {
    if is_not_found(err) {
        ErrorCategory::NotFound
    } else if is_unauthorized(err) {
        ErrorCategory::Unauthorized
    } else {
        ErrorCategory::Generic
    }
}

/// Drop not-found errors, pass everything else (including `None`) through unchanged
#[must_use]
pub fn filter_not_found(err: Option<anyhow::Error>) -> Option<anyhow::Error> {
    err.filter(|err| !is_not_found(err))
}

/// Turn a not-found failure of a read into `Ok(None)`
pub fn ignore_not_found<T>(result: anyhow::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(err) => Err(err),
    }
}
