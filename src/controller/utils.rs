//! # Utilities
//!
//! Deadline handling for calls to external collaborators.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// An external call did not finish before its deadline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} did not complete within {timeout:?}")]
pub struct DeadlineExceeded {
    pub operation: String,
    pub timeout: Duration,
}

/// Await `future`, giving up after `timeout`
///
/// `None` waits indefinitely. On expiry the inner future is dropped, which
/// cancels the in-flight call.
pub async fn with_deadline<T, F>(
    operation: &str,
    timeout: Option<Duration>,
    future: F,
) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let Some(limit) = timeout else {
        return future.await;
    };
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_elapsed) => Err(DeadlineExceeded {
            operation: operation.to_string(),
            timeout: limit,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::azure::{classify, ErrorCategory};

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result = with_deadline("noop", Some(Duration::from_secs(5)), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_no_deadline_passes_errors_through() {
        let result: anyhow::Result<()> =
            with_deadline("noop", None, async { Err(anyhow::anyhow!("boom")) }).await;
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn test_expiry_is_deadline_exceeded() {
        let result: anyhow::Result<()> =
            with_deadline("create storage account", Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        let deadline = err.downcast_ref::<DeadlineExceeded>().unwrap();
        assert_eq!(deadline.operation, "create storage account");
        assert_eq!(classify(&err), ErrorCategory::Generic);
    }
}
