// Timeout race around a fallible future

use crate::error::{Result, SvcdeckError};
use std::future::Future;
use std::time::Duration;

/// Race `operation` against a timer.
///
/// On expiry this rejects with a timeout error carrying the caller-supplied
/// message. The underlying subprocess is NOT killed: the caller stops
/// waiting, but an in-flight OS action may still complete in the background.
pub async fn with_timeout<T, F>(duration: Duration, message: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("operation timed out after {:?}: {}", duration, message);
            Err(SvcdeckError::Timeout(message.to_string()).into())
        }
    }
}
