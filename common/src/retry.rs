//! Retry utilities with exponential backoff
//!
//! Talking to the container runtime fails transiently more often than it
//! should (daemon restarts, registry hiccups while pulling). These helpers
//! wrap such calls with the backon crate.

use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::warn;

use crate::constants::{DEFAULT_MAX_RETRIES, RETRY_MAX_DELAY_MS, RETRY_MIN_DELAY_MS};

/// Create a default exponential backoff builder
///
/// - Min delay: 100ms
/// - Max delay: 30s
/// - Max retries: 3
pub fn default_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(RETRY_MIN_DELAY_MS))
        .with_max_delay(Duration::from_millis(RETRY_MAX_DELAY_MS))
        .with_max_times(DEFAULT_MAX_RETRIES)
}

/// Retry an async operation, but only while `should_retry` accepts the error
///
/// # Examples
///
/// ```no_run
/// use common::retry::retry_async_when;
/// use anyhow::{Result, anyhow};
///
/// async fn pull_image() -> Result<()> {
///     Err(anyhow!("connection reset"))
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     retry_async_when(pull_image, |e| e.to_string().contains("connection")).await?;
///     Ok(())
/// }
/// ```
pub async fn retry_async_when<F, Fut, T, E, P>(operation: F, should_retry: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: FnMut(&E) -> bool,
{
    operation
        .retry(default_backoff())
        .sleep(tokio::time::sleep)
        .when(should_retry)
        .notify(|err, dur: Duration| {
            warn!(
                error = %err,
                retry_after_ms = dur.as_millis(),
                "Retrying after error"
            );
        })
        .await
}

/// Helper to determine if a runtime API error is worth retrying
///
/// 4xx responses (image not found, bad reference, auth) are permanent;
/// transport failures and 5xx responses are not.
#[cfg(feature = "docker")]
pub fn is_retryable_docker_error(error: &bollard::errors::Error) -> bool {
    use bollard::errors::Error;

    match error {
        Error::DockerResponseServerError { status_code, .. } => *status_code >= 500,
        Error::RequestTimeoutError | Error::HyperResponseError { .. } | Error::IOError { .. } => {
            true
        }
        _ => false,
    }
}
