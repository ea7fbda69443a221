use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::NetworkError;
use crate::Result;

/// Runs `task` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. Each attempt is bounded by `policy.timeout_ms`; the
/// delay between attempts doubles from `base_delay_ms` up to `max_delay_ms`.
///
/// When `cancel` fires, the backoff sleep is cut short and the last error is
/// returned. An attempt that already started always runs to completion.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
    cancel: Option<&CancellationToken>,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let max_retries = policy.max_retries.max(1);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(error)) => {
                if !error.is_retryable() {
                    debug!("attempt {} failed with non-retryable error: {:?}", attempt, error);
                    return Err(error);
                }
                warn!("attempt {} failed with error: {:?}", attempt, error);
                error
            }
            Err(_) => {
                warn!("attempt {} timed out after {:?}", attempt, timeout_duration);
                NetworkError::RetryTimeoutError(timeout_duration).into()
            }
        };

        if attempt >= max_retries {
            warn!("task failed after {} attempts", attempt);
            return Err(error);
        }

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("backoff interrupted by cancellation after {} attempts", attempt);
                        return Err(error);
                    }
                    _ = sleep(delay) => {}
                }
            }
            None => sleep(delay).await,
        }
        delay = (delay * 2).min(max_delay);
    }
}
