use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::exponential::ExponentialBackoff;
use backoff::{Clock, Error as BackoffError};
use metrics::counter;
use syncer_config::shared::ApiRetryConfig;
use tracing::warn;

use crate::metrics::{OPERATION, SYNC_API_RETRIES_TOTAL};

/// Errors that tell whether the failed call may succeed when issued again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Reads time from the tokio clock, so that budgets follow paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> std::time::Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Builds a fixed-delay backoff bounded by the elapsed time budget of `config`.
fn fixed_backoff(config: &ApiRetryConfig) -> ExponentialBackoff<TokioClock> {
    let delay = config.delay();
    let clock = TokioClock;

    ExponentialBackoff {
        current_interval: delay,
        initial_interval: delay,
        randomization_factor: 0.0,
        multiplier: 1.0,
        max_interval: delay,
        start_time: clock.now(),
        max_elapsed_time: Some(config.max_elapsed()),
        clock,
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or the retry budget of
/// `config` is spent.
///
/// The budget is a duration, not an attempt count: a retryable failure is retried after a fixed
/// delay as long as the next attempt would still start within `max_elapsed`. Once the budget is
/// spent the last error is returned.
pub async fn retry_with_budget<T, E, F, Fut>(
    config: &ApiRetryConfig,
    operation: &'static str,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt: u32 = 0;

    let result = retry_notify(
        fixed_backoff(config),
        || {
            let fut = call();
            async move {
                fut.await.map_err(|err| {
                    if err.is_retryable() {
                        BackoffError::transient(err)
                    } else {
                        BackoffError::permanent(err)
                    }
                })
            }
        },
        |err: E, delay: Duration| {
            attempt += 1;
            warn!(
                operation,
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "call failed with a retryable error, retrying"
            );
            counter!(SYNC_API_RETRIES_TOTAL, OPERATION => operation).increment(1);
        },
    )
    .await;

    if let Err(err) = &result {
        if err.is_retryable() {
            warn!(operation, error = %err, "retry budget exhausted, giving up");
        }
    }

    result
}
