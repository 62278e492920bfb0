// src/adapter/retry.rs
// ============================================================================
// Module: Adapter Retry
// Description: Exponential-backoff retry loop for external adapter calls.
// Purpose: Retry only transient failures (network errors, 5xx, 429) with
//          bounded exponential backoff.
// Dependencies: tokio::time
// ============================================================================

//! ## Overview
//! A plain attempt/sleep/multiply-delay loop, adapted to an async
//! `tokio::time::sleep` and to a caller-supplied `classify` predicate
//! (see [`retry_async`]) instead of retrying unconditionally, since only
//! a specific failure class is worth retrying.

use std::time::Duration;

/// Retry tuning for one adapter endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first.
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Backoff multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Builds a retry configuration from a backend's configured max
    /// retries and initial backoff, using a 2.0x backoff multiplier.
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier: 2.0,
        }
    }
}

/// The outcome classification a retry loop needs from each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// The call succeeded or failed in a way that must not be retried.
    Terminal,
    /// The call failed in a way that is safe to retry.
    Retryable,
}

/// Runs `attempt` up to `config.max_retries + 1` times, sleeping with
/// exponential backoff between attempts classified [`RetryClass::Retryable`]
/// by `classify`. Returns the last attempt's result.
pub async fn retry_async<T, E, Fut>(
    config: &RetryConfig,
    mut attempt: impl FnMut(u32) -> Fut,
    classify: impl Fn(&Result<T, E>) -> RetryClass,
) -> Result<T, E>
where
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut delay = config.initial_delay;
    let mut last = attempt(0).await;
    for retry_number in 1..=config.max_retries {
        if classify(&last) == RetryClass::Terminal {
            return last;
        }
        tokio::time::sleep(delay).await;
        delay = Duration::from_secs_f64((delay.as_secs_f64() * config.backoff_multiplier).max(delay.as_secs_f64()));
        last = attempt(retry_number).await;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn retries_until_terminal_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_async(
            &config,
            |attempt| {
                let count = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |result| if result.is_ok() { RetryClass::Terminal } else { RetryClass::Retryable },
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_terminal_failure() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_async(
            &config,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err("not found") }
            },
            |_result| RetryClass::Terminal,
        )
        .await;
        assert_eq!(result, Err("not found"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(2, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_async(
            &config,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err("still failing") }
            },
            |_result| RetryClass::Retryable,
        )
        .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
