//! Bounded retries with per-attempt deadlines.
//!
//! # Responsibilities
//! - Run an operation up to `attempts` times
//! - Enforce an independent timeout on every attempt
//! - Sleep with jittered backoff between attempts
//! - Stop promptly when the surrounding release is cancelled

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; at least 1.
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// How the final attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptEnd<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub end: AttemptEnd<T>,
    pub attempts: u32,
}

/// Run `op` until `should_retry` declines its result or the budget runs out.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
    should_retry: R,
) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    R: Fn(&T) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if attempt > 1 {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Retried { end: AttemptEnd::Cancelled, attempts: attempt - 1 };
                }
                _ = tokio::time::sleep(policy.backoff.delay(attempt - 1)) => {}
            }
        }

        let end = tokio::select! {
            _ = cancel.cancelled() => AttemptEnd::Cancelled,
            result = tokio::time::timeout(policy.attempt_timeout, op(attempt)) => match result {
                Ok(value) => AttemptEnd::Completed(value),
                Err(_) => AttemptEnd::TimedOut,
            },
        };

        let again = match &end {
            AttemptEnd::Completed(value) => should_retry(value),
            AttemptEnd::TimedOut => true,
            AttemptEnd::Cancelled => false,
        };
        if !again || attempt >= attempts {
            return Retried { end, attempts: attempt };
        }
        tracing::debug!(attempt, max_attempts = attempts, "Attempt failed, retrying");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            attempt_timeout: Duration::from_millis(50),
            backoff: BackoffPolicy {
                base_ms: 1,
                max_ms: 5,
            },
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(
            &fast_policy(5),
            &CancellationToken::new(),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { attempt >= 3 }
            },
            |ok| !*ok,
        )
        .await;

        assert_eq!(result.end, AttemptEnd::Completed(true));
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget() {
        let result = retry(
            &fast_policy(2),
            &CancellationToken::new(),
            |_| async { false },
            |ok| !*ok,
        )
        .await;
        assert_eq!(result.end, AttemptEnd::Completed(false));
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let result = retry(
            &fast_policy(2),
            &CancellationToken::new(),
            |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                true
            },
            |ok| !*ok,
        )
        .await;
        assert_eq!(result.end, AttemptEnd::TimedOut);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = retry(
            &fast_policy(3),
            &cancel,
            |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                true
            },
            |ok| !*ok,
        )
        .await;
        assert_eq!(result.end, AttemptEnd::Cancelled);
        assert_eq!(result.attempts, 1);
    }
}
