//! Retry policy and the part-upload state machine.
//!
//! A part attempt either succeeds, fails transiently (network error or a
//! retryable HTTP status), or fails fatally (403/404 permission and
//! signature errors, which retrying can never fix). Transient failures are
//! retried with exponential backoff behind an injected [`Sleeper`], so
//! tests drive the machine without timers.

use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::api::types::PartResult;
use crate::error::{CommitError, Result};

/// Backoff parameters for part uploads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per part, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled per subsequent retry.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to apply after the given failed attempt (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Timer abstraction so retry delays can be skipped in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Outcome of one upload attempt for one part.
pub(crate) enum AttemptOutcome {
    Success(PartResult),
    /// Worth retrying: connection failure or a retryable HTTP status.
    Transient(String),
    /// Never retried: 403/404 or a malformed success response.
    Fatal(String),
}

/// Lifecycle of one part upload.
enum PartState {
    Pending,
    Uploading { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded(PartResult),
    Failed { attempts: u32, reason: String },
}

/// Drive one part through the state machine until it succeeds or fails
/// permanently. `attempt_fn` is invoked with the 1-indexed attempt number.
pub(crate) async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    part_number: u32,
    mut attempt_fn: F,
) -> Result<PartResult>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome>,
{
    let mut state = PartState::Pending;
    loop {
        state = match state {
            PartState::Pending => PartState::Uploading { attempt: 1 },
            PartState::Uploading { attempt } => match attempt_fn(attempt).await {
                AttemptOutcome::Success(result) => PartState::Succeeded(result),
                AttemptOutcome::Fatal(reason) => PartState::Failed {
                    attempts: attempt,
                    reason,
                },
                AttemptOutcome::Transient(reason) => {
                    if attempt >= policy.max_attempts {
                        PartState::Failed {
                            attempts: attempt,
                            reason,
                        }
                    } else {
                        warn!(part_number, attempt, %reason, "part upload failed, retrying");
                        PartState::Retrying { attempt }
                    }
                }
            },
            PartState::Retrying { attempt } => {
                sleeper.sleep(policy.delay_for(attempt)).await;
                PartState::Uploading {
                    attempt: attempt + 1,
                }
            }
            PartState::Succeeded(result) => return Ok(result),
            PartState::Failed { attempts, reason } => {
                return Err(CommitError::PartUpload {
                    part_number,
                    attempts,
                    reason,
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::InstantSleeper;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn part(n: u32) -> PartResult {
        PartResult {
            part_number: n,
            etag: format!("etag-{n}"),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        // Capped at the ceiling from here on.
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(30), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn first_attempt_success_never_sleeps() {
        let sleeper = InstantSleeper::new();
        let result = run_with_retry(&RetryPolicy::default(), &sleeper, 1, |_| async {
            AttemptOutcome::Success(part(1))
        })
        .await
        .unwrap();
        assert_eq!(result, part(1));
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_with_backoff() {
        let sleeper = InstantSleeper::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result = run_with_retry(&RetryPolicy::default(), &sleeper, 2, move |attempt| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    AttemptOutcome::Transient("HTTP 500".to_string())
                } else {
                    AttemptOutcome::Success(part(2))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, part(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn retries_exhaust_at_max_attempts() {
        let sleeper = InstantSleeper::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let err = run_with_retry(&RetryPolicy::default(), &sleeper, 7, move |_| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async { AttemptOutcome::Transient("HTTP 503".to_string()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            CommitError::PartUpload {
                part_number,
                attempts,
                reason,
            } => {
                assert_eq!(part_number, 7);
                assert_eq!(attempts, 3);
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_failure_is_never_retried() {
        let sleeper = InstantSleeper::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let err = run_with_retry(&RetryPolicy::default(), &sleeper, 4, move |_| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async { AttemptOutcome::Fatal("HTTP 403".to_string()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
        match err {
            CommitError::PartUpload { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
