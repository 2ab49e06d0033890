//! Bounded retry with exponential backoff and jitter
//!
//! A pure scheduling primitive over a caller-supplied async operation. The
//! operation tags its failures as transient or permanent; transient failures
//! are retried with geometrically growing, jittered delays until the attempt
//! budget runs out, permanent failures short-circuit after a single report,
//! and cancellation interrupts any backoff wait. The engine performs no I/O
//! besides waiting.

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetrySettings;
use crate::error::Error;

/// Retry policy: attempt budget and backoff shape
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound on the delay between retries
    pub max_delay: Duration,

    /// Multiplier for the exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_delay: settings.initial_delay(),
            max_delay: settings.max_delay(),
            multiplier: settings.multiplier,
        }
    }
}

/// Failure classification reported by a retried operation
#[derive(Debug, Error)]
pub enum RetryError {
    /// Worth retrying
    #[error("{0}")]
    Transient(Error),

    /// Do not try again
    #[error("{0}")]
    Permanent(Error),
}

impl RetryError {
    /// Tag an error as transient
    pub fn transient(err: impl Into<Error>) -> Self {
        RetryError::Transient(err.into())
    }

    /// Tag an error as permanent
    pub fn permanent(err: impl Into<Error>) -> Self {
        RetryError::Permanent(err.into())
    }

    /// Whether this error bypasses further attempts
    pub fn is_permanent(&self) -> bool {
        matches!(self, RetryError::Permanent(_))
    }

    /// Unwrap the underlying error
    pub fn into_inner(self) -> Error {
        match self {
            RetryError::Transient(e) | RetryError::Permanent(e) => e,
        }
    }
}

/// Untagged errors are treated as transient
impl From<Error> for RetryError {
    fn from(err: Error) -> Self {
        RetryError::Transient(err)
    }
}

/// Terminal failure of a retry sequence
#[derive(Debug, Error)]
pub enum RetryFailure {
    /// The cancellation token fired before the operation succeeded
    #[error("operation canceled")]
    Canceled,

    /// The operation reported a permanent error
    #[error("{0}")]
    Permanent(Error),

    /// Every attempt failed; carries the last error
    #[error("{0}")]
    Exhausted(Error),
}

impl RetryFailure {
    /// Unwrap the underlying error, mapping cancellation to
    /// [`Error::ShuttingDown`]
    pub fn into_error(self) -> Error {
        match self {
            RetryFailure::Canceled => Error::ShuttingDown,
            RetryFailure::Permanent(e) | RetryFailure::Exhausted(e) => e,
        }
    }
}

/// Result of a retry sequence
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Number of completed operation invocations
    pub attempts: u32,

    /// Total wall time spent, waits included
    pub elapsed: Duration,

    /// Final result
    pub result: Result<T, RetryFailure>,
}

/// Execute `operation` under `policy`, retrying transient failures.
pub async fn run<T, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    run_with_observer(cancel, policy, operation, |_, _, _| {}).await
}

/// Like [`run`], invoking `on_retry(attempt, error, next_delay)` after each
/// failed attempt that will be retried. Useful for logging and metrics.
pub async fn run_with_observer<T, F, Fut, O>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: O,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
    O: FnMut(u32, &Error, Duration),
{
    let start = Instant::now();
    let mut last_error: Option<Error> = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        if cancel.is_cancelled() {
            return RetryOutcome {
                attempts: attempt - 1,
                elapsed: start.elapsed(),
                result: Err(RetryFailure::Canceled),
            };
        }

        match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                    result: Ok(value),
                };
            },
            Err(RetryError::Permanent(err)) => {
                return RetryOutcome {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                    result: Err(RetryFailure::Permanent(err)),
                };
            },
            Err(RetryError::Transient(err)) => {
                if attempt < policy.max_attempts {
                    let delay = backoff_delay(attempt, policy, &mut rand::thread_rng());
                    on_retry(attempt, &err, delay);

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return RetryOutcome {
                                attempts: attempt,
                                elapsed: start.elapsed(),
                                result: Err(RetryFailure::Canceled),
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                last_error = Some(err);
            },
        }
    }

    let err = last_error.unwrap_or_else(|| Error::internal("retry budget misconfigured"));
    RetryOutcome {
        attempts: policy.max_attempts,
        elapsed: start.elapsed(),
        result: Err(RetryFailure::Exhausted(err)),
    }
}

/// Delay before the retry that follows `attempt` (1-indexed).
///
/// Grows the initial delay geometrically, caps it at the policy maximum,
/// then perturbs it by a uniform jitter of up to 25 percent in either
/// direction.
fn backoff_delay(attempt: u32, policy: &RetryPolicy, rng: &mut impl Rng) -> Duration {
    let base = policy.initial_delay.as_secs_f64()
        * policy.multiplier.powi(attempt.saturating_sub(1) as i32);
    let capped = base.min(policy.max_delay.as_secs_f64());
    let jitter: f64 = rng.gen_range(-0.25..=0.25);
    Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = run(&cancel, &fast_policy(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RetryError>(42)
            }
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();

        let outcome = run(&cancel, &fast_policy(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(RetryError::transient(Error::handler("temporary")))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        let elapsed = start.elapsed();

        assert_eq!(outcome.attempts, 3);
        assert!(outcome.result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two waits: ~10 ms and ~20 ms, each jittered by up to 25 percent
        assert!(elapsed >= Duration::from_millis(15), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(120), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = run(&cancel, &fast_policy(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetryError::transient(Error::handler("persistent")))
            }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match outcome.result {
            Err(RetryFailure::Exhausted(e)) => {
                assert!(e.to_string().contains("persistent"));
            },
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_single_attempt() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = run(&cancel, &fast_policy(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetryError::permanent(Error::validation("bad order")))
            }
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome.result, Err(RetryFailure::Permanent(_))));
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome: RetryOutcome<()> = run(&cancel, &policy, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetryError::transient(Error::handler("failing")))
            }
        })
        .await;
        let elapsed = start.elapsed();

        // Cancelled during the first backoff wait: one invocation, prompt
        // return, no further attempts
        assert!(matches!(outcome.result, Err(RetryFailure::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(elapsed < Duration::from_millis(150), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cancellation_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome: RetryOutcome<()> = run(&cancel, &fast_policy(3), || async {
            panic!("operation must not run after cancellation");
        })
        .await;

        assert_eq!(outcome.attempts, 0);
        assert!(matches!(outcome.result, Err(RetryFailure::Canceled)));
    }

    #[tokio::test]
    async fn test_observer_sees_each_retry() {
        let cancel = CancellationToken::new();
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);

        let _: RetryOutcome<()> = run_with_observer(
            &cancel,
            &fast_policy(3),
            || async { Err(RetryError::transient(Error::handler("nope"))) },
            move |attempt, err, delay| {
                sink.lock()
                    .unwrap()
                    .push((attempt, err.to_string(), delay));
            },
        )
        .await;

        let observed = observed.lock().unwrap();
        // Retried twice: after attempts 1 and 2, never after the last
        assert_eq!(observed.len(), 2);
        assert_eq!(observed[0].0, 1);
        assert_eq!(observed[1].0, 2);
        assert!(observed[0].1.contains("nope"));
    }

    #[test]
    fn test_backoff_delay_bounds() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };

        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            for attempt in 1..=8u32 {
                let base = (100.0 * 2.0f64.powi(attempt as i32 - 1)).min(5000.0);
                let delay = backoff_delay(attempt, &policy, &mut rng).as_secs_f64() * 1000.0;
                assert!(
                    delay >= base * 0.75 - 1e-6 && delay <= base * 1.25 + 1e-6,
                    "attempt {} seed {}: {} outside [{}, {}]",
                    attempt,
                    seed,
                    delay,
                    base * 0.75,
                    base * 1.25
                );
            }
        }
    }

    #[test]
    fn test_backoff_delay_caps_at_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            multiplier: 2.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        // Attempt 5 would be 1600 ms uncapped; jitter keeps it within
        // [300, 500] around the 400 ms cap
        let delay = backoff_delay(5, &policy, &mut rng);
        assert!(delay >= Duration::from_millis(300));
        assert!(delay <= Duration::from_millis(500));
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = RetrySettings::default();
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn test_untagged_errors_default_to_transient() {
        let err: RetryError = Error::kafka("broker hiccup").into();
        assert!(!err.is_permanent());
        assert!(RetryError::permanent(Error::validation("bad")).is_permanent());
    }
}
