// src/retry.rs

use crate::reporter::{Reporter, RunEvent};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How many times a unit of work is attempted, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Attempts actually made; a policy of 0 still runs the operation once.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.delay).take(self.effective_attempts() as usize - 1)
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` calls have failed,
/// returning the last error in the latter case.
///
/// Every failed attempt is reported as `RunEvent::RetryAttempt`, including the
/// final one, so a log reader can see the whole sequence for `operation_name`.
pub async fn retry<T, E, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    reporter: &dyn Reporter,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = AtomicU32::new(0);
    let max_attempts = policy.effective_attempts();

    RetryIf::spawn(
        policy.strategy(),
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            operation()
        },
        |err: &E| {
            reporter.report(RunEvent::RetryAttempt {
                operation: operation_name.to_string(),
                attempt: attempts.load(Ordering::SeqCst),
                max_attempts,
                error: err.to_string(),
            });
            true
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{NoopReporter, RecordingReporter};

    async fn run_failing_then_ok(fail_times: u32, max_attempts: u32) -> (Result<u32, String>, u32) {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(max_attempts, Duration::ZERO);
        let result = retry("flaky", &policy, &NoopReporter, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= fail_times {
                    Err(format!("failure #{}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_succeeds_when_failures_below_limit() {
        for fail_times in 0..3 {
            let (result, calls) = run_failing_then_ok(fail_times, 3).await;
            assert_eq!(result, Ok(fail_times + 1));
            assert_eq!(calls, fail_times + 1);
        }
    }

    #[tokio::test]
    async fn test_propagates_last_error_after_max_attempts() {
        for fail_times in [3, 4, 10] {
            let (result, calls) = run_failing_then_ok(fail_times, 3).await;
            assert_eq!(result, Err("failure #3".to_string()));
            assert_eq!(calls, 3, "operation must be invoked exactly max_attempts times");
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let (result, calls) = run_failing_then_ok(5, 0).await;
        assert_eq!(result, Err("failure #1".to_string()));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_reports_each_failed_attempt() {
        let reporter = RecordingReporter::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<(), String> =
            retry("always_fails", &policy, &reporter, || async { Err("boom".to_string()) }).await;
        assert!(result.is_err());

        let attempts: Vec<u32> = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::RetryAttempt { attempt, max_attempts, .. } => {
                    assert_eq!(max_attempts, 3);
                    Some(attempt)
                }
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }
}
