//! # Bounded Retry
//!
//! Runs an operation up to a fixed number of attempts with a fixed delay
//! between them. The first success is returned; once the attempts are spent
//! the error of the last attempt is returned as is, so callers see the
//! original diagnostic.
use std::{fmt::Display, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Retry policy: number of attempts and the delay slept between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Retrier {
    /// Total attempts, including the first. Zero behaves as one.
    pub attempts: u32,
    /// Delay between attempts, in milliseconds.
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl Retrier {
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that makes a single attempt.
    #[must_use]
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds or every attempt failed.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(op, |_| true).await
    }

    /// Like [`Self::execute`], but an error for which `should_retry` returns
    /// `false` is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the first non retriable error, or the error of the last
    /// attempt.
    pub async fn execute_if<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < attempts && should_retry(&err) => {
                    warn!(attempt, attempts, error = %err, "operation failed, retrying");
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Failure(u32);

    impl Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "failure #{}", self.0)
        }
    }

    fn failing_until(succeed_on: u32) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32, Failure>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if call >= succeed_on {
                Ok(call)
            } else {
                Err(Failure(call))
            })
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures_within_budget() {
        let retrier = Retrier::new(4, Duration::from_secs(2));
        let (calls, op) = failing_until(4);

        let started = tokio::time::Instant::now();
        assert_eq!(retrier.execute(op).await, Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_original_error_when_budget_spent() {
        let retrier = Retrier::new(3, Duration::from_millis(10));
        let (calls, op) = failing_until(u32::MAX);

        assert_eq!(retrier.execute(op).await, Err(Failure(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejected_errors() {
        let retrier = Retrier::new(5, Duration::ZERO);
        let (calls, op) = failing_until(u32::MAX);

        assert_eq!(retrier.execute_if(op, |_| false).await, Err(Failure(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_runs_once() {
        let retrier = Retrier::new(0, Duration::ZERO);
        let (calls, op) = failing_until(1);

        assert_eq!(retrier.execute(op).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deserializes_delay_in_millis() {
        let retrier: Retrier = serde_json::from_str(r#"{"attempts": 2, "delay_ms": 1500}"#).unwrap();
        assert_eq!(retrier, Retrier::new(2, Duration::from_millis(1500)));
    }
}
