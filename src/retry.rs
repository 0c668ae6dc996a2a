// TASALIGN BOUNDED RETRY
// FIXED ATTEMPT BUDGET, FIXED BACKOFF BETWEEN ATTEMPTS (NONE AFTER THE LAST).
// THE CONTROL PLANE SHOWS TRANSIENT CONTENTION; ANYTHING ELSE IS FATAL.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Pace;
use crate::error::{Result, TasError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_MS: u64 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

// ONE ATTEMPT: FINISHED, OR A TRANSIENT FAILURE WORTH RETRYING
pub enum Outcome<T> {
    Done(T),
    Retry(String),
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    // op RECEIVES THE 1-BASED ATTEMPT NUMBER. Err(_) FROM op IS NOT RETRIED.
    pub fn run<T>(&self, pace: &dyn Pace, mut op: impl FnMut(u32) -> Result<Outcome<T>>) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match op(attempt)? {
                Outcome::Done(v) => return Ok(v),
                Outcome::Retry(reason) => {
                    debug!("attempt {}/{} failed: {}", attempt, attempts, reason);
                    last_error = reason;
                }
            }
            if attempt < attempts {
                pace.sleep(self.backoff());
            }
        }
        Err(TasError::ApplyFailed { attempts, last_error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualPace;

    #[test]
    fn succeeds_after_transient_failures() {
        let pace = ManualPace::new();
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let v = policy
            .run(&pace, |_| {
                calls += 1;
                Ok(if calls < 5 { Outcome::Retry("busy".into()) } else { Outcome::Done(calls) })
            })
            .unwrap();
        assert_eq!(v, 5);
        assert_eq!(pace.slept(), Duration::from_millis(800));
    }

    #[test]
    fn exhaustion_reports_last_error() {
        let pace = ManualPace::new();
        let policy = RetryPolicy { max_attempts: 3, backoff_ms: 10 };
        let err = policy
            .run::<()>(&pace, |n| Ok(Outcome::Retry(format!("fail {}", n))))
            .unwrap_err();
        match err {
            TasError::ApplyFailed { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "fail 3");
            }
            other => panic!("unexpected {other:?}"),
        }
        // NO BACKOFF AFTER THE FINAL ATTEMPT
        assert_eq!(pace.slept(), Duration::from_millis(20));
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let pace = ManualPace::new();
        let mut calls = 0;
        let err = RetryPolicy::default()
            .run::<()>(&pace, |_| {
                calls += 1;
                Err(TasError::ClockUnavailable("gone".into()))
            })
            .unwrap_err();
        assert!(matches!(err, TasError::ClockUnavailable(_)));
        assert_eq!(calls, 1);
        assert_eq!(pace.slept(), Duration::ZERO);
    }

    #[test]
    fn zero_budget_still_tries_once() {
        let pace = ManualPace::new();
        let policy = RetryPolicy { max_attempts: 0, backoff_ms: 200 };
        assert_eq!(policy.run(&pace, |_| Ok(Outcome::Done(7))).unwrap(), 7);
    }
}
