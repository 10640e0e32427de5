//! Bounded-retry polling for operations that may not have converged yet.
//!
//! [`do_with_retry`] calls an operation up to [`RetryPolicy::max_attempts`]
//! times with a fixed sleep in between. Every [`PollError::Retryable`] is
//! swallowed until the budget runs out; the last one is then surfaced as
//! [`RetryError::Exhausted`]. [`PollError::Fatal`] stops immediately.
//!
//! The wait is a plain sequential loop on the calling task: the caller is
//! parked for the whole budget, `max_attempts × interval` is the effective
//! timeout, and nothing cancels a sleep short of dropping the future.
//!
//! ```ignore
//! let ip = do_with_retry("Waiting for instances", MEMBERSHIP_POLICY, || async {
//!     cloud.addresses(group).await.map_err(PollError::retry)
//! })
//! .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{ConfigError, RetryError};

/// Instance group boot: 30 attempts, 5 seconds apart.
pub const MEMBERSHIP_POLICY: RetryPolicy = RetryPolicy::fixed(30, Duration::from_secs(5));

/// Gossip convergence and leader election: 60 attempts, 10 seconds apart.
pub const CONVERGENCE_POLICY: RetryPolicy = RetryPolicy::fixed(60, Duration::from_secs(10));

/// Attempt budget and spacing. Immutable, passed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` must be at least 1.
    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            max_attempts,
            interval,
        })
    }

    /// Const constructor for the built-in policies. A zero budget fails
    /// const evaluation of the constant that uses it.
    pub(crate) const fn fixed(max_attempts: u32, interval: Duration) -> Self {
        assert!(max_attempts > 0, "retry policy needs at least one attempt");
        Self {
            max_attempts,
            interval,
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Longest time a poll under this policy can spend sleeping.
    pub fn budget(&self) -> Duration {
        self.interval * (self.max_attempts - 1)
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// Not converged yet; try again after the interval.
    Retryable(String),
    /// Retrying cannot help; stop now.
    Fatal(String),
}

impl PollError {
    pub fn retry(reason: impl fmt::Display) -> Self {
        Self::Retryable(reason.to_string())
    }

    pub fn fatal(reason: impl fmt::Display) -> Self {
        Self::Fatal(reason.to_string())
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Retryable(reason) | Self::Fatal(reason) => reason,
        }
    }
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Run `operation` until it succeeds, fails fatally, or the policy is spent.
///
/// Performs exactly `k` invocations when attempt `k` succeeds, and exactly
/// `max_attempts` invocations with `max_attempts - 1` sleeps when every
/// attempt fails.
///
/// # Errors
///
/// - [`RetryError::Exhausted`] with the error of the final attempt
/// - [`RetryError::Aborted`] when an attempt returns [`PollError::Fatal`]
pub async fn do_with_retry<T, F, Fut>(
    description: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PollError>>,
{
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        debug!(description, attempt, max_attempts, "polling");

        match operation().await {
            Ok(value) => return Ok(value),
            Err(PollError::Fatal(reason)) => {
                error!(description, attempt, error = %reason, "non-retryable failure");
                return Err(RetryError::Aborted {
                    description: description.to_owned(),
                    attempt,
                    reason,
                });
            }
            Err(PollError::Retryable(reason)) => {
                if attempt == max_attempts {
                    error!(
                        description,
                        attempts = max_attempts,
                        error = %reason,
                        "retry budget exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        description: description.to_owned(),
                        attempts: max_attempts,
                        last_error: reason,
                    });
                }

                warn!(
                    description,
                    attempt,
                    max_attempts,
                    error = %reason,
                    sleep_secs = policy.interval().as_secs_f64(),
                    "attempt failed, will try again"
                );
                tokio::time::sleep(policy.interval()).await;
            }
        }
    }

    unreachable!("max_attempts is at least 1")
}
