//! Bounded retry for flaky lookups and actions.
//!
//! [`fetch_with_retry`] drives a lookup that may come back empty:
//!
//! 1. Run the lookup; a non-empty result returns immediately.
//! 2. An empty result or any error is logged and counts as a failed attempt.
//! 3. A structural error (see [`Error::is_structural`]) aborts the loop and is
//!    returned as-is.
//! 4. Before every attempt after the first, sleep the policy's delay.
//! 5. When the budget is spent, return [`Error::DataNotFound`].
//!
//! Both functions are plain futures; dropping them (for example from an
//! enclosing `tokio::time::timeout`) cancels the loop at the next await.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::CoreSettings;
use crate::error::{Error, Result};

/// Attempt budget and pacing for one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    inter_attempt_delay: Duration,
}

#[derive(Deserialize)]
struct RawRetryPolicy {
    max_attempts: u32,
    inter_attempt_delay: Duration,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = Error;

    fn try_from(raw: RawRetryPolicy) -> Result<Self> {
        Self::new(raw.max_attempts, raw.inter_attempt_delay)
    }
}

impl RetryPolicy {
    /// # Errors
    ///
    /// [`Error::Configuration`] if `max_attempts` is zero.
    pub fn new(max_attempts: u32, inter_attempt_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::configuration("retry policy needs at least one attempt"));
        }
        Ok(Self {
            max_attempts,
            inter_attempt_delay,
        })
    }

    /// `max_attempts` attempts with no delay between them. Zero is raised to one.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            inter_attempt_delay: Duration::ZERO,
        }
    }

    pub fn from_settings(settings: &CoreSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            inter_attempt_delay: settings.retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn inter_attempt_delay(&self) -> Duration {
        self.inter_attempt_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&CoreSettings::default())
    }
}

async fn pause_before(attempt: u32, policy: &RetryPolicy) {
    if attempt > 1 && !policy.inter_attempt_delay.is_zero() {
        debug!(
            attempt,
            delay_ms = policy.inter_attempt_delay.as_millis() as u64,
            "waiting before next attempt"
        );
        tokio::time::sleep(policy.inter_attempt_delay).await;
    }
}

/// Run `lookup` until it yields a value or the policy is exhausted.
///
/// `lookup` receives the 1-based attempt number. `subject` names what is being
/// fetched and ends up in [`Error::DataNotFound`].
pub async fn fetch_with_retry<T, F, Fut>(
    subject: &str,
    policy: &RetryPolicy,
    mut lookup: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let span = info_span!("fetch_with_retry", subject, max_attempts = policy.max_attempts);
    async {
        for attempt in 1..=policy.max_attempts {
            pause_before(attempt, policy).await;

            match lookup(attempt).await {
                Ok(Some(value)) => {
                    info!(attempt, "lookup succeeded");
                    return Ok(value);
                }
                Ok(None) => warn!(attempt, "lookup returned no result"),
                Err(e) if e.is_structural() => {
                    error!(attempt, error = %e, "lookup failed with a structural error");
                    return Err(e);
                }
                Err(e) => warn!(attempt, error = %e, "lookup attempt failed"),
            }
        }

        error!(attempts = policy.max_attempts, "retry budget exhausted");
        Err(Error::DataNotFound {
            attempts: policy.max_attempts,
            subject: subject.to_string(),
        })
    }
    .instrument(span)
    .await
}

/// Run `action` until it succeeds or the policy is exhausted.
///
/// Unlike [`fetch_with_retry`], every error is retried and the error of the
/// final attempt is returned.
pub async fn retry_action<F, Fut>(
    description: &str,
    policy: &RetryPolicy,
    mut action: F,
) -> Result<()>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        pause_before(attempt, policy).await;
        match action(attempt).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.max_attempts => {
                warn!(description, attempt, error = %e, "action failed, retrying");
            }
            Err(e) => {
                error!(description, attempt, error = %e, "action failed on final attempt");
                return Err(e);
            }
        }
        attempt += 1;
    }
}
