//! Timeout and bounded retry for checkout steps that leave the process.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::db::RepositoryError;
use crate::services::guest::ProvisionError;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Doubling delay starting at `base`, capped at `max`.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                base.saturating_mul(multiplier).min(*max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }
}

/// Time and retry budget for one asynchronous checkout step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// Limit for a single try.
    pub timeout: Duration,
    /// Extra tries after the first one.
    pub max_retries: u32,
    /// Delay between tries.
    pub backoff: BackoffStrategy,
}

impl StepPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(timeout: Duration, max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self {
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Same timeout, single try. For steps that are not safe to repeat.
    #[must_use]
    pub const fn single_try(self) -> Self {
        Self {
            timeout: self.timeout,
            max_retries: 0,
            backoff: BackoffStrategy::None,
        }
    }
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 2, BackoffStrategy::default())
    }
}

/// Errors that say whether trying again could help.
pub trait Retryable {
    /// Whether the same call may succeed if repeated.
    fn is_retryable(&self) -> bool;
}

impl Retryable for RepositoryError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for ProvisionError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_transient())
    }
}

/// Why a step gave up.
#[derive(Debug)]
pub enum StepFailure<E> {
    /// The last try returned an error.
    Failed(E),
    /// The last try did not finish within the policy's timeout.
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for StepFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e}"),
            Self::TimedOut(limit) => write!(f, "timed out after {limit:?}"),
        }
    }
}

/// Run `op` under `policy`.
///
/// Each try is bounded by the policy's timeout. Timeouts and retryable errors
/// are retried until the budget runs out; other errors return immediately.
///
/// # Errors
///
/// Returns the failure of the last try.
pub async fn run_step<T, E, F, Fut>(
    step: &'static str,
    policy: &StepPolicy,
    mut op: F,
) -> Result<T, StepFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt = 0;
    loop {
        let failure = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_retryable() => return Err(StepFailure::Failed(e)),
            Ok(Err(e)) => StepFailure::Failed(e),
            Err(_) => StepFailure::TimedOut(policy.timeout),
        };

        if attempt >= policy.max_retries {
            return Err(failure);
        }

        let delay = policy.backoff.delay_for_attempt(attempt);
        warn!(step, attempt, ?delay, error = %failure, "Checkout step failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
