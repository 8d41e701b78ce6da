//! Retry policies
//!
//! Backoff calculation and bounded retry execution. Retryability is decided
//! by the caller through a classification predicate, so the same policy
//! serves funding verification (allowlist-matched errors only) and batch
//! resubmission (transient submit and confirmation failures).

use crate::cancel::{sleep_unless_cancelled, CancelToken};
use crate::errors::{EtchError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear increase: delay * attempt
    Linear,
    /// Exponential increase: delay * 2^attempt
    Exponential,
    /// Exponential with jitter to prevent thundering herd
    ExponentialWithJitter,
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number
    ///
    /// # Arguments
    /// - `attempt`: Zero-based attempt number (0 = first retry)
    /// - `initial_delay`: Base delay duration
    /// - `max_delay`: Maximum delay duration
    pub fn calculate_delay(
        &self,
        attempt: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Duration {
        use rand::Rng;

        let delay = match self {
            BackoffStrategy::Fixed => initial_delay,
            BackoffStrategy::Linear => initial_delay * (attempt + 1),
            BackoffStrategy::Exponential => {
                let multiplier = 2u32.saturating_pow(attempt);
                initial_delay * multiplier
            }
            BackoffStrategy::ExponentialWithJitter => {
                let base_delay = initial_delay * 2u32.saturating_pow(attempt);
                let jitter =
                    (base_delay.as_millis() as f64 * 0.1 * rand::thread_rng().gen::<f64>()) as u64;
                base_delay + Duration::from_millis(jitter)
            }
        };

        delay.min(max_delay)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (1 = no retries)
    pub max_attempts: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff strategy to use
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// Create a new retry policy with exponential backoff
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Create a retry policy with fixed delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Switch to exponential backoff with jitter
    pub fn with_jitter(mut self) -> Self {
        self.strategy = BackoffStrategy::ExponentialWithJitter;
        self
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EtchError::invalid("retry policy needs at least one attempt"));
        }
        Ok(())
    }

    /// Calculate delay for a specific attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.strategy
            .calculate_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// Execute an operation, retrying every failure up to the attempt budget.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_when(operation, |_| true).await
    }

    /// Execute an operation, retrying only failures `retryable` accepts.
    ///
    /// Returns the first success, or the error that exhausted the attempt
    /// budget or was classified permanent.
    pub async fn execute_when<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        mut retryable: P,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
        P: FnMut(&E) -> bool,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    warn!(attempt, delay = ?delay, error = %err, "retrying after failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`RetryPolicy::execute_when`], but aborts between attempts when
    /// `cancel` fires.
    pub async fn execute_cancellable<F, Fut, T, P>(
        &self,
        cancel: &CancelToken,
        mut operation: F,
        mut retryable: P,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(&EtchError) -> bool,
    {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(EtchError::Cancelled);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    warn!(attempt, delay = ?delay, error = %err, "retrying after failure");
                    sleep_unless_cancelled(delay, cancel).await?;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(attempts)
    }

    #[test]
    fn test_exponential_delay_doubles_and_caps() {
        let strategy = BackoffStrategy::Exponential;
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(350);

        assert_eq!(strategy.calculate_delay(0, initial, max), initial);
        assert_eq!(
            strategy.calculate_delay(1, initial, max),
            Duration::from_millis(200)
        );
        assert_eq!(strategy.calculate_delay(2, initial, max), max);
        assert_eq!(strategy.calculate_delay(10, initial, max), max);
    }

    #[test]
    fn test_fixed_and_linear_delays() {
        let initial = Duration::from_millis(10);
        let max = Duration::from_secs(1);
        assert_eq!(
            BackoffStrategy::Fixed.calculate_delay(5, initial, max),
            initial
        );
        assert_eq!(
            BackoffStrategy::Linear.calculate_delay(2, initial, max),
            Duration::from_millis(30)
        );
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::exponential().validate().is_ok());
        assert!(RetryPolicy::exponential()
            .with_max_attempts(0)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result: Result<u32> = fast_policy(5)
            .execute_when(
                move || {
                    let attempts = Arc::clone(&op_attempts);
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(EtchError::network("flaky"))
                        } else {
                            Ok(7)
                        }
                    }
                },
                EtchError::is_retryable,
            )
            .await;

        assert_eq!(result.expect("eventually succeeds"), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result: Result<u32> = fast_policy(5)
            .execute_when(
                move || {
                    let attempts = Arc::clone(&op_attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(EtchError::invalid("bad input"))
                    }
                },
                EtchError::is_retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_exhausted() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result: Result<u32> = fast_policy(3)
            .execute_when(
                move || {
                    let attempts = Arc::clone(&op_attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(EtchError::network("still down"))
                    }
                },
                EtchError::is_retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let (canceller, token) = CancelToken::new();
        canceller.cancel();

        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result: Result<u32> = fast_policy(3)
            .execute_cancellable(
                &token,
                move || {
                    let attempts = Arc::clone(&op_attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    }
                },
                EtchError::is_retryable,
            )
            .await;

        assert_matches!(result, Err(EtchError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
