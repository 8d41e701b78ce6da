//! Pipeline configuration
//!
//! [`UploadConfig`] aggregates the per-stage tuning knobs. Every field has a
//! workable default; `validate()` runs once at campaign start so the stages
//! themselves never re-check.

use crate::batch::BatchLimits;
use crate::errors::{EtchError, Result};
use crate::planner::PlannerConfig;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confirmation polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// Confirmations required before a write counts as landed
    pub confirmations: u32,
    /// Overall deadline for one transaction to confirm
    pub timeout: Duration,
    /// Delay between receipt polls
    pub poll_interval: Duration,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl ConfirmConfig {
    /// Set the required confirmation count.
    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Set the per-transaction deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the receipt poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.confirmations == 0 {
            return Err(EtchError::invalid("confirmation count must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(EtchError::invalid("poll interval must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(EtchError::invalid("confirmation timeout must be positive"));
        }
        Ok(())
    }
}

/// Funding flow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingConfig {
    /// Wait after requesting funding before the first verification attempt
    pub settle_delay: Duration,
    /// Retry policy for funding verification
    pub verify: RetryPolicy,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            verify: RetryPolicy::exponential()
                .with_max_attempts(5)
                .with_initial_delay(Duration::from_secs(2))
                .with_max_delay(Duration::from_secs(30)),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Content planning
    pub planner: PlannerConfig,
    /// Batch packing budgets
    pub batching: BatchLimits,
    /// Confirmation polling
    pub confirmation: ConfirmConfig,
    /// Additional passes over failed retryable writes (0 = single pass)
    pub retry_rounds: u32,
    /// Backoff between retry rounds
    pub round_backoff: RetryPolicy,
    /// Balance and funding flow
    pub funding: FundingConfig,
    /// Plans driven concurrently within one campaign
    pub max_concurrent_plans: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            batching: BatchLimits::default(),
            confirmation: ConfirmConfig::default(),
            retry_rounds: 3,
            round_backoff: RetryPolicy::exponential()
                .with_initial_delay(Duration::from_secs(2))
                .with_max_delay(Duration::from_secs(60)),
            funding: FundingConfig::default(),
            max_concurrent_plans: 1,
        }
    }
}

impl UploadConfig {
    /// Set the planner configuration.
    pub fn with_planner(mut self, planner: PlannerConfig) -> Self {
        self.planner = planner;
        self
    }

    /// Set the batch limits.
    pub fn with_batching(mut self, batching: BatchLimits) -> Self {
        self.batching = batching;
        self
    }

    /// Set the confirmation configuration.
    pub fn with_confirmation(mut self, confirmation: ConfirmConfig) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Set the retry round budget.
    pub fn with_retry_rounds(mut self, rounds: u32) -> Self {
        self.retry_rounds = rounds;
        self
    }

    /// Set the backoff between retry rounds.
    pub fn with_round_backoff(mut self, policy: RetryPolicy) -> Self {
        self.round_backoff = policy;
        self
    }

    /// Set the funding configuration.
    pub fn with_funding(mut self, funding: FundingConfig) -> Self {
        self.funding = funding;
        self
    }

    /// Set how many plans run concurrently.
    pub fn with_max_concurrent_plans(mut self, plans: usize) -> Self {
        self.max_concurrent_plans = plans;
        self
    }

    /// Validate every stage's configuration.
    pub fn validate(&self) -> Result<()> {
        self.planner.validate()?;
        self.batching.validate()?;
        self.confirmation.validate()?;
        self.round_backoff.validate()?;
        self.funding.verify.validate()?;
        if self.max_concurrent_plans == 0 {
            return Err(EtchError::invalid("concurrent plan budget must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        UploadConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn test_zero_budgets_rejected() {
        let config = UploadConfig::default().with_max_concurrent_plans(0);
        assert!(config.validate().is_err());

        let config = UploadConfig::default()
            .with_confirmation(ConfirmConfig::default().with_confirmations(0));
        assert!(config.validate().is_err());

        let config = UploadConfig::default()
            .with_confirmation(ConfirmConfig::default().with_poll_interval(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders_compose() {
        let config = UploadConfig::default()
            .with_retry_rounds(1)
            .with_max_concurrent_plans(4);
        assert_eq!(config.retry_rounds, 1);
        assert_eq!(config.max_concurrent_plans, 4);
        config.validate().expect("still valid");
    }
}
