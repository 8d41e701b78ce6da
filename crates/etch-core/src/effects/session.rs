//! Session, balance, and funding effects

use crate::errors::Result;
use crate::id::{OwnerAddress, PaymentRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An open submission session with the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySession {
    /// Bearer token presented on submissions
    pub token: String,
    /// Owner the session was opened for
    pub owner: OwnerAddress,
    /// Expiry as seconds since the Unix epoch
    pub expires_at: u64,
}

impl RelaySession {
    /// Whether the session has expired at `now_secs` (Unix seconds).
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at
    }
}

/// Current wall-clock time as seconds since the Unix epoch.
///
/// Clamps to zero if the system clock reads before the epoch, which makes
/// sessions look fresh rather than expired.
pub fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Result of a balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceStatus {
    /// The owner can fund the planned submissions
    Sufficient,
    /// The owner is short by `needed` units
    Insufficient {
        /// Amount required to proceed
        needed: u64,
    },
}

impl BalanceStatus {
    /// Whether the balance covers the planned submissions.
    pub fn is_sufficient(&self) -> bool {
        matches!(self, BalanceStatus::Sufficient)
    }
}

/// Session and funding operations against the relay.
#[async_trait]
pub trait SessionEffects: Send + Sync {
    /// Open a submission session for `owner`.
    async fn open_session(&self, owner: &OwnerAddress) -> Result<RelaySession>;

    /// Check whether `owner` can fund the planned submissions.
    async fn check_balance(&self, owner: &OwnerAddress) -> Result<BalanceStatus>;

    /// Request funding of `amount` units for `owner`.
    async fn request_funding(&self, owner: &OwnerAddress, amount: u64) -> Result<PaymentRef>;

    /// Verify that a requested payment has settled.
    async fn verify_funding(&self, owner: &OwnerAddress, payment: &PaymentRef) -> Result<()>;
}

#[async_trait]
impl<T: SessionEffects + ?Sized> SessionEffects for Arc<T> {
    async fn open_session(&self, owner: &OwnerAddress) -> Result<RelaySession> {
        (**self).open_session(owner).await
    }

    async fn check_balance(&self, owner: &OwnerAddress) -> Result<BalanceStatus> {
        (**self).check_balance(owner).await
    }

    async fn request_funding(&self, owner: &OwnerAddress, amount: u64) -> Result<PaymentRef> {
        (**self).request_funding(owner, amount).await
    }

    async fn verify_funding(&self, owner: &OwnerAddress, payment: &PaymentRef) -> Result<()> {
        (**self).verify_funding(owner, payment).await
    }
}
