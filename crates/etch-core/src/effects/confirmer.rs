//! Receipt lookup effects

use crate::errors::Result;
use crate::id::TxRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Execution status reported by a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// Not yet executed
    Pending,
    /// Executed successfully
    Executed,
    /// Executed and rolled back
    Reverted,
}

/// Current state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The transaction this receipt describes
    pub tx: TxRef,
    /// Execution status
    pub status: ReceiptStatus,
    /// Confirmations accumulated so far
    pub confirmations: u32,
}

impl Receipt {
    /// Whether the transaction has executed with at least `required`
    /// confirmations.
    pub fn is_final(&self, required: u32) -> bool {
        self.status == ReceiptStatus::Executed && self.confirmations >= required
    }
}

/// Single-shot receipt lookup.
///
/// Handlers answer one question: what does the relay report for this
/// transaction right now. The polling loop with deadline and cancellation
/// lives in the confirmation engine.
#[async_trait]
pub trait ConfirmEffects: Send + Sync {
    /// Fetch the current receipt for `tx`, if the relay knows it yet.
    async fn fetch_receipt(&self, tx: &TxRef) -> Result<Option<Receipt>>;
}

#[async_trait]
impl<T: ConfirmEffects + ?Sized> ConfirmEffects for Arc<T> {
    async fn fetch_receipt(&self, tx: &TxRef) -> Result<Option<Receipt>> {
        (**self).fetch_receipt(tx).await
    }
}
