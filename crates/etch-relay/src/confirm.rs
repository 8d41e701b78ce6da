//! Confirmation engine
//!
//! Polls single-shot receipt lookups into a finality answer: executed with
//! enough confirmations, reverted, or out of time. The effect handler only
//! answers "what does the relay report right now"; the deadline, the poll
//! cadence, and cancellation all live here.

use etch_core::{
    CancelToken, ConfirmConfig, ConfirmEffects, EtchError, Receipt, ReceiptStatus, Result, TxRef,
};
use std::time::Instant;
use tracing::debug;

/// Wait until `tx` has executed with the configured confirmation depth.
///
/// Polls every `poll_interval` until the deadline. A reverted transaction
/// fails immediately with a confirmation error; lookup failures and
/// not-yet-known receipts count as "not yet" and keep polling. Cancellation
/// aborts the wait promptly, it does not unsend the transaction.
pub async fn wait_for_confirmations<C: ConfirmEffects + ?Sized>(
    confirmer: &C,
    tx: &TxRef,
    config: &ConfirmConfig,
    cancel: &CancelToken,
) -> Result<Receipt> {
    let deadline = Instant::now() + config.timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(EtchError::Cancelled);
        }

        match confirmer.fetch_receipt(tx).await {
            Ok(Some(receipt)) => match receipt.status {
                ReceiptStatus::Reverted => {
                    return Err(EtchError::confirmation(format!("transaction {tx} reverted")));
                }
                ReceiptStatus::Executed if receipt.is_final(config.confirmations) => {
                    return Ok(receipt);
                }
                _ => {
                    debug!(
                        tx = %tx,
                        confirmations = receipt.confirmations,
                        "transaction not final yet"
                    );
                }
            },
            Ok(None) => {
                debug!(tx = %tx, "relay does not know the transaction yet");
            }
            Err(err) => {
                debug!(tx = %tx, error = %err, "receipt lookup failed, will re-poll");
            }
        }

        // Stop if even one more poll interval cannot fit before the deadline.
        if Instant::now() + config.poll_interval > deadline {
            return Err(EtchError::timeout(format!(
                "no confirmation for {tx} within {:?}",
                config.timeout
            )));
        }
        etch_core::sleep_unless_cancelled(config.poll_interval, cancel).await?;
    }
}
