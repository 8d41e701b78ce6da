//! In-memory relay with scriptable failures
//!
//! [`MockRelay`] implements all four relay effect traits against in-memory
//! state. Behavior is deterministic: writes land synchronously at submission
//! time, receipts accumulate one confirmation per poll, and every failure
//! mode is injected explicitly through the scripting methods.
//!
//! Failure scripts are consumed: `fail_batches(2)` fails the next two
//! `submit_batch` calls and then the relay behaves normally again, which is
//! exactly the shape retry tests need.

use async_trait::async_trait;
use etch_core::{
    unix_now_secs, BalanceStatus, Batch, ChunkDirectory, ConfirmEffects, EtchError, OwnerAddress,
    PaymentRef, ReadEffects, Receipt, ReceiptStatus, RecordKey, RelaySession, Result,
    SessionEffects, StoredRecord, SubmitAck, SubmitEffects, TxRef, WriteDescriptor, WriteId,
    WritePayload,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Call counts observed by the mock, for asserting how often the pipeline
/// touched each surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounters {
    /// `submit_batch` calls, including scripted transport failures
    pub submit_batches: u64,
    /// `read_record` calls
    pub record_reads: u64,
    /// `fragment_exists` calls
    pub fragment_probes: u64,
    /// `fetch_receipt` calls
    pub receipt_polls: u64,
    /// `open_session` calls
    pub sessions_opened: u64,
    /// `check_balance` calls
    pub balance_checks: u64,
    /// `request_funding` calls
    pub funding_requests: u64,
    /// `verify_funding` calls
    pub funding_verifies: u64,
}

#[derive(Debug, Clone)]
struct TxState {
    /// Receipt polls served for this transaction so far
    polls: u32,
    /// Status reported once the pending phase is over
    outcome: ReceiptStatus,
}

#[derive(Debug, Default)]
struct RelayState {
    /// Landed keyed records
    records: HashMap<(OwnerAddress, RecordKey), StoredRecord>,
    /// Landed fragments with their payload bytes
    fragments: HashMap<(OwnerAddress, WriteId), Vec<u8>>,
    /// Submitted transactions awaiting polls
    txs: HashMap<String, TxState>,
    /// Polls a receipt reports `Pending` before flipping to its outcome
    polls_until_executed: u32,
    /// Session lifetime handed out by `open_session`
    session_ttl_secs: u64,
    /// `Some(needed)` while the owner balance is short
    balance_shortfall: Option<u64>,
    /// Amount passed to the most recent `request_funding`
    last_funding_amount: Option<u64>,
    /// `verify_funding` failures left before verification succeeds
    funding_failures_left: u32,
    /// Error message for scripted verification failures
    funding_failure_message: String,
    /// Remaining per-write rejections, keyed by write id
    submit_rejections: HashMap<WriteId, u32>,
    /// `submit_batch` calls left that fail at the transport level
    batch_failures_left: u32,
    /// `read_record` calls left that fail
    record_read_failures_left: u32,
    /// Transactions left that execute then revert
    revert_txs_left: u32,
    /// Writes that land even when their ack is a rejection
    land_despite_rejection: HashSet<WriteId>,
    counters: MockCounters,
    session_counter: u64,
    payment_counter: u64,
    tx_counter: u64,
}

/// Deterministic in-memory relay implementing the full effect surface.
///
/// Clones share state, so a test can hold one handle for scripting and
/// inspection while the pipeline drives another.
#[derive(Debug, Clone)]
pub struct MockRelay {
    state: Arc<Mutex<RelayState>>,
}

impl MockRelay {
    /// Create a relay with ample balance and no scripted failures.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                session_ttl_secs: 3600,
                ..RelayState::default()
            })),
        }
    }

    /// Set the session lifetime handed out by `open_session`.
    pub fn with_session_ttl(self, secs: u64) -> Self {
        self.state.lock().unwrap().session_ttl_secs = secs;
        self
    }

    /// Make receipts report `Pending` for the first `polls` lookups.
    pub fn with_polls_until_executed(self, polls: u32) -> Self {
        self.state.lock().unwrap().polls_until_executed = polls;
        self
    }

    /// Start with the owner balance short by `needed` units.
    ///
    /// The shortfall clears when `verify_funding` succeeds.
    pub fn with_insufficient_balance(self, needed: u64) -> Self {
        self.state.lock().unwrap().balance_shortfall = Some(needed);
        self
    }

    // =========================================================================
    // Seeding and scripting
    // =========================================================================

    /// Seed a keyed record as already stored.
    pub fn seed_record(&self, owner: &OwnerAddress, key: &RecordKey, label: &str, value: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.records.insert(
            (owner.clone(), key.clone()),
            StoredRecord::new(label, value),
        );
    }

    /// Seed a fragment as already stored.
    pub fn seed_fragment(&self, owner: &OwnerAddress, data: Vec<u8>) {
        let id = WriteId::for_fragment(&data);
        let mut state = self.state.lock().unwrap();
        state.fragments.insert((owner.clone(), id), data);
    }

    /// Reject the next `times` submissions of the write identified by `id`.
    pub fn reject_submits(&self, id: WriteId, times: u32) {
        self.state.lock().unwrap().submit_rejections.insert(id, times);
    }

    /// Fail the next `times` `submit_batch` calls at the transport level.
    pub fn fail_batches(&self, times: u32) {
        self.state.lock().unwrap().batch_failures_left = times;
    }

    /// Fail the next `times` `read_record` calls.
    pub fn fail_record_reads(&self, times: u32) {
        self.state.lock().unwrap().record_read_failures_left = times;
    }

    /// Make the next `times` submitted transactions revert.
    ///
    /// Writes carried by a reverting transaction do not land.
    pub fn revert_next_txs(&self, times: u32) {
        self.state.lock().unwrap().revert_txs_left = times;
    }

    /// Land `id` when submitted even if its ack is a scripted rejection.
    ///
    /// Models the relay applying a write whose acknowledgement was lost, the
    /// case the pre-submission re-check exists for.
    pub fn land_despite_rejection(&self, id: WriteId) {
        self.state.lock().unwrap().land_despite_rejection.insert(id);
    }

    /// Fail the next `times` `verify_funding` calls with `message`.
    pub fn fail_funding_verifies(&self, times: u32, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.funding_failures_left = times;
        state.funding_failure_message = message.to_string();
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of the call counters.
    pub fn counters(&self) -> MockCounters {
        self.state.lock().unwrap().counters
    }

    /// The record currently stored under `key`, if any.
    pub fn stored_record(&self, owner: &OwnerAddress, key: &RecordKey) -> Option<StoredRecord> {
        let state = self.state.lock().unwrap();
        state.records.get(&(owner.clone(), key.clone())).cloned()
    }

    /// Number of fragments currently stored across all owners.
    pub fn stored_fragment_count(&self) -> usize {
        self.state.lock().unwrap().fragments.len()
    }

    /// Amount passed to the most recent `request_funding` call.
    pub fn last_funding_amount(&self) -> Option<u64> {
        self.state.lock().unwrap().last_funding_amount
    }

    /// Reassemble chunked content from the directory stored under `key`.
    ///
    /// Returns `None` if the record is missing, is not a directory, or lists
    /// a fragment that never landed.
    pub fn reassemble(&self, owner: &OwnerAddress, key: &RecordKey) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let record = state.records.get(&(owner.clone(), key.clone()))?;
        let encoded = String::from_utf8(record.value.clone()).ok()?;
        let directory = ChunkDirectory::decode(&encoded).ok()?;

        let mut content = Vec::new();
        for id in &directory.fragment_ids {
            content.extend_from_slice(state.fragments.get(&(owner.clone(), *id))?);
        }
        Some(content)
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn land(state: &mut RelayState, owner: &OwnerAddress, descriptor: &WriteDescriptor) {
    match &descriptor.payload {
        WritePayload::Normal { key, label, value } => {
            state.records.insert(
                (owner.clone(), key.clone()),
                StoredRecord::new(label.clone(), value.clone()),
            );
        }
        WritePayload::Fragment { data } => {
            state
                .fragments
                .insert((owner.clone(), descriptor.id), data.clone());
        }
        WritePayload::Directory {
            key,
            label,
            directory,
        } => {
            state.records.insert(
                (owner.clone(), key.clone()),
                StoredRecord::new(label.clone(), directory.encode().into_bytes()),
            );
        }
    }
}

#[async_trait]
impl ReadEffects for MockRelay {
    async fn read_record(
        &self,
        owner: &OwnerAddress,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>> {
        let mut state = self.state.lock().unwrap();
        state.counters.record_reads += 1;
        if state.record_read_failures_left > 0 {
            state.record_read_failures_left -= 1;
            return Err(EtchError::read("injected record read failure"));
        }
        Ok(state.records.get(&(owner.clone(), key.clone())).cloned())
    }

    async fn fragment_exists(&self, owner: &OwnerAddress, id: &WriteId) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.counters.fragment_probes += 1;
        Ok(state.fragments.contains_key(&(owner.clone(), *id)))
    }
}

#[async_trait]
impl SubmitEffects for MockRelay {
    async fn submit_batch(&self, session: &RelaySession, batch: &Batch) -> Result<Vec<SubmitAck>> {
        let mut state = self.state.lock().unwrap();
        state.counters.submit_batches += 1;

        if state.batch_failures_left > 0 {
            state.batch_failures_left -= 1;
            return Err(EtchError::network("injected batch transport failure"));
        }

        state.tx_counter += 1;
        let tx = TxRef::new(format!("tx-{}", state.tx_counter));
        let outcome = if state.revert_txs_left > 0 {
            state.revert_txs_left -= 1;
            ReceiptStatus::Reverted
        } else {
            ReceiptStatus::Executed
        };

        let owner = session.owner.clone();
        let mut acks = Vec::with_capacity(batch.len());
        for descriptor in &batch.descriptors {
            let rejected = match state.submit_rejections.get_mut(&descriptor.id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };

            if rejected {
                if outcome == ReceiptStatus::Executed
                    && state.land_despite_rejection.contains(&descriptor.id)
                {
                    land(&mut state, &owner, descriptor);
                }
                acks.push(SubmitAck::Rejected {
                    id: descriptor.id,
                    reason: "injected rejection".to_string(),
                });
            } else {
                if outcome == ReceiptStatus::Executed {
                    land(&mut state, &owner, descriptor);
                }
                acks.push(SubmitAck::Accepted {
                    id: descriptor.id,
                    tx: tx.clone(),
                });
            }
        }

        state
            .txs
            .insert(tx.as_str().to_string(), TxState { polls: 0, outcome });
        Ok(acks)
    }
}

#[async_trait]
impl ConfirmEffects for MockRelay {
    async fn fetch_receipt(&self, tx: &TxRef) -> Result<Option<Receipt>> {
        let mut state = self.state.lock().unwrap();
        state.counters.receipt_polls += 1;
        let threshold = state.polls_until_executed;

        let Some(tx_state) = state.txs.get_mut(tx.as_str()) else {
            return Ok(None);
        };
        tx_state.polls += 1;

        if tx_state.polls <= threshold {
            return Ok(Some(Receipt {
                tx: tx.clone(),
                status: ReceiptStatus::Pending,
                confirmations: 0,
            }));
        }
        Ok(Some(Receipt {
            tx: tx.clone(),
            status: tx_state.outcome,
            confirmations: tx_state.polls - threshold,
        }))
    }
}

#[async_trait]
impl SessionEffects for MockRelay {
    async fn open_session(&self, owner: &OwnerAddress) -> Result<RelaySession> {
        let mut state = self.state.lock().unwrap();
        state.counters.sessions_opened += 1;
        state.session_counter += 1;
        Ok(RelaySession {
            token: format!("session-{}", state.session_counter),
            owner: owner.clone(),
            expires_at: unix_now_secs().saturating_add(state.session_ttl_secs),
        })
    }

    async fn check_balance(&self, _owner: &OwnerAddress) -> Result<BalanceStatus> {
        let mut state = self.state.lock().unwrap();
        state.counters.balance_checks += 1;
        Ok(match state.balance_shortfall {
            Some(needed) => BalanceStatus::Insufficient { needed },
            None => BalanceStatus::Sufficient,
        })
    }

    async fn request_funding(&self, _owner: &OwnerAddress, amount: u64) -> Result<PaymentRef> {
        let mut state = self.state.lock().unwrap();
        state.counters.funding_requests += 1;
        state.last_funding_amount = Some(amount);
        state.payment_counter += 1;
        Ok(PaymentRef::new(format!("payment-{}", state.payment_counter)))
    }

    async fn verify_funding(&self, _owner: &OwnerAddress, _payment: &PaymentRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.counters.funding_verifies += 1;
        if state.funding_failures_left > 0 {
            state.funding_failures_left -= 1;
            return Err(EtchError::funding(state.funding_failure_message.clone()));
        }
        state.balance_shortfall = None;
        Ok(())
    }
}
