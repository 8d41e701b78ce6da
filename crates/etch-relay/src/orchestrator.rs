//! Submission orchestrator
//!
//! Drives upload plans end to end: session establishment, balance and
//! funding, existence filtering, batch submission, confirmation, and
//! bounded retry rounds. The campaign never loses track of a write; every
//! planned id ends the run as sent, skipped, or failed with a reason.
//!
//! Retry is re-planning, not blind resubmission. Each round re-runs the
//! existence filter over the still-failed writes first, so a write that
//! actually landed despite a client-side error resolves to skipped instead
//! of a duplicate. A chunked plan's directory record is withheld until
//! every fragment it references is confirmed or skipped, which keeps a
//! reader from ever seeing a directory that points at missing fragments.

use crate::confirm::wait_for_confirmations;
use crate::filter::filter_descriptors;
use etch_core::{
    pack_batches, sleep_unless_cancelled, unix_now_secs, BalanceStatus, Batch, CampaignReport,
    CancelToken, EtchError, FailureEntry, OwnerAddress, RelayEffects, RelaySession, Result,
    SentWrite, SubmitAck, TxRef, UploadConfig, UploadPlan, WriteDescriptor, WriteId,
};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

// =============================================================================
// Pipeline
// =============================================================================

/// The campaign driver.
///
/// Generic over one effects value implementing the full relay surface, so
/// the same pipeline runs against the production HTTP client and the
/// in-memory test relay.
#[derive(Debug, Clone)]
pub struct UploadPipeline<E> {
    effects: E,
    config: UploadConfig,
}

impl<E: RelayEffects> UploadPipeline<E> {
    /// Create a pipeline, validating the configuration once up front.
    pub fn new(effects: E, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { effects, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload a single plan. Convenience over [`UploadPipeline::run_campaign`].
    pub async fn upload_plan(
        &self,
        owner: &OwnerAddress,
        plan: UploadPlan,
        cancel: &CancelToken,
    ) -> Result<CampaignReport> {
        self.run_campaign(owner, vec![plan], cancel).await
    }

    /// Drive a set of plans to completion and account for every write.
    ///
    /// Fails fast only before submission starts: session establishment and
    /// the funding flow are fatal, as is cancellation during them. Once
    /// plans are in flight the campaign always produces a report; per-write
    /// problems (rejections, confirmation failures, cancellation) land in
    /// its `failed` entries rather than an `Err`.
    pub async fn run_campaign(
        &self,
        owner: &OwnerAddress,
        plans: Vec<UploadPlan>,
        cancel: &CancelToken,
    ) -> Result<CampaignReport> {
        if plans.is_empty() {
            debug!(owner = %owner, "campaign has no plans, nothing to do");
            return Ok(CampaignReport::default());
        }
        info!(owner = %owner, plans = plans.len(), "starting upload campaign");

        let session = match self.effects.open_session(owner).await {
            Ok(session) => session,
            Err(err) => {
                error!(owner = %owner, error = %err, "failed to open relay session");
                return Err(err);
            }
        };
        debug!(owner = %owner, expires_at = session.expires_at, "relay session opened");
        let session_slot = Mutex::new(session);

        if let Err(err) = self.ensure_funded(owner, cancel).await {
            error!(owner = %owner, error = %err, "funding flow failed");
            return Err(err);
        }

        let runs = plans
            .into_iter()
            .map(|plan| self.drive_plan(owner, plan, &session_slot, cancel));
        let plan_reports: Vec<CampaignReport> = stream::iter(runs)
            .buffered(self.config.max_concurrent_plans)
            .collect()
            .await;

        let mut report = CampaignReport::default();
        for plan_report in plan_reports {
            report.merge(plan_report);
        }

        info!(
            sent = report.sent.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            success = report.success(),
            "campaign finished"
        );
        Ok(report)
    }

    /// Check the balance and run the request/settle/verify funding flow
    /// when it falls short. Only allowlisted transient verification
    /// failures are retried.
    async fn ensure_funded(&self, owner: &OwnerAddress, cancel: &CancelToken) -> Result<()> {
        match self.effects.check_balance(owner).await? {
            BalanceStatus::Sufficient => {
                debug!(owner = %owner, "balance sufficient");
                Ok(())
            }
            BalanceStatus::Insufficient { needed } => {
                warn!(owner = %owner, needed, "balance insufficient, requesting funding");
                let payment = self.effects.request_funding(owner, needed).await?;
                debug!(
                    owner = %owner,
                    payment = %payment,
                    "funding requested, waiting for settlement"
                );
                sleep_unless_cancelled(self.config.funding.settle_delay, cancel).await?;

                self.config
                    .funding
                    .verify
                    .execute_cancellable(
                        cancel,
                        || self.effects.verify_funding(owner, &payment),
                        EtchError::is_transient_funding,
                    )
                    .await?;
                info!(owner = %owner, payment = %payment, "funding verified");
                Ok(())
            }
        }
    }

    async fn drive_plan(
        &self,
        owner: &OwnerAddress,
        plan: UploadPlan,
        session: &Mutex<RelaySession>,
        cancel: &CancelToken,
    ) -> CampaignReport {
        let run = PlanRun {
            pipeline: self,
            owner,
            session,
            cancel,
            directory_id: plan.directory().map(|d| d.id),
            tracker: PlanTracker::new(&plan),
            last_tx: None,
        };
        run.drive().await
    }
}

// =============================================================================
// Per-plan state machine
// =============================================================================

/// One plan's trip through the rounds. Holds the mutable state so the
/// submission methods stay small.
struct PlanRun<'a, E> {
    pipeline: &'a UploadPipeline<E>,
    owner: &'a OwnerAddress,
    session: &'a Mutex<RelaySession>,
    cancel: &'a CancelToken,
    directory_id: Option<WriteId>,
    tracker: PlanTracker,
    last_tx: Option<TxRef>,
}

impl<E: RelayEffects> PlanRun<'_, E> {
    async fn drive(mut self) -> CampaignReport {
        for round in 0..=self.pipeline.config.retry_rounds {
            if !self.tracker.has_unresolved() {
                break;
            }
            if round > 0 {
                let delay = self.pipeline.config.round_backoff.calculate_delay(round - 1);
                info!(round, delay = ?delay, "starting retry round");
                if sleep_unless_cancelled(delay, self.cancel).await.is_err() {
                    break;
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }
            if self.run_round().await.is_err() {
                // Cancelled mid-round; whatever was submitted stays out.
                break;
            }
        }

        self.tracker.fail_pending("campaign cancelled", false);
        self.tracker.into_report(self.last_tx)
    }

    /// One pass: re-check existence, fail oversized writes, submit the
    /// dependency-free writes, then the directory once its fragments have
    /// all resolved. Errs only on cancellation.
    async fn run_round(&mut self) -> Result<()> {
        let candidates = self.tracker.round_candidates();
        if candidates.is_empty() {
            return Ok(());
        }

        let outcome =
            match filter_descriptors(&self.pipeline.effects, self.owner, &candidates).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "existence check failed, failing its writes");
                    let retryable = err.is_retryable();
                    self.tracker
                        .fail_pending(&format!("existence check failed: {err}"), retryable);
                    return Ok(());
                }
            };
        for id in &outcome.skipped {
            self.tracker.skip(id);
        }

        let mut to_send = outcome.to_send;
        self.fail_oversized(&mut to_send);

        let directory = self
            .directory_id
            .and_then(|id| to_send.iter().position(|d| d.id == id))
            .map(|pos| to_send.remove(pos));

        let batches = pack_batches(to_send, &self.pipeline.config.batching);
        self.submit_wave(batches).await?;

        if let Some(directory) = directory {
            if self.tracker.unresolved_others(directory.id) == 0 {
                let batch = Batch {
                    descriptors: vec![directory],
                };
                self.submit_wave(vec![batch]).await?;
            } else if self.tracker.others_permanently_failed(directory.id) {
                self.tracker.fail(
                    &directory.id,
                    "a referenced fragment permanently failed",
                    false,
                );
            } else {
                let unresolved = self.tracker.unresolved_others(directory.id);
                debug!(
                    id = %directory.id,
                    unresolved,
                    "directory deferred until fragments resolve"
                );
                self.tracker.fail(
                    &directory.id,
                    format!("deferred: {unresolved} fragments unresolved"),
                    true,
                );
            }
        }
        Ok(())
    }

    /// Fail writes whose estimate alone exceeds the batch byte budget. The
    /// batcher would emit them as singleton batches; surfacing a clear
    /// error here beats a guaranteed rejection at the relay.
    fn fail_oversized(&mut self, to_send: &mut Vec<WriteDescriptor>) {
        let max_bytes = self.pipeline.config.batching.max_bytes;
        let mut oversized = Vec::new();
        to_send.retain(|descriptor| {
            let estimate = descriptor.estimated_wire_size();
            if estimate <= max_bytes {
                return true;
            }
            oversized.push((descriptor.id, estimate));
            false
        });

        for (id, estimate) in oversized {
            warn!(id = %id, estimate, max_bytes, "write estimate exceeds the batch byte budget");
            self.tracker.fail(
                &id,
                format!("estimated wire size {estimate} exceeds batch byte budget {max_bytes}"),
                false,
            );
        }
    }

    async fn submit_wave(&mut self, batches: Vec<Batch>) -> Result<()> {
        for batch in &batches {
            if self.cancel.is_cancelled() {
                return Err(EtchError::Cancelled);
            }
            self.submit_and_confirm(batch).await?;
        }
        Ok(())
    }

    async fn submit_and_confirm(&mut self, batch: &Batch) -> Result<()> {
        let session = match self.fresh_session().await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "could not refresh relay session");
                let retryable = err.is_retryable();
                for id in batch.ids() {
                    self.tracker
                        .fail(&id, format!("session unavailable: {err}"), retryable);
                }
                return Ok(());
            }
        };

        let acks = match self.pipeline.effects.submit_batch(&session, batch).await {
            Ok(acks) => acks,
            Err(err) => {
                warn!(writes = batch.len(), error = %err, "batch submission failed");
                let retryable = err.is_retryable();
                for id in batch.ids() {
                    self.tracker
                        .fail(&id, format!("batch submission failed: {err}"), retryable);
                }
                return Ok(());
            }
        };
        debug!(
            writes = batch.len(),
            bytes = batch.estimated_bytes(),
            "batch submitted"
        );

        // Acceptances share transactions; confirm each transaction once.
        let mut by_tx: Vec<(TxRef, Vec<WriteId>)> = Vec::new();
        for ack in acks {
            match ack {
                SubmitAck::Accepted { id, tx } => {
                    match by_tx.iter_mut().find(|(known, _)| *known == tx) {
                        Some((_, ids)) => ids.push(id),
                        None => by_tx.push((tx, vec![id])),
                    }
                }
                SubmitAck::Rejected { id, reason } => {
                    warn!(id = %id, reason = %reason, "write rejected by relay");
                    self.tracker
                        .fail(&id, format!("rejected by relay: {reason}"), true);
                }
            }
        }

        for (tx, ids) in by_tx {
            let waited = wait_for_confirmations(
                &self.pipeline.effects,
                &tx,
                &self.pipeline.config.confirmation,
                self.cancel,
            )
            .await;
            match waited {
                Ok(receipt) => {
                    debug!(
                        tx = %tx,
                        confirmations = receipt.confirmations,
                        "transaction confirmed"
                    );
                    for id in &ids {
                        self.tracker.confirm(id, tx.clone());
                    }
                    self.last_tx = Some(tx);
                }
                Err(EtchError::Cancelled) => {
                    for id in &ids {
                        self.tracker
                            .fail(id, "cancelled while awaiting confirmation", false);
                    }
                    return Err(EtchError::Cancelled);
                }
                Err(err) => {
                    warn!(tx = %tx, error = %err, "confirmation failed");
                    let retryable = err.is_retryable();
                    for id in &ids {
                        self.tracker
                            .fail(id, format!("confirmation failed: {err}"), retryable);
                    }
                }
            }
        }
        Ok(())
    }

    /// The current session, reopened when expired. Concurrent plans share
    /// the slot, so at most one reopen happens per expiry.
    async fn fresh_session(&self) -> Result<RelaySession> {
        let mut guard = self.session.lock().await;
        if guard.is_expired(unix_now_secs()) {
            debug!(owner = %self.owner, "relay session expired, reopening");
            *guard = self.pipeline.effects.open_session(self.owner).await?;
        }
        Ok(guard.clone())
    }
}

// =============================================================================
// Write accounting
// =============================================================================

#[derive(Debug, Clone)]
enum WriteState {
    /// Not yet resolved in the current round
    Pending,
    /// Submitted and confirmed
    Confirmed(TxRef),
    /// Already present in the store
    Skipped,
    /// Failed this round, with retry eligibility
    Failed { reason: String, retryable: bool },
}

#[derive(Debug)]
struct TrackedWrite {
    descriptor: WriteDescriptor,
    state: WriteState,
}

/// Per-plan accounting. Duplicate ids (identical fragments) collapse on
/// construction, so every tracked write resolves exactly once.
#[derive(Debug)]
struct PlanTracker {
    writes: Vec<TrackedWrite>,
}

impl PlanTracker {
    fn new(plan: &UploadPlan) -> Self {
        let mut seen = HashSet::new();
        let mut writes = Vec::new();
        for descriptor in plan.descriptors() {
            if seen.insert(descriptor.id) {
                writes.push(TrackedWrite {
                    descriptor: descriptor.clone(),
                    state: WriteState::Pending,
                });
            }
        }
        Self { writes }
    }

    fn slot_mut(&mut self, id: &WriteId) -> Option<&mut TrackedWrite> {
        self.writes.iter_mut().find(|w| w.descriptor.id == *id)
    }

    fn confirm(&mut self, id: &WriteId, tx: TxRef) {
        if let Some(write) = self.slot_mut(id) {
            write.state = WriteState::Confirmed(tx);
        }
    }

    fn skip(&mut self, id: &WriteId) {
        if let Some(write) = self.slot_mut(id) {
            write.state = WriteState::Skipped;
        }
    }

    fn fail(&mut self, id: &WriteId, reason: impl Into<String>, retryable: bool) {
        if let Some(write) = self.slot_mut(id) {
            write.state = WriteState::Failed {
                reason: reason.into(),
                retryable,
            };
        }
    }

    fn fail_pending(&mut self, reason: &str, retryable: bool) {
        for write in &mut self.writes {
            if matches!(write.state, WriteState::Pending) {
                write.state = WriteState::Failed {
                    reason: reason.to_string(),
                    retryable,
                };
            }
        }
    }

    /// Writes eligible for this round, reset to pending: everything not
    /// yet resolved, plus failures worth retrying.
    fn round_candidates(&mut self) -> Vec<WriteDescriptor> {
        let mut candidates = Vec::new();
        for write in &mut self.writes {
            if matches!(
                write.state,
                WriteState::Pending | WriteState::Failed { retryable: true, .. }
            ) {
                write.state = WriteState::Pending;
                candidates.push(write.descriptor.clone());
            }
        }
        candidates
    }

    fn has_unresolved(&self) -> bool {
        self.writes.iter().any(|w| {
            matches!(
                w.state,
                WriteState::Pending | WriteState::Failed { retryable: true, .. }
            )
        })
    }

    /// Writes other than `id` not yet confirmed or skipped.
    fn unresolved_others(&self, id: WriteId) -> usize {
        self.writes
            .iter()
            .filter(|w| w.descriptor.id != id)
            .filter(|w| !matches!(w.state, WriteState::Confirmed(_) | WriteState::Skipped))
            .count()
    }

    /// Whether any write other than `id` failed beyond retry.
    fn others_permanently_failed(&self, id: WriteId) -> bool {
        self.writes.iter().any(|w| {
            w.descriptor.id != id
                && matches!(
                    w.state,
                    WriteState::Failed {
                        retryable: false,
                        ..
                    }
                )
        })
    }

    fn into_report(self, last_tx: Option<TxRef>) -> CampaignReport {
        let mut report = CampaignReport {
            last_tx,
            ..CampaignReport::default()
        };
        for write in self.writes {
            let id = write.descriptor.id;
            match write.state {
                WriteState::Confirmed(tx) => report.sent.push(SentWrite { id, tx }),
                WriteState::Skipped => report.skipped.push(id),
                WriteState::Failed { reason, retryable } => report.failed.push(FailureEntry {
                    id,
                    reason,
                    retryable,
                }),
                WriteState::Pending => report.failed.push(FailureEntry {
                    id,
                    reason: "write was never submitted".to_string(),
                    retryable: true,
                }),
            }
        }
        report
    }
}
