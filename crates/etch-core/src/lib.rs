//! Etch Core - data model for the batch upload pipeline
//!
//! This crate provides the pure types and algorithms behind the upload
//! pipeline: content is planned into write descriptors, descriptors are
//! packed into bounded batches, and submission runs against a relay through
//! narrow effect interfaces. Nothing in this crate performs I/O.
//!
//! # Pipeline stages
//!
//! - [`planner`]: content blob to an [`plan::UploadPlan`] of write
//!   descriptors (inline, or fragments plus a directory record)
//! - [`batch`]: order-preserving packing under count and byte budgets
//! - [`effects`]: the seams a relay implementation plugs into
//!   (`ReadEffects`, `SubmitEffects`, `ConfirmEffects`, `SessionEffects`)
//! - [`retry`] and [`cancel`]: backoff policies and cooperative shutdown
//!
//! # Idempotency model
//!
//! Every write carries a [`id::WriteId`] derived from its content. Reading
//! the store before submitting lets a re-run of the same plan skip writes
//! that already landed, so crash recovery is simply running the plan again.

#![forbid(unsafe_code)]

// === Core Modules ===

/// SHA-256 helpers for deriving write identities
pub mod hash;

/// Write, owner, transaction, and payment identifiers
pub mod id;

/// Write descriptors and the fragment directory codec
pub mod descriptor;

/// Upload plans with explicit fragment/directory dependencies
pub mod plan;

/// Content planning into inline or chunked plans
pub mod planner;

/// Order-preserving batch packing
pub mod batch;

/// Unified error handling
pub mod errors;

/// Backoff strategies and retry policies
pub mod retry;

/// Cooperative cancellation tokens
pub mod cancel;

/// Pipeline configuration
pub mod config;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Campaign outcome reporting
pub mod report;

// === Re-exports ===

pub use batch::{pack_batches, Batch, BatchLimits};
pub use cancel::{sleep_unless_cancelled, CancelToken, Canceller};
pub use config::{ConfirmConfig, FundingConfig, UploadConfig};
pub use descriptor::{ChunkDirectory, WriteDescriptor, WriteKind, WritePayload};
pub use errors::{EtchError, Result};
pub use id::{OwnerAddress, PaymentRef, RecordKey, TxRef, WriteId};
pub use plan::UploadPlan;
pub use planner::{plan_upload, PlannerConfig};
pub use report::{CampaignReport, FailureEntry, SentWrite};
pub use retry::{BackoffStrategy, RetryPolicy};

pub use effects::{
    unix_now_secs, BalanceStatus, ConfirmEffects, ReadEffects, Receipt, ReceiptStatus,
    RelayEffects, RelaySession, SessionEffects, StoredRecord, SubmitAck, SubmitEffects,
};
