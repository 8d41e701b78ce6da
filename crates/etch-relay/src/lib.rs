//! Etch Relay - pipeline behavior over the relay effect surface
//!
//! This crate drives upload plans to durable completion: the existence
//! filter decides what still needs to go out, the confirmation engine waits
//! for finality, and the orchestrator sequences session, funding, batches,
//! and retry rounds into one resumable campaign. A production HTTP client
//! implements the effect traits against a JSON relay API.
//!
//! Everything here is parameterized by the effect traits from `etch-core`,
//! so the same campaign logic runs against the production client and the
//! in-memory test relay.

#![forbid(unsafe_code)]

/// Existence filtering against the store
pub mod filter;

/// Receipt polling until finality
pub mod confirm;

/// Campaign orchestration
pub mod orchestrator;

/// Production HTTP relay client
pub mod http;

pub use confirm::wait_for_confirmations;
pub use filter::{filter_descriptors, FilterOutcome};
pub use http::{HttpRelay, HttpRelayConfig};
pub use orchestrator::UploadPipeline;
