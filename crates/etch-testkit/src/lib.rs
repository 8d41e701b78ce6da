//! Etch Testkit - deterministic test infrastructure
//!
//! Provides [`MockRelay`], a complete in-memory implementation of the four
//! relay effect traits with scriptable failures and call counters, plus
//! small content fixtures. Campaigns run against it exactly as they do
//! against a production relay, with every outcome reproducible.
//!
//! # Blocking Lock Usage
//!
//! Uses `std::sync::Mutex` because this is test infrastructure: tests run
//! in controlled contexts, contention is not a concern, and the synchronous
//! API keeps the mock readable.

#![forbid(unsafe_code)]
#![allow(clippy::unwrap_used)]

pub mod content;
pub mod mock_relay;

pub use content::patterned_bytes;
pub use mock_relay::{MockCounters, MockRelay};
