//! Pure effect interfaces for the upload pipeline
//!
//! These traits define **what** the pipeline needs from a relay; handlers
//! define **how**. The production HTTP client and the in-memory test relay
//! both implement the same four surfaces:
//!
//! - [`ReadEffects`]: store reads backing the idempotency filter
//! - [`SubmitEffects`]: batch submission under a session
//! - [`ConfirmEffects`]: single-shot receipt lookup (polling lives in the
//!   confirmation engine, not the handler)
//! - [`SessionEffects`]: session, balance, and funding operations
//!
//! Everything the orchestrator does is parameterized by these traits, so
//! campaigns run identically against production relays and deterministic
//! mocks.

pub mod confirmer;
pub mod reader;
pub mod session;
pub mod submitter;

pub use confirmer::{ConfirmEffects, Receipt, ReceiptStatus};
pub use reader::{ReadEffects, StoredRecord};
pub use session::{unix_now_secs, BalanceStatus, RelaySession, SessionEffects};
pub use submitter::{SubmitAck, SubmitEffects};

/// The full relay surface the orchestrator drives.
///
/// Blanket-implemented for anything providing all four effect traits.
pub trait RelayEffects: ReadEffects + SubmitEffects + ConfirmEffects + SessionEffects {}

impl<T> RelayEffects for T
where
    T: ReadEffects + SubmitEffects + ConfirmEffects + SessionEffects + ?Sized,
{
}
