//! Cooperative cancellation
//!
//! A [`CancelToken`] lets long-running pipeline work shut down cleanly:
//! submission loops check it between batches and confirmation polls check it
//! between receipt fetches. Cancellation stops new work; it never unwinds
//! writes that were already sent.

use crate::errors::{EtchError, Result};
use std::time::Duration;
use tokio::sync::watch;

/// Cancellation signal held by pipeline consumers.
///
/// Tokens are cheap to clone; all clones observe the same canceller.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: TokenInner,
}

#[derive(Debug, Clone)]
enum TokenInner {
    /// Never fires.
    Never,
    /// Fires when the paired [`Canceller`] signals or is dropped.
    Channel(watch::Receiver<bool>),
}

/// The signalling side of a token pair.
///
/// Dropping the canceller cancels its tokens, so the canceller must stay
/// alive for as long as the work should keep running.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    /// Create a connected canceller/token pair.
    pub fn new() -> (Canceller, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (
            Canceller { tx },
            CancelToken {
                inner: TokenInner::Channel(rx),
            },
        )
    }

    /// A token that never fires, for callers without a shutdown path.
    pub fn never() -> Self {
        Self {
            inner: TokenInner::Never,
        }
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        match &self.inner {
            TokenInner::Never => futures::future::pending::<()>().await,
            TokenInner::Channel(rx) => {
                let mut rx = rx.clone();
                loop {
                    if *rx.borrow() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Canceller dropped: treat as cancelled.
                        return;
                    }
                }
            }
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            TokenInner::Never => false,
            TokenInner::Channel(rx) => *rx.borrow() || rx.has_changed().is_err(),
        }
    }
}

impl Canceller {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Sleep for `duration` unless cancelled first.
pub async fn sleep_unless_cancelled(duration: Duration, cancel: &CancelToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(EtchError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
