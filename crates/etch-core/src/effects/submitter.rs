//! Batch submission effects

use crate::batch::Batch;
use crate::effects::session::RelaySession;
use crate::errors::Result;
use crate::id::{TxRef, WriteId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-write acknowledgement from a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitAck {
    /// The relay accepted the write into a transaction.
    Accepted {
        /// The acknowledged write
        id: WriteId,
        /// Transaction carrying the write
        tx: TxRef,
    },
    /// The relay rejected just this write; the rest of the batch stands.
    Rejected {
        /// The rejected write
        id: WriteId,
        /// Relay's rejection reason
        reason: String,
    },
}

impl SubmitAck {
    /// The write this acknowledgement covers.
    pub fn id(&self) -> WriteId {
        match self {
            SubmitAck::Accepted { id, .. } | SubmitAck::Rejected { id, .. } => *id,
        }
    }

    /// Whether the write was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitAck::Accepted { .. })
    }
}

/// Batch submission against the relay.
#[async_trait]
pub trait SubmitEffects: Send + Sync {
    /// Submit one batch under an open session.
    ///
    /// An `Err` means the batch as a whole failed to go out and nothing in
    /// it can be assumed sent. On `Ok`, every write in the batch is covered
    /// by exactly one acknowledgement.
    async fn submit_batch(&self, session: &RelaySession, batch: &Batch) -> Result<Vec<SubmitAck>>;
}

#[async_trait]
impl<T: SubmitEffects + ?Sized> SubmitEffects for Arc<T> {
    async fn submit_batch(&self, session: &RelaySession, batch: &Batch) -> Result<Vec<SubmitAck>> {
        (**self).submit_batch(session, batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_accessors() {
        let id = WriteId::new([3u8; 32]);
        let accepted = SubmitAck::Accepted {
            id,
            tx: TxRef::new("tx-1"),
        };
        let rejected = SubmitAck::Rejected {
            id,
            reason: "gas".to_string(),
        };

        assert_eq!(accepted.id(), id);
        assert_eq!(rejected.id(), id);
        assert!(accepted.is_accepted());
        assert!(!rejected.is_accepted());
    }
}
