//! Campaign outcome reporting

use crate::id::{TxRef, WriteId};
use serde::{Deserialize, Serialize};

/// A write that went out, with the transaction that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentWrite {
    /// The write
    pub id: WriteId,
    /// Transaction that carried it
    pub tx: TxRef,
}

/// A write that exhausted its chances within the campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// The failed write
    pub id: WriteId,
    /// Why it failed
    pub reason: String,
    /// Whether a fresh campaign could succeed by retrying it
    pub retryable: bool,
}

/// Structured outcome of one campaign.
///
/// Every planned write id lands in exactly one of `sent`, `skipped`, or
/// `failed`. A re-run of the same plans moves earlier `sent` entries into
/// `skipped`, which is what makes campaigns resumable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Writes submitted and confirmed this run
    pub sent: Vec<SentWrite>,
    /// Writes already present, skipped without submission
    pub skipped: Vec<WriteId>,
    /// Writes that terminally failed this run
    pub failed: Vec<FailureEntry>,
    /// The most recently confirmed transaction, if any write went out
    pub last_tx: Option<TxRef>,
}

impl CampaignReport {
    /// Whether every write landed or was already present.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total writes accounted for.
    pub fn write_count(&self) -> usize {
        self.sent.len() + self.skipped.len() + self.failed.len()
    }

    /// Fold another report into this one, keeping the later `last_tx`.
    pub fn merge(&mut self, other: CampaignReport) {
        self.sent.extend(other.sent);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        if other.last_tx.is_some() {
            self.last_tx = other.last_tx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_tracks_failures() {
        let mut report = CampaignReport::default();
        assert!(report.success());
        report.failed.push(FailureEntry {
            id: WriteId::new([1u8; 32]),
            reason: "rejected".to_string(),
            retryable: true,
        });
        assert!(!report.success());
    }

    #[test]
    fn test_merge_accumulates_and_keeps_latest_tx() {
        let mut first = CampaignReport {
            sent: vec![SentWrite {
                id: WriteId::new([1u8; 32]),
                tx: TxRef::new("tx-1"),
            }],
            skipped: vec![WriteId::new([2u8; 32])],
            failed: Vec::new(),
            last_tx: Some(TxRef::new("tx-1")),
        };
        let second = CampaignReport {
            sent: vec![SentWrite {
                id: WriteId::new([3u8; 32]),
                tx: TxRef::new("tx-2"),
            }],
            skipped: Vec::new(),
            failed: Vec::new(),
            last_tx: Some(TxRef::new("tx-2")),
        };

        first.merge(second);
        assert_eq!(first.sent.len(), 2);
        assert_eq!(first.write_count(), 3);
        assert_eq!(first.last_tx, Some(TxRef::new("tx-2")));

        // A report with no sends leaves the latest tx untouched.
        first.merge(CampaignReport::default());
        assert_eq!(first.last_tx, Some(TxRef::new("tx-2")));
    }
}
