//! Existence filter
//!
//! Partitions writes into those that still need submitting and those the
//! store already holds. This check is what makes re-running a campaign
//! safe: anything that landed in an earlier run, or landed despite a lost
//! acknowledgement, resolves to skipped instead of a duplicate write.
//!
//! The filter fails closed. A definitive not-found means the write goes
//! out; any other read failure aborts the pass, because assuming absence
//! on an ambiguous error could double-write.

use etch_core::{
    OwnerAddress, ReadEffects, Result, WriteDescriptor, WriteId, WritePayload,
};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of one filter pass.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Writes the store does not hold yet, in input order
    pub to_send: Vec<WriteDescriptor>,
    /// Writes already durably present, in input order
    pub skipped: Vec<WriteId>,
}

impl FilterOutcome {
    /// Whether nothing needs submitting.
    pub fn is_all_skipped(&self) -> bool {
        self.to_send.is_empty()
    }
}

/// Partition `descriptors` by current store state.
///
/// Keyed records are skipped only when the stored label and value both
/// match the descriptor exactly; fragments are content-addressed, so bare
/// presence suffices. Duplicate ids within one pass (identical fragments)
/// collapse to their first occurrence. Relative order is preserved on both
/// sides of the partition. The first read failure aborts the whole pass.
pub async fn filter_descriptors<R: ReadEffects + ?Sized>(
    reader: &R,
    owner: &OwnerAddress,
    descriptors: &[WriteDescriptor],
) -> Result<FilterOutcome> {
    let mut seen = HashSet::new();
    let mut outcome = FilterOutcome::default();

    for descriptor in descriptors {
        if !seen.insert(descriptor.id) {
            debug!(id = %descriptor.id, "duplicate write in pass, keeping first occurrence");
            continue;
        }

        if is_stored(reader, owner, descriptor).await? {
            debug!(
                id = %descriptor.id,
                kind = %descriptor.kind(),
                "write already stored, skipping"
            );
            outcome.skipped.push(descriptor.id);
        } else {
            outcome.to_send.push(descriptor.clone());
        }
    }

    Ok(outcome)
}

async fn is_stored<R: ReadEffects + ?Sized>(
    reader: &R,
    owner: &OwnerAddress,
    descriptor: &WriteDescriptor,
) -> Result<bool> {
    match &descriptor.payload {
        WritePayload::Fragment { .. } => reader.fragment_exists(owner, &descriptor.id).await,
        WritePayload::Normal { key, label, value } => {
            Ok(match reader.read_record(owner, key).await? {
                Some(stored) => stored.label == *label && stored.value == *value,
                None => false,
            })
        }
        WritePayload::Directory {
            key,
            label,
            directory,
        } => Ok(match reader.read_record(owner, key).await? {
            Some(stored) => {
                stored.label == *label && stored.value == directory.encode().into_bytes()
            }
            None => false,
        }),
    }
}
