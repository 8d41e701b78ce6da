//! Order-preserving batch packing
//!
//! Writes are grouped into batches bounded by a write count and an
//! estimated byte budget. Packing is a single greedy pass that never
//! reorders: a batch is sealed the moment the next write would not fit.

use crate::descriptor::WriteDescriptor;
use crate::errors::{EtchError, Result};
use crate::id::WriteId;
use serde::{Deserialize, Serialize};

/// Default maximum number of writes per batch.
pub const DEFAULT_MAX_WRITES: usize = 100;

/// Default estimated byte budget per batch.
pub const DEFAULT_MAX_BYTES: usize = 900_000;

/// Batch budget limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Maximum writes per batch
    pub max_writes: usize,
    /// Maximum estimated bytes per batch
    pub max_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_writes: DEFAULT_MAX_WRITES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl BatchLimits {
    /// Set the write count budget.
    pub fn with_max_writes(mut self, count: usize) -> Self {
        self.max_writes = count;
        self
    }

    /// Set the estimated byte budget.
    pub fn with_max_bytes(mut self, bytes: usize) -> Self {
        self.max_bytes = bytes;
        self
    }

    /// Validate the limits.
    pub fn validate(&self) -> Result<()> {
        if self.max_writes == 0 {
            return Err(EtchError::invalid("batch write budget must be positive"));
        }
        if self.max_bytes == 0 {
            return Err(EtchError::invalid("batch byte budget must be positive"));
        }
        Ok(())
    }
}

/// A group of writes submitted in one transaction batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Writes in submission order
    pub descriptors: Vec<WriteDescriptor>,
}

impl Batch {
    /// Number of writes in the batch.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the batch holds no writes.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Sum of the writes' estimated wire sizes.
    pub fn estimated_bytes(&self) -> usize {
        self.descriptors
            .iter()
            .map(WriteDescriptor::estimated_wire_size)
            .fold(0usize, usize::saturating_add)
    }

    /// Ids of the writes, in order.
    pub fn ids(&self) -> Vec<WriteId> {
        self.descriptors.iter().map(|d| d.id).collect()
    }
}

/// Pack `descriptors` into batches under `limits`, preserving order.
///
/// A write whose estimate alone exceeds the byte budget still gets its own
/// singleton batch. Whether to submit such a batch is the caller's call;
/// packing never drops a write.
pub fn pack_batches(descriptors: Vec<WriteDescriptor>, limits: &BatchLimits) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<WriteDescriptor> = Vec::new();
    let mut current_bytes = 0usize;

    for descriptor in descriptors {
        let estimate = descriptor.estimated_wire_size();
        let fits_count = current.len() < limits.max_writes;
        let fits_bytes = current_bytes.saturating_add(estimate) <= limits.max_bytes;

        if !current.is_empty() && (!fits_count || !fits_bytes) {
            batches.push(Batch {
                descriptors: std::mem::take(&mut current),
            });
            current_bytes = 0;
        }

        current_bytes = current_bytes.saturating_add(estimate);
        current.push(descriptor);
    }

    if !current.is_empty() {
        batches.push(Batch {
            descriptors: current,
        });
    }

    batches
}
