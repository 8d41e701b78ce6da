//! Store read effects
//!
//! Reads back what is already on chain so the filter can skip writes that
//! landed in an earlier run.

use crate::errors::Result;
use crate::id::{OwnerAddress, RecordKey, WriteId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A record as currently stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Stored label
    pub label: String,
    /// Stored value bytes
    pub value: Vec<u8>,
}

impl StoredRecord {
    /// Create a stored record view.
    pub fn new(label: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Read operations against the store.
///
/// `Ok(None)` and `Ok(false)` are definitive absences. A transport failure
/// is an `Err`; callers fail closed on it rather than assuming presence.
#[async_trait]
pub trait ReadEffects: Send + Sync {
    /// Read the record stored under `key`, if any.
    async fn read_record(
        &self,
        owner: &OwnerAddress,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>>;

    /// Whether the fragment identified by `id` is already stored.
    async fn fragment_exists(&self, owner: &OwnerAddress, id: &WriteId) -> Result<bool>;
}

#[async_trait]
impl<T: ReadEffects + ?Sized> ReadEffects for Arc<T> {
    async fn read_record(
        &self,
        owner: &OwnerAddress,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>> {
        (**self).read_record(owner, key).await
    }

    async fn fragment_exists(&self, owner: &OwnerAddress, id: &WriteId) -> Result<bool> {
        (**self).fragment_exists(owner, id).await
    }
}
