//! Write descriptors
//!
//! A [`WriteDescriptor`] is one store mutation ready for submission: a keyed
//! record, an anonymous content fragment, or the fragment directory that
//! stitches a chunked upload back together. Descriptors carry their identity
//! and enough size information for the batcher to budget them.

use crate::errors::EtchError;
use crate::id::{RecordKey, WriteId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed per-write envelope overhead assumed by the size estimate.
///
/// Covers the key, label, owner, and framing that accompany the payload on
/// the wire. Deliberately generous so estimates err toward smaller batches.
pub const WRITE_ENVELOPE_OVERHEAD: usize = 256;

/// Upper bound on a single write's size estimate.
///
/// Keeps batch arithmetic well away from overflow even for absurd payloads.
pub const SIZE_ESTIMATE_CAP: usize = 16 * 1024 * 1024;

/// Current fragment directory format version.
pub const DIRECTORY_VERSION: u16 = 1;

// =============================================================================
// Descriptors
// =============================================================================

/// The role a write plays in its upload plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteKind {
    /// A self-contained keyed record
    Normal,
    /// One fragment of chunked content
    Fragment,
    /// The keyed directory record listing a chunked upload's fragments
    Directory,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteKind::Normal => "normal",
            WriteKind::Fragment => "fragment",
            WriteKind::Directory => "directory",
        };
        f.write_str(name)
    }
}

/// Payload of a single write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePayload {
    /// A self-contained record stored under `key`.
    Normal {
        /// Key the record is stored under
        key: RecordKey,
        /// Human-readable label stored alongside the value
        label: String,
        /// Record value bytes
        value: Vec<u8>,
    },
    /// One fragment of chunked content, addressed purely by its bytes.
    Fragment {
        /// Fragment payload bytes
        data: Vec<u8>,
    },
    /// The directory record of a chunked upload, stored under `key`.
    Directory {
        /// Key the directory record is stored under
        key: RecordKey,
        /// Human-readable label stored alongside the directory
        label: String,
        /// Ordered fragment listing
        directory: ChunkDirectory,
    },
}

/// One store mutation, identified for idempotency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteDescriptor {
    /// Identity of this write
    pub id: WriteId,
    /// What the write stores
    pub payload: WritePayload,
}

impl WriteDescriptor {
    /// Build a self-contained record write. The id derives from the key.
    pub fn normal(key: RecordKey, label: impl Into<String>, value: Vec<u8>) -> Self {
        let id = WriteId::for_record(&key);
        Self {
            id,
            payload: WritePayload::Normal {
                key,
                label: label.into(),
                value,
            },
        }
    }

    /// Build a fragment write. The id derives from the payload bytes.
    pub fn fragment(data: Vec<u8>) -> Self {
        let id = WriteId::for_fragment(&data);
        Self {
            id,
            payload: WritePayload::Fragment { data },
        }
    }

    /// Build a directory write. The id derives from the key.
    pub fn directory(key: RecordKey, label: impl Into<String>, directory: ChunkDirectory) -> Self {
        let id = WriteId::for_record(&key);
        Self {
            id,
            payload: WritePayload::Directory {
                key,
                label: label.into(),
                directory,
            },
        }
    }

    /// The role this write plays.
    pub fn kind(&self) -> WriteKind {
        match &self.payload {
            WritePayload::Normal { .. } => WriteKind::Normal,
            WritePayload::Fragment { .. } => WriteKind::Fragment,
            WritePayload::Directory { .. } => WriteKind::Directory,
        }
    }

    /// The key this write stores under, if it is a keyed record.
    pub fn record_key(&self) -> Option<&RecordKey> {
        match &self.payload {
            WritePayload::Normal { key, .. } | WritePayload::Directory { key, .. } => Some(key),
            WritePayload::Fragment { .. } => None,
        }
    }

    /// Payload length in bytes before wire encoding.
    pub fn payload_len(&self) -> usize {
        match &self.payload {
            WritePayload::Normal { value, .. } => value.len(),
            WritePayload::Fragment { data } => data.len(),
            WritePayload::Directory { directory, .. } => directory.encoded_len(),
        }
    }

    /// Estimated on-wire size of this write.
    ///
    /// Payloads travel hex encoded, so the estimate doubles the payload and
    /// adds the fixed envelope overhead, saturating at [`SIZE_ESTIMATE_CAP`].
    pub fn estimated_wire_size(&self) -> usize {
        self.payload_len()
            .saturating_mul(2)
            .saturating_add(WRITE_ENVELOPE_OVERHEAD)
            .min(SIZE_ESTIMATE_CAP)
    }
}

// =============================================================================
// Fragment directory
// =============================================================================

/// Ordered fragment listing stored as the value of a directory record.
///
/// The listing order is the reassembly order. Concatenating the fragments in
/// listed order reproduces the original content exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDirectory {
    /// Fragment write ids in reassembly order
    pub fragment_ids: Vec<WriteId>,
    /// Directory format version
    pub version: u16,
}

impl ChunkDirectory {
    /// Create a directory at the current format version.
    pub fn new(fragment_ids: Vec<WriteId>) -> Self {
        Self {
            fragment_ids,
            version: DIRECTORY_VERSION,
        }
    }

    /// Number of listed fragments.
    pub fn len(&self) -> usize {
        self.fragment_ids.len()
    }

    /// Whether the directory lists no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragment_ids.is_empty()
    }

    /// Encode as the compact record value: `v{version}:{hex},{hex},...`
    pub fn encode(&self) -> String {
        let ids: Vec<String> = self.fragment_ids.iter().map(WriteId::to_hex).collect();
        format!("v{}:{}", self.version, ids.join(","))
    }

    /// Length of [`ChunkDirectory::encode`] without building the string.
    pub fn encoded_len(&self) -> usize {
        let count = self.fragment_ids.len();
        // 'v' + version digits + ':' + 64 hex chars per id + separating commas
        1 + decimal_digits(self.version) + 1 + count * 64 + count.saturating_sub(1)
    }

    /// Decode an encoded directory, validating version and id syntax.
    pub fn decode(s: &str) -> Result<Self, EtchError> {
        let rest = s
            .strip_prefix('v')
            .ok_or_else(|| EtchError::invalid("directory must start with 'v'"))?;
        let (version_str, ids_str) = rest
            .split_once(':')
            .ok_or_else(|| EtchError::invalid("directory missing ':' separator"))?;
        let version: u16 = version_str
            .parse()
            .map_err(|_| EtchError::invalid(format!("invalid directory version: {version_str}")))?;
        if version != DIRECTORY_VERSION {
            return Err(EtchError::invalid(format!(
                "unsupported directory version: {version}"
            )));
        }
        if ids_str.is_empty() {
            return Err(EtchError::invalid("directory lists no fragments"));
        }
        let fragment_ids = ids_str
            .split(',')
            .map(WriteId::from_hex)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            fragment_ids,
            version,
        })
    }
}

fn decimal_digits(mut value: u16) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RecordKey;

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).expect("test key")
    }

    #[test]
    fn test_descriptor_kinds() {
        let normal = WriteDescriptor::normal(key("a"), "label", vec![1, 2, 3]);
        let fragment = WriteDescriptor::fragment(vec![4, 5]);
        let directory =
            WriteDescriptor::directory(key("b"), "label", ChunkDirectory::new(vec![fragment.id]));

        assert_eq!(normal.kind(), WriteKind::Normal);
        assert_eq!(fragment.kind(), WriteKind::Fragment);
        assert_eq!(directory.kind(), WriteKind::Directory);

        assert!(normal.record_key().is_some());
        assert!(fragment.record_key().is_none());
        assert!(directory.record_key().is_some());
    }

    #[test]
    fn test_fragment_identity_tracks_bytes() {
        let a = WriteDescriptor::fragment(vec![1, 2, 3]);
        let b = WriteDescriptor::fragment(vec![1, 2, 3]);
        let c = WriteDescriptor::fragment(vec![9]);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_estimated_wire_size() {
        let descriptor = WriteDescriptor::fragment(vec![0u8; 1000]);
        assert_eq!(
            descriptor.estimated_wire_size(),
            2000 + WRITE_ENVELOPE_OVERHEAD
        );

        let empty = WriteDescriptor::normal(key("k"), "l", Vec::new());
        assert_eq!(empty.estimated_wire_size(), WRITE_ENVELOPE_OVERHEAD);
    }

    #[test]
    fn test_estimate_is_capped() {
        // Craft a descriptor whose raw estimate would exceed the cap.
        let descriptor = WriteDescriptor::fragment(vec![0u8; SIZE_ESTIMATE_CAP / 2 + 1]);
        assert_eq!(descriptor.estimated_wire_size(), SIZE_ESTIMATE_CAP);
    }

    #[test]
    fn test_directory_roundtrip() {
        let ids = vec![
            WriteId::new([1u8; 32]),
            WriteId::new([2u8; 32]),
            WriteId::new([3u8; 32]),
        ];
        let directory = ChunkDirectory::new(ids.clone());
        let encoded = directory.encode();
        assert!(encoded.starts_with("v1:"));

        let decoded = ChunkDirectory::decode(&encoded).expect("decode");
        assert_eq!(decoded.fragment_ids, ids);
        assert_eq!(decoded.version, DIRECTORY_VERSION);
    }

    #[test]
    fn test_directory_encoded_len_matches() {
        for count in [1usize, 2, 7] {
            let ids = (0..count).map(|i| WriteId::new([i as u8; 32])).collect();
            let directory = ChunkDirectory::new(ids);
            assert_eq!(directory.encoded_len(), directory.encode().len());
        }
    }

    #[test]
    fn test_directory_decode_rejects_garbage() {
        assert!(ChunkDirectory::decode("").is_err());
        assert!(ChunkDirectory::decode("1:aa").is_err());
        assert!(ChunkDirectory::decode("v1").is_err());
        assert!(ChunkDirectory::decode("v1:").is_err());
        assert!(ChunkDirectory::decode("v9:aa").is_err());
        assert!(ChunkDirectory::decode("vx:aa").is_err());
        assert!(ChunkDirectory::decode("v1:nothex").is_err());
    }

    #[test]
    fn test_directory_preserves_order() {
        let ids = vec![WriteId::new([9u8; 32]), WriteId::new([1u8; 32])];
        let directory = ChunkDirectory::new(ids.clone());
        let decoded = ChunkDirectory::decode(&directory.encode()).expect("decode");
        // Listing order is reassembly order, never sorted.
        assert_eq!(decoded.fragment_ids, ids);
    }
}
