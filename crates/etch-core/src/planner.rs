//! Content planning
//!
//! Turns one content blob into an [`UploadPlan`]. Small content becomes a
//! single inline record. Anything over the threshold is split into
//! fixed-size fragments plus a directory record listing the fragment ids in
//! reassembly order.

use crate::descriptor::{ChunkDirectory, WriteDescriptor};
use crate::errors::{EtchError, Result};
use crate::id::RecordKey;
use crate::plan::UploadPlan;
use serde::{Deserialize, Serialize};

/// Default largest content stored as a single inline record.
pub const DEFAULT_SMALL_THRESHOLD: usize = 20_000;

/// Default fragment payload size for chunked content.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Planner tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Largest content length stored inline, in bytes
    pub small_threshold: usize,
    /// Fragment payload size for chunked content, in bytes
    pub chunk_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            small_threshold: DEFAULT_SMALL_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PlannerConfig {
    /// Set the inline threshold.
    pub fn with_small_threshold(mut self, bytes: usize) -> Self {
        self.small_threshold = bytes;
        self
    }

    /// Set the fragment size.
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EtchError::invalid("chunk size must be positive"));
        }
        if self.small_threshold > self.chunk_size {
            return Err(EtchError::invalid(
                "inline threshold must not exceed the chunk size",
            ));
        }
        Ok(())
    }
}

/// Plan the upload of one content blob stored under `key`.
///
/// Empty content is a valid inline record. The returned plan's fragments
/// concatenate back to `content` exactly, and the directory lists their ids
/// in that order.
pub fn plan_upload(
    key: RecordKey,
    label: impl Into<String>,
    content: &[u8],
    config: &PlannerConfig,
) -> Result<UploadPlan> {
    config.validate()?;
    let label = label.into();

    if content.len() <= config.small_threshold {
        return Ok(UploadPlan::Inline(WriteDescriptor::normal(
            key,
            label,
            content.to_vec(),
        )));
    }

    let fragments: Vec<WriteDescriptor> = content
        .chunks(config.chunk_size)
        .map(|chunk| WriteDescriptor::fragment(chunk.to_vec()))
        .collect();
    let ids = fragments.iter().map(|fragment| fragment.id).collect();
    let directory = WriteDescriptor::directory(key, label, ChunkDirectory::new(ids));

    Ok(UploadPlan::Chunked {
        fragments,
        directory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::WritePayload;

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).expect("test key")
    }

    fn config(threshold: usize, chunk: usize) -> PlannerConfig {
        PlannerConfig::default()
            .with_small_threshold(threshold)
            .with_chunk_size(chunk)
    }

    #[test]
    fn test_small_content_stays_inline() {
        let content = vec![7u8; 100];
        let plan =
            plan_upload(key("doc"), "doc", &content, &config(100, 1000)).expect("plan");
        match plan {
            UploadPlan::Inline(write) => match write.payload {
                WritePayload::Normal { value, .. } => assert_eq!(value, content),
                other => panic!("expected normal payload, got {other:?}"),
            },
            other => panic!("expected inline plan, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let at_threshold = vec![0u8; 100];
        let over_threshold = vec![0u8; 101];
        let cfg = config(100, 1000);

        assert_eq!(
            plan_upload(key("a"), "a", &at_threshold, &cfg)
                .expect("plan")
                .fragment_count(),
            0
        );
        assert_eq!(
            plan_upload(key("b"), "b", &over_threshold, &cfg)
                .expect("plan")
                .fragment_count(),
            1
        );
    }

    #[test]
    fn test_empty_content_is_valid() {
        let plan = plan_upload(key("empty"), "empty", &[], &config(0, 10)).expect("plan");
        assert_eq!(plan.write_count(), 1);
        assert!(plan.directory().is_none());
    }

    #[test]
    fn test_chunking_splits_and_lists_in_order() {
        // 25 KB content with 10 KB fragments: two full, one short.
        let content: Vec<u8> = (0..25_000u32).map(|i| (i % 251) as u8).collect();
        let plan =
            plan_upload(key("big"), "big", &content, &config(10_000, 10_000)).expect("plan");

        let UploadPlan::Chunked {
            fragments,
            directory,
        } = plan
        else {
            panic!("expected chunked plan");
        };
        assert_eq!(fragments.len(), 3);

        let mut reassembled = Vec::new();
        for fragment in &fragments {
            match &fragment.payload {
                WritePayload::Fragment { data } => reassembled.extend_from_slice(data),
                other => panic!("expected fragment payload, got {other:?}"),
            }
        }
        assert_eq!(reassembled, content);

        let WritePayload::Directory {
            directory: listing, ..
        } = &directory.payload
        else {
            panic!("expected directory payload");
        };
        let fragment_ids: Vec<_> = fragments.iter().map(|f| f.id).collect();
        assert_eq!(listing.fragment_ids, fragment_ids);
    }

    #[test]
    fn test_exact_multiple_has_no_short_tail() {
        let content = vec![1u8; 30_000];
        let plan =
            plan_upload(key("even"), "even", &content, &config(10_000, 10_000)).expect("plan");
        assert_eq!(plan.fragment_count(), 3);
        for fragment in plan.leading_writes() {
            assert_eq!(fragment.payload_len(), 10_000);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(plan_upload(key("k"), "k", &[1], &config(10, 0)).is_err());
        assert!(plan_upload(key("k"), "k", &[1], &config(2_000, 1_000)).is_err());
    }
}
