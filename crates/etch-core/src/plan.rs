//! Upload plans
//!
//! An [`UploadPlan`] is the unit the orchestrator drives to completion. The
//! dependency structure is explicit in the type: fragments carry no
//! interdependencies, while a chunked plan's directory record depends on
//! every fragment and must not land before them.

use crate::descriptor::{WriteDescriptor, WritePayload};
use serde::{Deserialize, Serialize};

/// One planned upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadPlan {
    /// A single self-contained write with no dependencies.
    Inline(WriteDescriptor),
    /// Chunked content: independent fragments plus the directory record
    /// that references all of them.
    Chunked {
        /// Fragment writes in reassembly order
        fragments: Vec<WriteDescriptor>,
        /// Directory write, submitted only after every fragment resolves
        directory: WriteDescriptor,
    },
}

impl UploadPlan {
    /// All descriptors in submission order: fragments first, directory last.
    pub fn descriptors(&self) -> Vec<&WriteDescriptor> {
        match self {
            UploadPlan::Inline(write) => vec![write],
            UploadPlan::Chunked {
                fragments,
                directory,
            } => {
                let mut all: Vec<&WriteDescriptor> = fragments.iter().collect();
                all.push(directory);
                all
            }
        }
    }

    /// Writes with no dependencies, in submission order.
    pub fn leading_writes(&self) -> &[WriteDescriptor] {
        match self {
            UploadPlan::Inline(write) => std::slice::from_ref(write),
            UploadPlan::Chunked { fragments, .. } => fragments,
        }
    }

    /// The directory write, when this plan is chunked.
    pub fn directory(&self) -> Option<&WriteDescriptor> {
        match self {
            UploadPlan::Inline(_) => None,
            UploadPlan::Chunked { directory, .. } => Some(directory),
        }
    }

    /// Total number of writes in the plan.
    pub fn write_count(&self) -> usize {
        match self {
            UploadPlan::Inline(_) => 1,
            UploadPlan::Chunked { fragments, .. } => fragments.len() + 1,
        }
    }

    /// Number of fragment writes.
    pub fn fragment_count(&self) -> usize {
        match self {
            UploadPlan::Inline(_) => 0,
            UploadPlan::Chunked { fragments, .. } => fragments.len(),
        }
    }

    /// Sum of payload bytes across the plan's writes.
    pub fn total_payload_bytes(&self) -> usize {
        self.descriptors()
            .iter()
            .map(|d| d.payload_len())
            .fold(0usize, usize::saturating_add)
    }

    /// Whether a chunked plan's directory lists exactly its fragments, in
    /// the same order.
    pub fn is_consistent(&self) -> bool {
        match self {
            UploadPlan::Inline(_) => true,
            UploadPlan::Chunked {
                fragments,
                directory,
            } => match &directory.payload {
                WritePayload::Directory {
                    directory: listing, ..
                } => {
                    listing.fragment_ids.len() == fragments.len()
                        && listing
                            .fragment_ids
                            .iter()
                            .zip(fragments)
                            .all(|(id, fragment)| *id == fragment.id)
                }
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ChunkDirectory;
    use crate::id::{RecordKey, WriteId};

    fn chunked_plan() -> UploadPlan {
        let fragments = vec![
            WriteDescriptor::fragment(vec![1, 1]),
            WriteDescriptor::fragment(vec![2, 2]),
        ];
        let ids = fragments.iter().map(|f| f.id).collect();
        let directory = WriteDescriptor::directory(
            RecordKey::new("content").expect("key"),
            "content",
            ChunkDirectory::new(ids),
        );
        UploadPlan::Chunked {
            fragments,
            directory,
        }
    }

    #[test]
    fn test_inline_plan_shape() {
        let write = WriteDescriptor::normal(
            RecordKey::new("k").expect("key"),
            "label",
            vec![1, 2, 3],
        );
        let plan = UploadPlan::Inline(write.clone());
        assert_eq!(plan.write_count(), 1);
        assert_eq!(plan.fragment_count(), 0);
        assert!(plan.directory().is_none());
        assert_eq!(plan.leading_writes(), std::slice::from_ref(&write));
        assert!(plan.is_consistent());
    }

    #[test]
    fn test_chunked_plan_orders_directory_last() {
        let plan = chunked_plan();
        let descriptors = plan.descriptors();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[2].id, plan.directory().expect("directory").id);
        assert_eq!(plan.leading_writes().len(), 2);
        assert!(plan.is_consistent());
    }

    #[test]
    fn test_tampered_directory_is_inconsistent() {
        let plan = chunked_plan();
        if let UploadPlan::Chunked {
            fragments,
            directory: _,
        } = plan
        {
            let wrong = WriteDescriptor::directory(
                RecordKey::new("content").expect("key"),
                "content",
                ChunkDirectory::new(vec![WriteId::new([0u8; 32])]),
            );
            let tampered = UploadPlan::Chunked {
                fragments,
                directory: wrong,
            };
            assert!(!tampered.is_consistent());
        }
    }
}
