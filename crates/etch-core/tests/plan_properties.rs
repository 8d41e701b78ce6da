//! Planning, packing, and codec invariants
//!
//! Exercises the pure pipeline stages end to end: content survives
//! chunking, packing never reorders or drops writes, and the directory
//! codec round-trips.

use etch_core::batch::{pack_batches, Batch, BatchLimits};
use etch_core::descriptor::{ChunkDirectory, WriteDescriptor, WritePayload};
use etch_core::id::{RecordKey, WriteId};
use etch_core::plan::UploadPlan;
use etch_core::planner::{plan_upload, PlannerConfig};
use proptest::prelude::*;

fn key(name: &str) -> RecordKey {
    RecordKey::new(name).expect("test key")
}

fn payload_bytes(descriptor: &WriteDescriptor) -> &[u8] {
    match &descriptor.payload {
        WritePayload::Normal { value, .. } => value,
        WritePayload::Fragment { data } => data,
        WritePayload::Directory { .. } => &[],
    }
}

fn reassemble(plan: &UploadPlan) -> Vec<u8> {
    let mut content = Vec::new();
    for write in plan.leading_writes() {
        content.extend_from_slice(payload_bytes(write));
    }
    content
}

#[test]
fn test_plan_survives_serde() {
    let content = vec![9u8; 300];
    let config = PlannerConfig::default()
        .with_small_threshold(100)
        .with_chunk_size(128);
    let plan = plan_upload(key("doc"), "doc", &content, &config).expect("plan");

    let json = serde_json::to_string(&plan).expect("serialize");
    let restored: UploadPlan = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored, plan);
}

#[test]
fn test_plan_ids_are_stable_across_runs() {
    let content: Vec<u8> = (0..5_000u32).map(|i| (i % 256) as u8).collect();
    let config = PlannerConfig::default()
        .with_small_threshold(1_000)
        .with_chunk_size(1_000);

    let first = plan_upload(key("doc"), "doc", &content, &config).expect("plan");
    let second = plan_upload(key("doc"), "doc", &content, &config).expect("plan");

    let first_ids: Vec<WriteId> = first.descriptors().iter().map(|d| d.id).collect();
    let second_ids: Vec<WriteId> = second.descriptors().iter().map(|d| d.id).collect();
    assert_eq!(first_ids, second_ids);
}

mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn test_chunked_content_reassembles(
            content in proptest::collection::vec(any::<u8>(), 1..4096),
            chunk_size in 1usize..512,
        ) {
            let config = PlannerConfig::default()
                .with_small_threshold(0)
                .with_chunk_size(chunk_size);
            let plan = plan_upload(key("blob"), "blob", &content, &config)
                .expect("plan");

            prop_assert!(plan.is_consistent());
            prop_assert_eq!(
                plan.fragment_count(),
                content.len().div_ceil(chunk_size)
            );
            prop_assert_eq!(reassemble(&plan), content);
        }

        #[test]
        fn test_packing_preserves_sequence(
            sizes in proptest::collection::vec(0usize..2_000, 0..80),
            max_writes in 1usize..20,
            max_bytes in 600usize..10_000,
        ) {
            let descriptors: Vec<WriteDescriptor> = sizes
                .iter()
                .enumerate()
                .map(|(i, len)| {
                    let mut data = vec![(i % 256) as u8; *len];
                    data.push(i as u8);
                    WriteDescriptor::fragment(data)
                })
                .collect();
            let input_ids: Vec<WriteId> = descriptors.iter().map(|d| d.id).collect();

            let limits = BatchLimits::default()
                .with_max_writes(max_writes)
                .with_max_bytes(max_bytes);
            let batches = pack_batches(descriptors, &limits);

            let packed_ids: Vec<WriteId> =
                batches.iter().flat_map(Batch::ids).collect();
            prop_assert_eq!(packed_ids, input_ids);

            for batch in &batches {
                prop_assert!(batch.len() <= max_writes);
                if batch.len() > 1 {
                    prop_assert!(batch.estimated_bytes() <= max_bytes);
                }
            }
        }

        #[test]
        fn test_directory_codec_roundtrip(
            raw_ids in proptest::collection::vec(any::<[u8; 32]>(), 1..40),
        ) {
            let ids: Vec<WriteId> = raw_ids.into_iter().map(WriteId::new).collect();
            let directory = ChunkDirectory::new(ids.clone());
            let decoded = ChunkDirectory::decode(&directory.encode())
                .expect("decode own encoding");
            prop_assert_eq!(decoded.fragment_ids, ids);
        }

        #[test]
        fn test_write_id_hex_roundtrip(raw in any::<[u8; 32]>()) {
            let id = WriteId::new(raw);
            prop_assert_eq!(WriteId::from_hex(&id.to_hex()).expect("hex"), id);
            let parsed: WriteId = id.to_string().parse().expect("display");
            prop_assert_eq!(parsed, id);
        }
    }
}
