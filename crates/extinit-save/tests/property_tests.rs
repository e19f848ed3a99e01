//! Property-based tests for `extinit-save`.
//!
//! Covers the threshold partition, alignment of external offsets, offset
//! monotonicity, and byte-exact round trips through real save operations.

use extinit_graph::{
    ElementType, GraphDefinition, Model, ModelDefinition, TensorDefinition, TensorRecord,
};
use extinit_save::{
    ExternalDataWriter, OffsetAlignmentInfo, Placement, SaveOptions, classify, next_offset,
    round_up, save_with_external_initializers,
};
use proptest::prelude::*;
use tempfile::TempDir;

// ── Strategies ──────────────────────────────────────────────────────────────

fn arb_lengths() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..600, 0..12)
}

fn arb_policy() -> impl Strategy<Value = OffsetAlignmentInfo> {
    (any::<bool>(), 0u64..400, 1u64..300).prop_map(
        |(align_offset, align_threshold, allocation_granularity)| OffsetAlignmentInfo {
            align_offset,
            align_threshold,
            allocation_granularity,
        },
    )
}

fn records(lengths: &[usize]) -> Vec<TensorRecord> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            let bytes = (0..len).map(|j| (i * 7 + j) as u8).collect();
            TensorRecord::new(format!("t{i}"), ElementType::Uint8, vec![len as i64], bytes).unwrap()
        })
        .collect()
}

fn model(lengths: &[usize]) -> Model {
    let definition = ModelDefinition {
        graph: GraphDefinition {
            initializers: records(lengths).into_iter().map(TensorDefinition::inline).collect(),
            ..Default::default()
        },
        ..Default::default()
    };
    Model::from_definition(definition, ".").unwrap()
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    /// `round_up` yields the smallest multiple of `g` that is at least `x`.
    #[test]
    fn round_up_is_least_multiple(x in 0u64..1_000_000, g in 1u64..10_000) {
        let r = round_up(x, g).unwrap();
        prop_assert_eq!(r % g, 0);
        prop_assert!(r >= x);
        prop_assert!(r - x < g);
    }

    /// Placement follows `len < threshold` exactly.
    #[test]
    fn threshold_partition(len in any::<u64>(), threshold in any::<u64>()) {
        let expected = if len < threshold { Placement::Inline } else { Placement::External };
        prop_assert_eq!(classify(len, threshold), expected);
    }

    /// The gap produced by `next_offset` never exceeds one granularity.
    #[test]
    fn next_offset_padding_is_bounded(
        current in 0u64..1_000_000,
        len in 0u64..10_000,
        policy in arb_policy(),
    ) {
        let (offset, end) = next_offset(current, len, &policy).unwrap();
        prop_assert!(offset >= current);
        prop_assert!(offset - current < policy.allocation_granularity);
        prop_assert_eq!(end, offset + len);
        if policy.applies_to(len) {
            prop_assert_eq!(offset % policy.allocation_granularity, 0);
        } else {
            prop_assert_eq!(offset, current);
        }
    }

    /// References from one writer are ordered, disjoint, and aligned where
    /// required; the sink holds each tensor at its recorded range.
    #[test]
    fn writer_references_are_disjoint(lengths in arb_lengths(), policy in arb_policy()) {
        let records = records(&lengths);
        let mut writer = ExternalDataWriter::new(Vec::new(), "mem", "w.bin");
        let refs: Vec<_> = records.iter().map(|r| writer.write(r, &policy).unwrap()).collect();
        let padding = writer.padding_written();
        let bytes = writer.into_inner().unwrap();

        let mut previous_end = 0;
        for (record, reference) in records.iter().zip(&refs) {
            prop_assert!(reference.offset >= previous_end);
            if policy.applies_to(reference.length) {
                prop_assert_eq!(reference.offset % policy.allocation_granularity, 0);
            }
            let range = reference.offset as usize..(reference.offset + reference.length) as usize;
            prop_assert_eq!(&bytes[range], record.bytes());
            previous_end = reference.offset + reference.length;
        }
        let payload: usize = lengths.iter().sum();
        prop_assert_eq!(bytes.len() as u64, payload as u64 + padding);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A full save keeps counts, honors the threshold, and restores bytes.
    #[test]
    fn save_round_trips(lengths in arb_lengths(), threshold in 0u64..700, policy in arb_policy()) {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("model.json");
        let source = model(&lengths);
        let options = SaveOptions {
            size_threshold: threshold,
            alignment: policy,
            save_prepacked_as_constants: false,
        };
        let summary =
            save_with_external_initializers(&source, &out, "model.bin", &options, None).unwrap();
        prop_assert_eq!(summary.initializers_out, lengths.len());

        let saved = Model::load(&out).unwrap();
        prop_assert_eq!(saved.initializers().len(), lengths.len());
        for (def, &len) in saved.initializers().iter().zip(&lengths) {
            prop_assert_eq!(def.is_external(), len as u64 >= threshold, "{}", def.name);
        }
        prop_assert_eq!(saved.initializer_records().unwrap(), source.initializer_records().unwrap());
    }
}
