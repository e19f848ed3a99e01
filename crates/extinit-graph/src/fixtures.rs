//! Small in-memory models for tests.
//!
//! Enabled with the `fixtures` feature. Tensor payloads are deterministic byte
//! patterns so round-trip comparisons catch misplaced ranges, not just wrong
//! lengths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::definition::{
    ExternalReference, GraphDefinition, ModelDefinition, NodeDefinition, TensorDefinition,
};
use crate::element::ElementType;
use crate::tensor::{TensorRecord, element_count};

/// Deterministic byte pattern; `seed` keeps neighbouring tensors distinct.
pub fn pattern_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Record of `shape` filled with [`pattern_bytes`].
pub fn patterned(name: &str, element_type: ElementType, shape: &[i64], seed: u8) -> TensorRecord {
    let count = element_count(shape).expect("fixture shapes are valid") as usize;
    let bytes = pattern_bytes(count * element_type.element_size(), seed);
    TensorRecord::new(name, element_type, shape.to_vec(), bytes).expect("fixture bytes match shape")
}

fn node(name: &str, op_type: &str, inputs: &[&str], outputs: &[&str]) -> NodeDefinition {
    NodeDefinition {
        name: name.into(),
        op_type: op_type.into(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// A small convolutional classifier with every initializer inline.
///
/// Sizes straddle a 100-byte threshold on purpose: `edge.at_threshold` is
/// exactly 100 bytes, `edge.below_threshold` is 99, and `empty` has no bytes.
pub fn mnist_like() -> ModelDefinition {
    let tensors = [
        patterned("conv1.weight", ElementType::Float, &[8, 1, 5, 5], 1),
        patterned("conv1.bias", ElementType::Float, &[8], 2),
        patterned("reshape.shape", ElementType::Int64, &[2], 3),
        patterned("fc.weight", ElementType::Float, &[10, 256], 4),
        patterned("fc.bias", ElementType::Float, &[10], 5),
        patterned("scale", ElementType::Float, &[], 6),
        patterned("edge.at_threshold", ElementType::Uint8, &[100], 7),
        patterned("edge.below_threshold", ElementType::Uint8, &[99], 8),
        patterned("empty", ElementType::Float, &[0], 9),
    ];

    ModelDefinition {
        producer_name: "extinit-fixtures".into(),
        graph: GraphDefinition {
            name: "mnist_like".into(),
            nodes: vec![
                node("conv1", "Conv", &["input", "conv1.weight", "conv1.bias"], &["c1"]),
                node("reshape", "Reshape", &["c1", "reshape.shape"], &["r1"]),
                node("fc", "Gemm", &["r1", "fc.weight", "fc.bias"], &["logits"]),
                node("mul", "Mul", &["logits", "scale"], &["output"]),
            ],
            inputs: vec!["input".into()],
            outputs: vec!["output".into()],
            initializers: tensors.into_iter().map(TensorDefinition::inline).collect(),
        },
        ..Default::default()
    }
}

/// A quantized matmul graph whose weight and scales are prepack candidates.
pub fn matmul_nbits_like() -> ModelDefinition {
    let tensors = [
        patterned("MatMul.Weight", ElementType::Uint8, &[8, 16], 11),
        patterned("scales", ElementType::Float, &[32], 12),
        patterned("zero_points", ElementType::Uint8, &[16], 13),
    ];

    ModelDefinition {
        producer_name: "extinit-fixtures".into(),
        graph: GraphDefinition {
            name: "matmul_nbits".into(),
            nodes: vec![node(
                "MatMul_0",
                "MatMulNBits",
                &["A", "MatMul.Weight", "scales", "zero_points"],
                &["Y"],
            )],
            inputs: vec!["A".into()],
            outputs: vec!["Y".into()],
            initializers: tensors.into_iter().map(TensorDefinition::inline).collect(),
        },
        ..Default::default()
    }
}

/// Write `definition` as `dir/file_name`.
pub fn write_definition(dir: &Path, file_name: &str, definition: &ModelDefinition) -> io::Result<PathBuf> {
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(definition).map_err(io::Error::other)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Move every initializer of `definition` into `dir/data_file`, back to
/// back, and write the rewritten definition as `dir/file_name`.
pub fn write_with_external_data(
    dir: &Path,
    file_name: &str,
    data_file: &str,
    definition: &ModelDefinition,
) -> io::Result<PathBuf> {
    let mut data = Vec::new();
    let mut rewritten = definition.clone();
    for init in &mut rewritten.graph.initializers {
        let record = TensorRecord::new(
            init.name.clone(),
            init.data_type,
            init.dims.clone(),
            std::mem::take(&mut init.raw_data),
        )
        .map_err(io::Error::other)?;
        let reference = ExternalReference {
            location: data_file.to_string(),
            offset: data.len() as u64,
            length: record.byte_len(),
        };
        data.extend_from_slice(record.bytes());
        *init = TensorDefinition::external(&record, &reference);
    }
    fs::write(dir.join(data_file), data)?;
    write_definition(dir, file_name, &rewritten)
}
