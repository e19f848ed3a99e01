//! Prepacked initializer substitution.
//!
//! Kernels may reformat a weight ahead of execution (block padding, nibble
//! interleaving, ...). The table holds those variants keyed by the original
//! initializer name and a kernel qualifier; on save each original can be
//! replaced by one `base:qualifier` entry per kernel.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use extinit_graph::{ElementType, TensorRecord};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SerializationError};

/// Separates the base initializer name from the kernel qualifier.
pub const QUALIFIER_SEPARATOR: char = ':';

/// `base:qualifier`.
pub fn composite_name(base: &str, qualifier: &str) -> String {
    format!("{base}{QUALIFIER_SEPARATOR}{qualifier}")
}

/// Name with any qualifier suffix stripped (text before the first `:`).
pub fn base_name(name: &str) -> &str {
    name.split_once(QUALIFIER_SEPARATOR).map_or(name, |(base, _)| base)
}

/// Two-level mapping `base name -> qualifier -> prepacked record`.
///
/// Both levels are ordered, so resolution order does not depend on
/// insertion order and saved artifacts are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepackTable {
    entries: BTreeMap<String, BTreeMap<String, TensorRecord>>,
}

impl PrepackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` as the `qualifier` variant of `base`.
    ///
    /// The record is renamed to the composite name. Returns the variant it
    /// replaced, if any.
    pub fn insert(
        &mut self,
        base: impl Into<String>,
        qualifier: impl Into<String>,
        record: TensorRecord,
    ) -> Result<Option<TensorRecord>> {
        let base = base.into();
        let qualifier = qualifier.into();
        let name = composite_name(&base, &qualifier);
        let invalid = |reason: &str| SerializationError::InvalidPrepackEntry {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if base.is_empty() {
            return Err(invalid("empty base name"));
        }
        if base.contains(QUALIFIER_SEPARATOR) {
            return Err(invalid("base name contains ':'"));
        }
        if qualifier.is_empty() {
            return Err(invalid("empty kernel qualifier"));
        }
        if qualifier.contains(QUALIFIER_SEPARATOR) {
            return Err(invalid("kernel qualifier contains ':'"));
        }

        let record = record.renamed(name);
        Ok(self.entries.entry(base).or_default().insert(qualifier, record))
    }

    /// Composite names and records registered for `base`, in qualifier
    /// order. Empty when `base` has no variants.
    pub fn resolve(&self, base: &str) -> Vec<(String, &TensorRecord)> {
        self.entries
            .get(base)
            .map(|variants| {
                variants.values().map(|record| (record.name().to_string(), record)).collect()
            })
            .unwrap_or_default()
    }

    /// Replace `original` by its prepacked variants, or pass it through
    /// unchanged when it has none.
    ///
    /// A variant shorter than the original is rejected: packing may pad but
    /// never drops bytes.
    pub fn substitute(&self, original: TensorRecord) -> Result<Vec<TensorRecord>> {
        let Some(variants) = self.entries.get(original.name()) else {
            return Ok(vec![original]);
        };

        variants
            .values()
            .map(|packed| {
                if packed.byte_len() < original.byte_len() {
                    return Err(SerializationError::PrepackShrinks {
                        name: packed.name().to_string(),
                        original: original.byte_len(),
                        prepacked: packed.byte_len(),
                    });
                }
                debug!(
                    "Substituting {} ({} bytes) for {} ({} bytes)",
                    packed.name(),
                    packed.byte_len(),
                    original.name(),
                    original.byte_len()
                );
                Ok(packed.clone())
            })
            .collect()
    }

    pub fn contains(&self, base: &str) -> bool {
        self.entries.contains_key(base)
    }

    /// Total number of prepacked variants across all base names.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Base names with at least one variant, in order.
    pub fn base_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Qualifiers registered for `base`, in order.
    pub fn qualifiers<'a>(&'a self, base: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.get(base).into_iter().flat_map(|v| v.keys().map(String::as_str))
    }

    /// Load a JSON manifest of the form
    /// `{ "<base>": { "<qualifier>": { "data_type", "dims", "raw_data"? } } }`
    /// with `raw_data` in base64, as in definition files.
    ///
    /// An entry without `raw_data` is zero-filled to its shape.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| SerializationError::io(path, e))?;
        let manifest: BTreeMap<String, BTreeMap<String, ManifestTensor>> =
            serde_json::from_str(&text).map_err(|source| SerializationError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;

        let mut table = Self::new();
        for (base, variants) in manifest {
            for (qualifier, tensor) in variants {
                let name = composite_name(&base, &qualifier);
                let record = if tensor.raw_data.is_empty() {
                    TensorRecord::zeroed(name, tensor.data_type, tensor.dims)?
                } else {
                    TensorRecord::new(name, tensor.data_type, tensor.dims, tensor.raw_data)?
                };
                table.insert(base.clone(), qualifier, record)?;
            }
        }
        debug!("Loaded {} prepacked variants from {}", table.len(), path.display());
        Ok(table)
    }
}

/// One variant in a prepack manifest.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestTensor {
    data_type: ElementType,
    dims: Vec<i64>,
    #[serde(default, with = "extinit_graph::definition::base64_bytes")]
    raw_data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bytes(name: &str, len: usize, fill: u8) -> TensorRecord {
        TensorRecord::new(name, ElementType::Uint8, vec![len as i64], vec![fill; len]).unwrap()
    }

    #[test]
    fn names() {
        assert_eq!(composite_name("MatMul.Weight", "MatMul_0"), "MatMul.Weight:MatMul_0");
        assert_eq!(base_name("MatMul.Weight:MatMul_0"), "MatMul.Weight");
        assert_eq!(base_name("a:b:c"), "a");
        assert_eq!(base_name("plain"), "plain");
    }

    #[test]
    fn insert_renames_to_composite() {
        let mut table = PrepackTable::new();
        assert!(table.insert("w", "k0", bytes("anything", 4, 1)).unwrap().is_none());
        let resolved = table.resolve("w");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, "w:k0");
        assert_eq!(resolved[0].1.name(), "w:k0");
    }

    #[test]
    fn insert_replaces_same_qualifier() {
        let mut table = PrepackTable::new();
        table.insert("w", "k0", bytes("x", 4, 1)).unwrap();
        let old = table.insert("w", "k0", bytes("x", 8, 2)).unwrap();
        assert_eq!(old.map(|r| r.byte_len()), Some(4));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_rejects_separator_in_parts() {
        let mut table = PrepackTable::new();
        let err = table.insert("a:b", "k", bytes("x", 1, 0)).unwrap_err();
        assert!(matches!(err, SerializationError::InvalidPrepackEntry { .. }));
        assert!(table.insert("a", "", bytes("x", 1, 0)).is_err());
        assert!(table.insert("a", "k:1", bytes("x", 1, 0)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn resolution_order_is_independent_of_insertion() {
        let mut forward = PrepackTable::new();
        let mut backward = PrepackTable::new();
        for q in ["k0", "k1", "k2"] {
            forward.insert("w", q, bytes("x", 4, 0)).unwrap();
        }
        for q in ["k2", "k1", "k0"] {
            backward.insert("w", q, bytes("x", 4, 0)).unwrap();
        }
        assert_eq!(forward, backward);
        let names: Vec<_> = backward.resolve("w").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["w:k0", "w:k1", "w:k2"]);
        assert_eq!(backward.qualifiers("w").collect::<Vec<_>>(), ["k0", "k1", "k2"]);
    }

    #[test]
    fn substitute_without_entry_passes_through() {
        let table = PrepackTable::new();
        let original = bytes("w", 4, 1);
        assert_eq!(table.substitute(original.clone()).unwrap(), vec![original]);
        assert!(table.resolve("w").is_empty());
    }

    #[test]
    fn substitute_expands_per_qualifier() {
        let mut table = PrepackTable::new();
        table.insert("w", "k1", bytes("x", 8, 2)).unwrap();
        table.insert("w", "k0", bytes("x", 4, 1)).unwrap();
        let out = table.substitute(bytes("w", 4, 9)).unwrap();
        let names: Vec<_> = out.iter().map(TensorRecord::name).collect();
        assert_eq!(names, ["w:k0", "w:k1"]);
        assert_eq!(out[1].bytes(), &[2u8; 8]);
    }

    #[test]
    fn substitute_rejects_shrinking_variant() {
        let mut table = PrepackTable::new();
        table.insert("w", "k0", bytes("x", 3, 1)).unwrap();
        let err = table.substitute(bytes("w", 4, 0)).unwrap_err();
        assert!(
            matches!(err, SerializationError::PrepackShrinks { ref name, original: 4, prepacked: 3 } if name == "w:k0"),
            "{err}"
        );
    }

    #[test]
    fn len_counts_variants() {
        let mut table = PrepackTable::new();
        table.insert("a", "k0", bytes("x", 1, 0)).unwrap();
        table.insert("a", "k1", bytes("x", 1, 0)).unwrap();
        table.insert("b", "k0", bytes("x", 1, 0)).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.contains("a"));
        assert!(!table.contains("a:k0"));
        assert_eq!(table.base_names().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn manifest_loads_and_zero_fills() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepack.json");
        fs::write(
            &path,
            r#"{
                "scales": { "MatMul_0": { "data_type": "FLOAT", "dims": [178] } },
                "w": { "k": { "data_type": "UINT8", "dims": [2], "raw_data": "Bwg=" } }
            }"#,
        )
        .unwrap();

        let table = PrepackTable::from_json_file(&path).unwrap();
        assert_eq!(table.len(), 2);
        let scales = table.resolve("scales");
        assert_eq!(scales[0].0, "scales:MatMul_0");
        assert_eq!(scales[0].1.byte_len(), 178 * 4);
        assert!(scales[0].1.bytes().iter().all(|&b| b == 0));
        assert_eq!(table.resolve("w")[0].1.bytes(), &[7, 8]);
    }

    #[test]
    fn manifest_with_mismatched_bytes_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepack.json");
        fs::write(&path, r#"{ "w": { "k": { "data_type": "FLOAT", "dims": [2], "raw_data": "AQ==" } } }"#)
            .unwrap();
        let err = PrepackTable::from_json_file(&path).unwrap_err();
        assert!(matches!(err, SerializationError::GraphLoad(_)), "{err}");
    }

    #[test]
    fn malformed_manifest_names_the_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepack.json");
        fs::write(&path, r#"{ "w": { "k": { "data_type": "FLOAT" } } }"#).unwrap();
        let err = PrepackTable::from_json_file(&path).unwrap_err();
        assert!(
            matches!(err, SerializationError::Manifest { path: ref p, .. } if *p == path),
            "{err}"
        );
        assert!(err.to_string().starts_with("invalid prepack manifest"), "{err}");
    }

    #[test]
    fn missing_manifest_is_io_error() {
        let err = PrepackTable::from_json_file("/nonexistent/prepack.json").unwrap_err();
        assert!(matches!(err, SerializationError::Io { .. }));
    }
}
