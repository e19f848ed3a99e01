//! Original-versus-rewritten initializer comparison.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use extinit_graph::{KEY_LOCATION, KEY_OFFSET, Model, TensorDefinition, TensorRecord};
use extinit_save::{
    ModelSerializer, PrepackTable, SaveOptions, base_name, classify, composite_name,
};
use tracing::{debug, info};

use crate::error::{Result, VerifyError};

/// Counts gathered by a successful verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    pub inline: usize,
    pub external: usize,
    pub prepacked: usize,
}

/// Checks a rewritten model against the options it was saved with.
#[derive(Debug, Clone, Copy)]
pub struct RoundTripVerifier<'a> {
    options: SaveOptions,
    prepack: Option<&'a PrepackTable>,
}

impl<'a> RoundTripVerifier<'a> {
    pub fn new(options: SaveOptions) -> Self {
        Self { options, prepack: None }
    }

    /// Also require, in prepacked mode, that every original with entries in
    /// `table` is replaced by exactly its registered variants.
    pub fn with_prepack(mut self, table: &'a PrepackTable) -> Self {
        self.prepack = Some(table);
        self
    }

    pub fn verify(&self, original: &Model, rewritten: &Model) -> Result<VerifyReport> {
        self.options.validate()?;
        let prepacked_mode = self.options.save_prepacked_as_constants;

        let originals: HashMap<String, TensorRecord> = original
            .initializer_records()?
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        let rewritten_records = rewritten.initializer_records()?;

        if !prepacked_mode && originals.len() != rewritten_records.len() {
            return Err(VerifyError::CountMismatch {
                original: originals.len(),
                rewritten: rewritten_records.len(),
            });
        }

        let mut report = VerifyReport::default();
        let mut covered = HashSet::new();
        for (def, record) in rewritten.initializers().iter().zip(&rewritten_records) {
            let key = if prepacked_mode { base_name(&def.name) } else { def.name.as_str() };
            let source = originals
                .get(key)
                .ok_or_else(|| VerifyError::MissingInitializer { name: def.name.clone() })?;
            covered.insert(key);
            if prepacked_mode
                && key == def.name
                && self.prepack.is_some_and(|table| table.contains(key))
            {
                return Err(VerifyError::UnreplacedInitializer { name: def.name.clone() });
            }

            self.check_location(def, record)?;
            if prepacked_mode {
                check_not_shrunk(&def.name, source, record)?;
            } else {
                check_identical(&def.name, source, record)?;
            }
            self.check_alignment(def, record)?;

            report.checked += 1;
            if def.is_external() {
                report.external += 1;
            } else {
                report.inline += 1;
            }
            if key != def.name {
                report.prepacked += 1;
            }
            debug!("{}: {:?}, {} bytes ok", def.name, def.data_location, record.byte_len());
        }

        if prepacked_mode {
            let mut names: Vec<_> =
                originals.keys().filter(|n| !covered.contains(n.as_str())).collect();
            names.sort();
            if let Some(name) = names.first() {
                return Err(VerifyError::DroppedInitializer { name: (*name).clone() });
            }
            if let Some(table) = self.prepack {
                self.check_variants(table, &originals, rewritten)?;
            }
        }

        info!(
            "Verified {} initializers ({} inline, {} external, {} prepacked)",
            report.checked, report.inline, report.external, report.prepacked
        );
        Ok(report)
    }

    fn check_variants(
        &self,
        table: &PrepackTable,
        originals: &HashMap<String, TensorRecord>,
        rewritten: &Model,
    ) -> Result<()> {
        let names: HashSet<&str> =
            rewritten.initializers().iter().map(|def| def.name.as_str()).collect();
        for base in table.base_names().filter(|base| originals.contains_key(*base)) {
            for qualifier in table.qualifiers(base) {
                let name = composite_name(base, qualifier);
                if !names.contains(name.as_str()) {
                    return Err(VerifyError::MissingVariant { name });
                }
            }
        }
        Ok(())
    }

    fn check_location(&self, def: &TensorDefinition, record: &TensorRecord) -> Result<()> {
        let expected = classify(record.byte_len(), self.options.size_threshold).data_location();
        if def.data_location != expected {
            return Err(VerifyError::LocationMismatch {
                name: def.name.clone(),
                expected,
                actual: def.data_location,
            });
        }
        Ok(())
    }

    fn check_alignment(&self, def: &TensorDefinition, record: &TensorRecord) -> Result<()> {
        let policy = &self.options.alignment;
        if !def.is_external() || !policy.applies_to(record.byte_len()) {
            return Ok(());
        }
        let invalid =
            |reason: String| VerifyError::InvalidReference { name: def.name.clone(), reason };
        let offset = match def.external_data_entry(KEY_OFFSET) {
            Some(v) => v.parse::<u64>().map_err(|_| invalid(format!("unparsable offset {v:?}")))?,
            None => 0,
        };
        if offset % policy.allocation_granularity != 0 {
            return Err(VerifyError::AlignmentViolation {
                name: def.name.clone(),
                offset,
                granularity: policy.allocation_granularity,
            });
        }
        Ok(())
    }
}

fn check_identical(name: &str, source: &TensorRecord, rewritten: &TensorRecord) -> Result<()> {
    if source.byte_len() != rewritten.byte_len() {
        return Err(VerifyError::SizeMismatch {
            name: name.to_string(),
            original: source.byte_len(),
            rewritten: rewritten.byte_len(),
        });
    }
    if let Some(first_difference) =
        source.bytes().iter().zip(rewritten.bytes()).position(|(a, b)| a != b)
    {
        return Err(VerifyError::DataMismatch { name: name.to_string(), first_difference });
    }
    Ok(())
}

fn check_not_shrunk(name: &str, source: &TensorRecord, rewritten: &TensorRecord) -> Result<()> {
    if rewritten.byte_len() < source.byte_len() {
        return Err(VerifyError::SizeMismatch {
            name: name.to_string(),
            original: source.byte_len(),
            rewritten: rewritten.byte_len(),
        });
    }
    Ok(())
}

/// Load `input`, save it to `output` with external data at `location`,
/// reload, and verify. Both outputs are removed after a successful check
/// and left in place for inspection otherwise.
///
/// Fails with [`VerifyError::OutputOverlapsInput`] before touching any file
/// when `output` or `location` names the input definition or one of its
/// external data files.
pub fn load_save_and_compare(
    input: &Path,
    output: &Path,
    location: &str,
    options: &SaveOptions,
    prepack: Option<&PrepackTable>,
) -> Result<VerifyReport> {
    let original = Model::load(input)?;
    let external = output.parent().unwrap_or(Path::new("")).join(location);
    ensure_disjoint(input, &original, [output, external.as_path()])?;
    for stale in [output, external.as_path()] {
        match fs::remove_file(stale) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(VerifyError::Io { path: stale.to_path_buf(), source: e });
            }
            _ => {}
        }
    }

    let mut serializer = ModelSerializer::new(*options);
    if let Some(table) = prepack {
        serializer = serializer.with_prepack(table);
    }
    serializer.save(&original, output, location)?;

    let rewritten = Model::load(output)?;
    let mut verifier = RoundTripVerifier::new(*options);
    if let Some(table) = prepack {
        verifier = verifier.with_prepack(table);
    }
    let report = verifier.verify(&original, &rewritten)?;
    remove_outputs(output, &external)?;
    Ok(report)
}

/// Reject outputs that resolve to the input definition or a data file it
/// references.
fn ensure_disjoint(input: &Path, original: &Model, outputs: [&Path; 2]) -> Result<()> {
    let mut inputs = vec![input.to_path_buf()];
    inputs.extend(
        original
            .initializers()
            .iter()
            .filter_map(|def| def.external_data_entry(KEY_LOCATION))
            .map(|location| original.model_dir().join(location)),
    );
    for output in outputs {
        if inputs.iter().any(|path| same_file(path, output)) {
            return Err(VerifyError::OutputOverlapsInput { path: output.to_path_buf() });
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Delete a saved definition and its external data file.
pub fn remove_outputs(definition: &Path, external: &Path) -> Result<()> {
    for path in [definition, external] {
        fs::remove_file(path)
            .map_err(|e| VerifyError::Io { path: path.to_path_buf(), source: e })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use extinit_graph::{DataLocation, ElementType, GraphDefinition, ModelDefinition};

    fn inline_model(tensors: &[(&str, Vec<u8>)]) -> Model {
        let initializers = tensors
            .iter()
            .map(|(name, bytes)| {
                let shape = vec![bytes.len() as i64];
                let record =
                    TensorRecord::new(*name, ElementType::Uint8, shape, bytes.clone()).unwrap();
                TensorDefinition::inline(record)
            })
            .collect();
        let definition = ModelDefinition {
            graph: GraphDefinition { initializers, ..Default::default() },
            ..Default::default()
        };
        Model::from_definition(definition, ".").unwrap()
    }

    fn exact(threshold: u64) -> RoundTripVerifier<'static> {
        RoundTripVerifier::new(SaveOptions { size_threshold: threshold, ..Default::default() })
    }

    #[test]
    fn identical_inline_models_verify() {
        let model = inline_model(&[("a", vec![1, 2]), ("b", vec![3])]);
        let report = exact(100).verify(&model, &model).unwrap();
        assert_eq!(report, VerifyReport { checked: 2, inline: 2, external: 0, prepacked: 0 });
    }

    #[test]
    fn count_mismatch() {
        let original = inline_model(&[("a", vec![1]), ("b", vec![2])]);
        let rewritten = inline_model(&[("a", vec![1])]);
        let err = exact(100).verify(&original, &rewritten).unwrap_err();
        assert!(matches!(err, VerifyError::CountMismatch { original: 2, rewritten: 1 }));
    }

    #[test]
    fn renamed_initializer_is_missing() {
        let original = inline_model(&[("a", vec![1])]);
        let rewritten = inline_model(&[("z", vec![1])]);
        let err = exact(100).verify(&original, &rewritten).unwrap_err();
        assert!(matches!(err, VerifyError::MissingInitializer { ref name } if name == "z"));
    }

    #[test]
    fn inline_above_threshold_is_location_mismatch() {
        let model = inline_model(&[("a", vec![0; 8])]);
        let err = exact(8).verify(&model, &model).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::LocationMismatch {
                expected: DataLocation::External,
                actual: DataLocation::Default,
                ..
            }
        ));
    }

    #[test]
    fn data_mismatch_reports_first_difference() {
        let original = inline_model(&[("a", vec![1, 2, 3, 4])]);
        let rewritten = inline_model(&[("a", vec![1, 2, 9, 9])]);
        let err = exact(100).verify(&original, &rewritten).unwrap_err();
        assert!(matches!(err, VerifyError::DataMismatch { first_difference: 2, .. }), "{err}");
    }

    #[test]
    fn size_mismatch_in_exact_mode() {
        let original = inline_model(&[("a", vec![1, 2])]);
        let rewritten = inline_model(&[("a", vec![1, 2, 3])]);
        let err = exact(100).verify(&original, &rewritten).unwrap_err();
        assert!(matches!(err, VerifyError::SizeMismatch { original: 2, rewritten: 3, .. }));
    }

    #[test]
    fn prepacked_mode_keys_by_base_name() {
        let original = inline_model(&[("w", vec![1, 2]), ("b", vec![3])]);
        let rewritten =
            inline_model(&[("w:k0", vec![0; 4]), ("w:k1", vec![0; 2]), ("b", vec![3])]);
        let verifier = RoundTripVerifier::new(SaveOptions {
            size_threshold: 100,
            save_prepacked_as_constants: true,
            ..Default::default()
        });
        let report = verifier.verify(&original, &rewritten).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.prepacked, 2);
    }

    #[test]
    fn prepacked_mode_rejects_shrinking_and_dropping() {
        let verifier = RoundTripVerifier::new(SaveOptions {
            size_threshold: 100,
            save_prepacked_as_constants: true,
            ..Default::default()
        });
        let original = inline_model(&[("w", vec![1, 2]), ("b", vec![3])]);

        let shrunk = inline_model(&[("w:k0", vec![0]), ("b", vec![3])]);
        let err = verifier.verify(&original, &shrunk).unwrap_err();
        assert!(matches!(err, VerifyError::SizeMismatch { ref name, .. } if name == "w:k0"));

        let dropped = inline_model(&[("w:k0", vec![0; 2])]);
        let err = verifier.verify(&original, &dropped).unwrap_err();
        assert!(matches!(err, VerifyError::DroppedInitializer { ref name } if name == "b"));
    }

    fn table(variants: &[(&str, &str, usize)]) -> PrepackTable {
        let mut table = PrepackTable::new();
        for (base, qualifier, len) in variants {
            let record =
                TensorRecord::new("v", ElementType::Uint8, vec![*len as i64], vec![0; *len])
                    .unwrap();
            table.insert(*base, *qualifier, record).unwrap();
        }
        table
    }

    #[test]
    fn prepacked_mode_with_table_rejects_unqualified_base() {
        let options = SaveOptions {
            size_threshold: 100,
            save_prepacked_as_constants: true,
            ..Default::default()
        };
        let table = table(&[("w", "k0", 4)]);
        let original = inline_model(&[("w", vec![1, 2])]);
        let both = inline_model(&[("w", vec![1, 2]), ("w:k0", vec![0; 4])]);

        assert!(RoundTripVerifier::new(options).verify(&original, &both).is_ok());
        let err = RoundTripVerifier::new(options)
            .with_prepack(&table)
            .verify(&original, &both)
            .unwrap_err();
        assert!(matches!(err, VerifyError::UnreplacedInitializer { ref name } if name == "w"));
    }

    #[test]
    fn prepacked_mode_with_table_requires_every_variant() {
        let options = SaveOptions {
            size_threshold: 100,
            save_prepacked_as_constants: true,
            ..Default::default()
        };
        let table = table(&[("w", "k0", 4), ("w", "k1", 2)]);
        let original = inline_model(&[("w", vec![1, 2])]);

        let partial = inline_model(&[("w:k0", vec![0; 4])]);
        let err = RoundTripVerifier::new(options)
            .with_prepack(&table)
            .verify(&original, &partial)
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingVariant { ref name } if name == "w:k1"));

        let full = inline_model(&[("w:k0", vec![0; 4]), ("w:k1", vec![0; 2])]);
        let report =
            RoundTripVerifier::new(options).with_prepack(&table).verify(&original, &full).unwrap();
        assert_eq!(report.prepacked, 2);
    }

    #[test]
    fn remove_outputs_reports_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let def = dir.path().join("model.json");
        let ext = dir.path().join("model.bin");
        fs::write(&def, "{}").unwrap();
        let err = remove_outputs(&def, &ext).unwrap_err();
        assert!(matches!(err, VerifyError::Io { .. }));
        assert!(!def.exists());
    }
}
