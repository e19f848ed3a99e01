//! Save orchestration.

use std::fs;
use std::path::{Component, Path, PathBuf};

use extinit_graph::{GraphDefinition, Model, ModelDefinition, TensorDefinition, TensorRecord};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classify::{Placement, StorageReference, classify};
use crate::config::SaveOptions;
use crate::error::{Result, SerializationError};
use crate::prepack::PrepackTable;
use crate::writer::ExternalDataWriter;

/// Counts reported by a successful save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub initializers_in: usize,
    pub initializers_out: usize,
    pub inline: usize,
    pub external: usize,
    /// Output entries that are prepacked variants.
    pub prepacked: usize,
    /// Length of the external data file, padding included.
    pub external_bytes: u64,
    pub padding_bytes: u64,
}

/// One output initializer after substitution and classification.
struct Planned {
    record: TensorRecord,
    placement: Placement,
    prepacked: bool,
}

/// Writes a model as a definition file plus one external data file.
#[derive(Debug, Clone, Copy)]
pub struct ModelSerializer<'a> {
    options: SaveOptions,
    prepack: Option<&'a PrepackTable>,
}

impl<'a> ModelSerializer<'a> {
    pub fn new(options: SaveOptions) -> Self {
        Self { options, prepack: None }
    }

    /// Use `table` for substitution. Only consulted when
    /// `save_prepacked_as_constants` is set.
    #[must_use]
    pub fn with_prepack(mut self, table: &'a PrepackTable) -> Self {
        self.prepack = Some(table);
        self
    }

    pub fn options(&self) -> &SaveOptions {
        &self.options
    }

    fn active_prepack(&self) -> Option<&'a PrepackTable> {
        self.prepack.filter(|_| self.options.save_prepacked_as_constants)
    }

    /// Save `model` to `definition_path`, externalizing initializers into
    /// `location`, a path relative to the definition's directory.
    ///
    /// The external file is fully written and synced before the definition
    /// is written. On error either file may be partially written; the caller
    /// discards them.
    pub fn save(
        &self,
        model: &Model,
        definition_path: impl AsRef<Path>,
        location: &str,
    ) -> Result<SaveSummary> {
        let definition_path = definition_path.as_ref();
        self.options.validate()?;
        let external_path = external_data_path(definition_path, location)?;

        let records = model.initializer_records()?;
        let initializers_in = records.len();
        if let Some(table) = self.prepack {
            self.report_prepack_coverage(table, &records);
        }

        let plan: Vec<Planned> = records
            .into_par_iter()
            .map(|record| self.plan(record))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        for path in [definition_path, external_path.as_path()] {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| SerializationError::io(dir, e))?;
            }
        }

        let mut summary = SaveSummary { initializers_in, ..Default::default() };
        let mut writer = ExternalDataWriter::create(&external_path, location)?;
        let mut initializers = Vec::with_capacity(plan.len());
        for Planned { record, placement, prepacked } in plan {
            summary.prepacked += usize::from(prepacked);
            let storage = match placement {
                Placement::Inline => StorageReference::Inline,
                Placement::External => {
                    StorageReference::External(writer.write(&record, &self.options.alignment)?)
                }
            };
            debug!("{} ({} bytes): {}", record.name(), record.byte_len(), storage.placement());
            initializers.push(match storage {
                StorageReference::Inline => {
                    summary.inline += 1;
                    TensorDefinition::inline(record)
                }
                StorageReference::External(reference) => {
                    summary.external += 1;
                    TensorDefinition::external(&record, &reference)
                }
            });
        }
        summary.padding_bytes = writer.padding_written();
        summary.external_bytes = writer.finish()?;
        summary.initializers_out = initializers.len();

        let definition = rewritten_definition(model.definition(), initializers);
        let json = serde_json::to_vec_pretty(&definition)?;
        fs::write(definition_path, json).map_err(|e| SerializationError::io(definition_path, e))?;

        info!(
            "Saved {} + {}: {} initializers in, {} out ({} inline, {} external, {} prepacked), {} external bytes ({} padding)",
            definition_path.display(),
            location,
            summary.initializers_in,
            summary.initializers_out,
            summary.inline,
            summary.external,
            summary.prepacked,
            summary.external_bytes,
            summary.padding_bytes
        );
        Ok(summary)
    }

    fn plan(&self, record: TensorRecord) -> Result<Vec<Planned>> {
        let threshold = self.options.size_threshold;
        let (records, prepacked) = match self.active_prepack() {
            Some(table) if table.contains(record.name()) => (table.substitute(record)?, true),
            _ => (vec![record], false),
        };
        Ok(records
            .into_iter()
            .map(|record| {
                let placement = classify(record.byte_len(), threshold);
                Planned { record, placement, prepacked }
            })
            .collect())
    }

    fn report_prepack_coverage(&self, table: &PrepackTable, records: &[TensorRecord]) {
        if !self.options.save_prepacked_as_constants {
            if !table.is_empty() {
                debug!("Prepack table with {} variants ignored", table.len());
            }
            return;
        }
        for base in table.base_names() {
            if !records.iter().any(|r| r.name() == base) {
                warn!("Prepacked initializer '{}' has no counterpart in the graph", base);
            }
        }
    }
}

/// Save `model` with [`ModelSerializer`].
pub fn save_with_external_initializers(
    model: &Model,
    definition_path: impl AsRef<Path>,
    location: &str,
    options: &SaveOptions,
    prepack: Option<&PrepackTable>,
) -> Result<SaveSummary> {
    let mut serializer = ModelSerializer::new(*options);
    if let Some(table) = prepack {
        serializer = serializer.with_prepack(table);
    }
    serializer.save(model, definition_path, location)
}

/// Resolve `location` against the definition's directory. Only plain
/// relative paths that stay inside that directory are accepted.
fn external_data_path(definition_path: &Path, location: &str) -> Result<PathBuf> {
    let invalid = |reason: &str| SerializationError::InvalidExternalPath {
        path: PathBuf::from(location),
        reason: reason.to_string(),
    };
    let rel = Path::new(location);
    if !rel.components().any(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid("no file name"));
    }
    if !rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(invalid("must be relative to the definition directory without '..'"));
    }

    let dir = definition_path.parent().unwrap_or(Path::new(""));
    let path = dir.join(rel);
    if path.components().eq(definition_path.components()) {
        return Err(invalid("would overwrite the definition file"));
    }
    Ok(path)
}

fn rewritten_definition(
    source: &ModelDefinition,
    initializers: Vec<TensorDefinition>,
) -> ModelDefinition {
    let graph = &source.graph;
    ModelDefinition {
        ir_version: source.ir_version,
        producer_name: source.producer_name.clone(),
        producer_version: source.producer_version.clone(),
        graph: GraphDefinition {
            name: graph.name.clone(),
            nodes: graph.nodes.clone(),
            inputs: graph.inputs.clone(),
            outputs: graph.outputs.clone(),
            initializers,
        },
        metadata_props: source.metadata_props.clone(),
    }
}
