//! Model loading and initializer byte reconstruction.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::definition::{
    DataLocation, KEY_LENGTH, KEY_LOCATION, KEY_OFFSET, ModelDefinition, TensorDefinition,
};
use crate::error::{GraphLoadError, Result};
use crate::tensor::TensorRecord;

/// A parsed definition together with the directory its external data
/// references are resolved against.
#[derive(Debug, Clone)]
pub struct Model {
    definition: ModelDefinition,
    model_dir: PathBuf,
}

impl Model {
    /// Parse the definition at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| GraphLoadError::io(path, e))?;
        let definition: ModelDefinition = serde_json::from_str(&text)
            .map_err(|source| GraphLoadError::Parse { path: path.to_path_buf(), source })?;
        let model_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let model = Self::from_definition(definition, model_dir)?;
        debug!(
            "Loaded {} ({} initializers, {} external)",
            path.display(),
            model.initializers().len(),
            model.initializers().iter().filter(|t| t.is_external()).count()
        );
        Ok(model)
    }

    /// Wrap an in-memory definition whose relative external references
    /// resolve against `model_dir`.
    pub fn from_definition(definition: ModelDefinition, model_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut seen = HashSet::new();
        for init in &definition.graph.initializers {
            if !seen.insert(init.name.as_str()) {
                return Err(GraphLoadError::DuplicateInitializer(init.name.clone()));
            }
        }
        Ok(Self { definition, model_dir: model_dir.into() })
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    pub fn into_definition(self) -> ModelDefinition {
        self.definition
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn initializers(&self) -> &[TensorDefinition] {
        &self.definition.graph.initializers
    }

    /// Reconstruct every initializer, in definition order.
    ///
    /// Each external data file is mapped once and shared by all tensors that
    /// reference it.
    pub fn initializer_records(&self) -> Result<Vec<TensorRecord>> {
        let mut files = MappedFiles::default();
        self.initializers().iter().map(|def| files.record(def, &self.model_dir)).collect()
    }

    /// Reconstruct the initializer named `name`, if present.
    pub fn initializer_record(&self, name: &str) -> Result<Option<TensorRecord>> {
        let Some(def) = self.definition.graph.initializer(name) else {
            return Ok(None);
        };
        MappedFiles::default().record(def, &self.model_dir).map(Some)
    }
}

/// Raw bytes of `def`, read inline or from its external data file under `model_dir`.
pub fn unpack_initializer_data(def: &TensorDefinition, model_dir: &Path) -> Result<Vec<u8>> {
    MappedFiles::default().bytes(def, model_dir)
}

// ── External data access ───────────────────────────────────────────

/// Read-only mappings keyed by resolved path. Empty files are recorded as
/// `None` since they have nothing to map.
#[derive(Default)]
struct MappedFiles {
    files: HashMap<PathBuf, Option<Mmap>>,
}

impl MappedFiles {
    fn record(&mut self, def: &TensorDefinition, model_dir: &Path) -> Result<TensorRecord> {
        let bytes = self.bytes(def, model_dir)?;
        TensorRecord::new(def.name.clone(), def.data_type, def.dims.clone(), bytes)
    }

    fn bytes(&mut self, def: &TensorDefinition, model_dir: &Path) -> Result<Vec<u8>> {
        match def.data_location {
            DataLocation::Default => {
                if !def.external_data.is_empty() {
                    return Err(GraphLoadError::invalid_reference(
                        &def.name,
                        "DEFAULT tensor carries external data entries",
                    ));
                }
                Ok(def.raw_data.clone())
            }
            DataLocation::External => {
                if !def.raw_data.is_empty() {
                    return Err(GraphLoadError::invalid_reference(
                        &def.name,
                        "EXTERNAL tensor also carries inline bytes",
                    ));
                }
                let fields = ExternalFields::parse(def)?;
                let path = resolve_location(&def.name, model_dir, fields.location)?;
                let data = self.map(&path)?;
                let file_len = data.len() as u64;

                let out_of_bounds = |length| GraphLoadError::ExternalDataOutOfBounds {
                    name: def.name.clone(),
                    offset: fields.offset,
                    length,
                    file_len,
                };
                let length = match fields.length {
                    Some(len) => len,
                    None => file_len.checked_sub(fields.offset).ok_or_else(|| out_of_bounds(0))?,
                };
                let end = fields
                    .offset
                    .checked_add(length)
                    .filter(|&end| end <= file_len)
                    .ok_or_else(|| out_of_bounds(length))?;

                Ok(data[fields.offset as usize..end as usize].to_vec())
            }
        }
    }

    fn map(&mut self, path: &Path) -> Result<&[u8]> {
        let mapped = match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(map_file(path)?),
        };
        Ok(mapped.as_deref().unwrap_or(&[]))
    }
}

fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).map_err(|e| GraphLoadError::io(path, e))?;
    let len = file.metadata().map_err(|e| GraphLoadError::io(path, e))?.len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: the mapping is read-only and dropped before the loader returns;
    // external data files are not mutated while a model is being loaded.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| GraphLoadError::io(path, e))?;
    Ok(Some(mmap))
}

/// Parsed `external_data` entries of one tensor.
struct ExternalFields<'a> {
    location: &'a str,
    offset: u64,
    /// `None` means "to the end of the file".
    length: Option<u64>,
}

impl<'a> ExternalFields<'a> {
    fn parse(def: &'a TensorDefinition) -> Result<Self> {
        let location = def
            .external_data_entry(KEY_LOCATION)
            .ok_or_else(|| GraphLoadError::invalid_reference(&def.name, "missing 'location'"))?;
        let parse_u64 = |key: &str| -> Result<Option<u64>> {
            def.external_data_entry(key)
                .map(|v| {
                    v.trim().parse::<u64>().map_err(|_| {
                        GraphLoadError::invalid_reference(
                            &def.name,
                            format!("'{key}' is not a non-negative integer: {v:?}"),
                        )
                    })
                })
                .transpose()
        };
        let offset = parse_u64(KEY_OFFSET)?.unwrap_or(0);
        let length = parse_u64(KEY_LENGTH)?;
        Ok(Self { location, offset, length })
    }
}

/// Resolve a relative `location` under `model_dir`, rejecting absolute paths
/// and anything that escapes the directory.
fn resolve_location(name: &str, model_dir: &Path, location: &str) -> Result<PathBuf> {
    let rel = Path::new(location);
    if location.is_empty() {
        return Err(GraphLoadError::invalid_reference(name, "empty 'location'"));
    }
    let plain = rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(GraphLoadError::invalid_reference(
            name,
            format!("'location' must be relative to the model directory: {location}"),
        ));
    }
    Ok(model_dir.join(rel))
}
