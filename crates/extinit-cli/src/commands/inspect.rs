//! `extinit inspect`: list initializers and their storage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use extinit_graph::{KEY_LENGTH, KEY_LOCATION, KEY_OFFSET, Model, TensorDefinition};
use serde::Serialize;
use tracing::debug;

/// Inspect command arguments
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Graph definition to inspect
    #[arg(short, long, value_name = "MODEL")]
    pub input: PathBuf,

    /// Also read every initializer's bytes to check external references
    #[arg(long)]
    pub check: bool,

    /// Output format as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// One initializer as reported by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializerRow {
    pub name: String,
    pub data_type: String,
    pub dims: Vec<i64>,
    pub external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    /// Inline byte count, or the recorded external length.
    pub length: Option<String>,
}

impl InitializerRow {
    pub fn from_definition(def: &TensorDefinition) -> Self {
        let entry = |key| def.external_data_entry(key).map(str::to_string);
        let (location, offset, length) = if def.is_external() {
            (entry(KEY_LOCATION), entry(KEY_OFFSET), entry(KEY_LENGTH))
        } else {
            (None, None, Some(def.raw_data.len().to_string()))
        };
        Self {
            name: def.name.clone(),
            data_type: def.data_type.to_string(),
            dims: def.dims.clone(),
            external: def.is_external(),
            location,
            offset,
            length,
        }
    }
}

impl InspectCommand {
    pub fn execute(&self) -> Result<()> {
        let rows = self.run()?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }
        for row in &rows {
            let place = match (&row.location, &row.offset) {
                (Some(file), offset) => {
                    format!("{file}@{}", offset.as_deref().unwrap_or("0"))
                }
                (None, _) if row.external => "external".to_string(),
                (None, _) => "inline".to_string(),
            };
            println!(
                "{:<40} {:<8} {:<16} {:<28} {}",
                row.name,
                row.data_type,
                format!("{:?}", row.dims),
                place,
                row.length.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }

    pub fn run(&self) -> Result<Vec<InitializerRow>> {
        let model = Model::load(&self.input)
            .with_context(|| format!("Failed to load {}", self.input.display()))?;
        if self.check {
            let records = model
                .initializer_records()
                .with_context(|| format!("Unreadable initializer data in {}", self.input.display()))?;
            debug!("Read {} initializers", records.len());
        }
        Ok(model.initializers().iter().map(InitializerRow::from_definition).collect())
    }
}
