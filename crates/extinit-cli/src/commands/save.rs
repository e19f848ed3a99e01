//! `extinit save`: rewrite a model with externalized initializers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use extinit_graph::Model;
use extinit_save::{ModelSerializer, PrepackTable, SaveConfig, SaveSummary};
use tracing::{info, warn};

use super::{LayoutArgs, default_external_name};

/// Save command arguments
#[derive(Args, Debug)]
pub struct SaveCommand {
    /// Source graph definition
    #[arg(short, long, value_name = "MODEL")]
    pub input: PathBuf,

    /// Destination graph definition
    #[arg(short, long, value_name = "MODEL")]
    pub output: PathBuf,

    /// External data file, relative to the output's directory
    ///
    /// Defaults to the configured `external_file`, else `<output name>.data`.
    #[arg(short, long, value_name = "NAME")]
    pub external_data: Option<String>,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Prepacked constants manifest (JSON)
    #[arg(long, value_name = "FILE")]
    pub prepack: Option<PathBuf>,

    /// Replace initializers by their prepacked variants
    #[arg(long)]
    pub save_prepacked: bool,
}

impl SaveCommand {
    pub fn execute(&self, config: &SaveConfig) -> Result<()> {
        let summary = self.run(config)?;
        println!(
            "Saved {} -> {} ({} inline, {} external, {} prepacked; {} bytes, {} padding)",
            self.input.display(),
            self.output.display(),
            summary.inline,
            summary.external,
            summary.prepacked,
            summary.external_bytes,
            summary.padding_bytes
        );
        Ok(())
    }

    /// Apply the flags on top of `config` and save.
    pub fn run(&self, config: &SaveConfig) -> Result<SaveSummary> {
        let config = self.effective_config(config);
        let options = config.to_options().context("Invalid save options")?;
        let location = self.location(&config)?;

        let table = match &self.prepack {
            Some(path) => Some(
                PrepackTable::from_json_file(path)
                    .with_context(|| format!("Failed to read prepack manifest {}", path.display()))?,
            ),
            None => None,
        };
        if table.is_some() && !options.save_prepacked_as_constants {
            warn!("--prepack given without --save-prepacked; originals are kept");
        }

        let model = Model::load(&self.input)
            .with_context(|| format!("Failed to load {}", self.input.display()))?;
        let mut serializer = ModelSerializer::new(options);
        if let Some(table) = &table {
            serializer = serializer.with_prepack(table);
        }
        info!("Writing external data to {location}");
        serializer
            .save(&model, &self.output, &location)
            .with_context(|| format!("Failed to save {}", self.output.display()))
    }

    pub fn effective_config(&self, config: &SaveConfig) -> SaveConfig {
        let mut out = self.layout.apply(config);
        if self.save_prepacked {
            out.save_prepacked_as_constants = true;
        }
        if let Some(name) = &self.external_data {
            out.external_file = Some(name.clone());
        }
        out
    }

    fn location(&self, config: &SaveConfig) -> Result<String> {
        if let Some(name) = &config.external_file {
            return Ok(name.clone());
        }
        default_external_name(&self.output)
    }
}
