//! `extinit verify`: check a rewritten model against its original.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use extinit_graph::Model;
use extinit_save::{PrepackTable, SaveConfig};
use extinit_verify::{RoundTripVerifier, VerifyReport, remove_outputs};
use tracing::info;

use super::{LayoutArgs, default_external_name};

/// Verify command arguments
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Graph definition the rewritten model was saved from
    #[arg(long, value_name = "MODEL")]
    pub original: PathBuf,

    /// Graph definition produced by `extinit save`
    #[arg(long, value_name = "MODEL")]
    pub rewritten: PathBuf,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// The rewritten model carries prepacked constants
    #[arg(long)]
    pub prepacked: bool,

    /// Prepack manifest the model was saved with; every listed variant must
    /// replace its original
    #[arg(long, value_name = "FILE", requires = "prepacked")]
    pub prepack: Option<PathBuf>,

    /// Delete the rewritten definition and its external data file on success
    #[arg(long)]
    pub cleanup: bool,

    /// External data file to delete with --cleanup, relative to the
    /// rewritten model's directory
    #[arg(short, long, value_name = "NAME", requires = "cleanup")]
    pub external_data: Option<String>,
}

impl VerifyCommand {
    pub fn execute(&self, config: &SaveConfig) -> Result<()> {
        let report = self.run(config)?;
        println!(
            "OK: {} initializers ({} inline, {} external, {} prepacked)",
            report.checked, report.inline, report.external, report.prepacked
        );
        Ok(())
    }

    pub fn run(&self, config: &SaveConfig) -> Result<VerifyReport> {
        let mut config = self.layout.apply(config);
        if self.prepacked {
            config.save_prepacked_as_constants = true;
        }
        if let Some(name) = &self.external_data {
            config.external_file = Some(name.clone());
        }
        let options = config.to_options().context("Invalid save options")?;

        let original = Model::load(&self.original)
            .with_context(|| format!("Failed to load {}", self.original.display()))?;
        let rewritten = Model::load(&self.rewritten)
            .with_context(|| format!("Failed to load {}", self.rewritten.display()))?;
        let table = match &self.prepack {
            Some(path) => Some(
                PrepackTable::from_json_file(path)
                    .with_context(|| format!("Failed to read prepack manifest {}", path.display()))?,
            ),
            None => None,
        };
        let mut verifier = RoundTripVerifier::new(options);
        if let Some(table) = &table {
            verifier = verifier.with_prepack(table);
        }
        let report = verifier
            .verify(&original, &rewritten)
            .with_context(|| {
                format!("{} does not match {}", self.rewritten.display(), self.original.display())
            })?;

        if self.cleanup {
            let name = match &config.external_file {
                Some(name) => name.clone(),
                None => default_external_name(&self.rewritten)?,
            };
            let external = rewritten.model_dir().join(name);
            remove_outputs(&self.rewritten, &external).context("Cleanup failed")?;
            info!("Removed {} and {}", self.rewritten.display(), external.display());
        }
        Ok(report)
    }
}
