//! extinit CLI library
//!
//! Argument definitions, configuration layering, and command
//! implementations for the `extinit` binary. Exposed as a library so the
//! parser and commands can be tested without spawning a process.

pub mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use extinit_save::SaveConfig;
use tracing_subscriber::EnvFilter;

use crate::commands::{InspectCommand, SaveCommand, VerifyCommand};

/// Default filter when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Save graph definitions with large initializers moved to an external data file
#[derive(Parser, Debug)]
#[command(name = "extinit")]
#[command(about = "Save models with externalized, optionally aligned initializers")]
#[command(version)]
pub struct Cli {
    /// Configuration file with a `[save]` table
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace) or a full filter directive
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a model with large initializers in an external data file
    Save(SaveCommand),

    /// Check a saved model against its original
    #[command(alias = "check")]
    Verify(VerifyCommand),

    /// List initializers and where their bytes live
    #[command(alias = "ls")]
    Inspect(InspectCommand),
}

impl Cli {
    pub fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        match &self.command {
            Commands::Save(cmd) => cmd.execute(&config),
            Commands::Verify(cmd) => cmd.execute(&config),
            Commands::Inspect(cmd) => cmd.execute(),
        }
    }

    /// Defaults, overlaid by the `--config` file, overlaid by `EXTINIT_*`
    /// variables. Command flags are applied later by each command.
    pub fn load_config(&self) -> Result<SaveConfig> {
        let base = match &self.config {
            Some(path) => SaveConfig::from_toml(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => SaveConfig::default(),
        };
        let env = SaveConfig::from_env().context("Invalid EXTINIT_* environment variable")?;
        let config = base.merge_with(&env);
        config.validate().context("Invalid save configuration")?;
        Ok(config)
    }
}

/// The clap command tree, for help rendering and completion generators.
pub fn build_cli() -> clap::Command {
    Cli::command()
}

/// Install the global subscriber. `RUST_LOG` wins over `--log-level`.
pub fn init_logging(log_level: Option<&str>) -> Result<()> {
    let level = log_level.unwrap_or(DEFAULT_LOG_LEVEL);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
