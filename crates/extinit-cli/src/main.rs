//! extinit: externalized-initializer model saver
//!
//! Rewrites a JSON graph definition so that every initializer of at least
//! `--threshold` bytes lives in a single external data file, optionally
//! aligned to an allocation granularity, and checks the result.
//!
//! # Usage
//!
//! ```bash
//! # Move tensors of 1 KiB or more to model.bin next to the output
//! extinit save --input model.json --output out/model.json --external-data model.bin
//!
//! # Align large tensors to 64 KiB boundaries
//! extinit save -i model.json -o out/model.json --align --granularity 65536
//!
//! # Substitute prepacked constants from a manifest
//! extinit save -i model.json -o opt.json --prepack prepacked.json --save-prepacked
//!
//! # Check the rewritten model against the original, then delete it
//! extinit verify --original model.json --rewritten out/model.json --cleanup
//!
//! # Show where each initializer's bytes live
//! extinit inspect --input out/model.json --json
//! ```
//!
//! Settings come from defaults, then `--config FILE` (`[save]` table), then
//! `EXTINIT_*` environment variables, then command flags.

use anyhow::Result;
use clap::Parser;
use extinit_cli::{Cli, init_logging};
use tracing::error;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    if let Err(e) = cli.execute() {
        error!("Command failed: {e}");
        for cause in e.chain().skip(1) {
            error!("  Caused by: {cause}");
        }
        std::process::exit(1);
    }
    Ok(())
}
