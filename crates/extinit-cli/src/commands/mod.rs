//! CLI command implementations

pub mod inspect;
pub mod save;
pub mod verify;

pub use inspect::InspectCommand;
pub use save::SaveCommand;
pub use verify::VerifyCommand;

use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use extinit_save::SaveConfig;

/// Layout flags shared by `save` and `verify`. Unset flags keep the
/// configured value.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutArgs {
    /// Externalize tensors of at least this many bytes
    #[arg(short, long, value_name = "BYTES")]
    pub threshold: Option<u64>,

    /// Align external offsets of large tensors
    #[arg(long)]
    pub align: bool,

    /// Disable alignment enabled by the config file or environment
    #[arg(long, conflicts_with = "align")]
    pub no_align: bool,

    /// Only tensors of at least this many bytes are aligned
    #[arg(long, value_name = "BYTES")]
    pub align_threshold: Option<u64>,

    /// Alignment unit for external offsets
    #[arg(long, value_name = "BYTES")]
    pub granularity: Option<u64>,
}

impl LayoutArgs {
    pub fn apply(&self, config: &SaveConfig) -> SaveConfig {
        let mut out = config.clone();
        if let Some(threshold) = self.threshold {
            out.size_threshold = threshold;
        }
        if self.align {
            out.align_offset = true;
        } else if self.no_align {
            out.align_offset = false;
        }
        if let Some(threshold) = self.align_threshold {
            out.align_threshold = threshold;
        }
        if let Some(granularity) = self.granularity {
            out.allocation_granularity = granularity;
        }
        out
    }
}

/// External data name used when neither a flag nor the config names one:
/// `<definition file name>.data`.
pub fn default_external_name(definition: &Path) -> Result<String> {
    let Some(name) = definition.file_name().and_then(|n| n.to_str()) else {
        bail!("Cannot derive an external data name from {}", definition.display());
    };
    Ok(format!("{name}.data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_keep_config() {
        let config = SaveConfig { size_threshold: 7, ..Default::default() };
        assert_eq!(LayoutArgs::default().apply(&config), config);
    }

    #[test]
    fn set_flags_override() {
        let args = LayoutArgs {
            threshold: Some(0),
            align: true,
            no_align: false,
            align_threshold: Some(0),
            granularity: Some(4096),
        };
        let out = args.apply(&SaveConfig::default());
        assert_eq!(out.size_threshold, 0);
        assert!(out.align_offset);
        assert_eq!(out.align_threshold, 0);
        assert_eq!(out.allocation_granularity, 4096);
        assert!(!out.save_prepacked_as_constants);
    }

    #[test]
    fn no_align_overrides_configured_alignment() {
        let config = SaveConfig { align_offset: true, ..Default::default() };
        let args = LayoutArgs { no_align: true, ..Default::default() };
        assert!(!args.apply(&config).align_offset);
        assert!(LayoutArgs::default().apply(&config).align_offset);
    }

    #[test]
    fn default_external_name_appends_data() {
        assert_eq!(default_external_name(Path::new("dir/m.json")).unwrap(), "m.json.data");
        assert!(default_external_name(Path::new("..")).is_err());
    }
}
