//! Save configuration with TOML, environment variable, and default sources.

use std::path::Path;
use std::{env, fs};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alignment::{
    DEFAULT_ALIGN_THRESHOLD, DEFAULT_ALLOCATION_GRANULARITY, OffsetAlignmentInfo,
};
use crate::error::SerializationError;

/// Default size threshold: tensors of 1 KiB or more go external.
pub const DEFAULT_SIZE_THRESHOLD: u64 = 1024;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

// ── SaveOptions ─────────────────────────────────────────────────────

/// The knobs of one save operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Tensors with at least this many bytes are externalized.
    pub size_threshold: u64,
    pub alignment: OffsetAlignmentInfo,
    /// Replace originals by their prepacked variants.
    pub save_prepacked_as_constants: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            alignment: OffsetAlignmentInfo::default(),
            save_prepacked_as_constants: false,
        }
    }
}

impl SaveOptions {
    pub fn validate(&self) -> Result<(), SerializationError> {
        if self.alignment.align_offset && self.alignment.allocation_granularity == 0 {
            return Err(SerializationError::InvalidOptions(
                "allocation_granularity must be > 0 when align_offset is set".into(),
            ));
        }
        Ok(())
    }
}

// ── TOML wrapper ────────────────────────────────────────────────────

/// Wrapper used for the `[save]` table in TOML files.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TomlWrapper {
    save: SaveConfig,
}

// ── SaveConfig ──────────────────────────────────────────────────────

/// Layered save configuration: defaults, then a TOML file, then
/// `EXTINIT_*` environment variables, then command-line overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub size_threshold: u64,
    pub align_offset: bool,
    pub align_threshold: u64,
    pub allocation_granularity: u64,
    pub save_prepacked_as_constants: bool,
    /// External data file name used when none is given explicitly.
    pub external_file: Option<String>,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            align_offset: false,
            align_threshold: DEFAULT_ALIGN_THRESHOLD,
            allocation_granularity: DEFAULT_ALLOCATION_GRANULARITY,
            save_prepacked_as_constants: false,
            external_file: None,
        }
    }
}

impl SaveConfig {
    // ── Constructors ────────────────────────────────────────────

    /// Load configuration from a TOML file at `path`.
    ///
    /// The file is expected to contain a `[save]` table. If the file does
    /// not exist, returns `Ok(Self::default())`.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config file not found: {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let wrapper: TomlWrapper = toml::from_str(&text)?;
        Ok(wrapper.save)
    }

    /// Serialize to a TOML string (wrapped in `[save]`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let wrapper = TomlWrapper { save: self.clone() };
        Ok(toml::to_string_pretty(&wrapper)?)
    }

    /// Build a config from `EXTINIT_*` environment variables on top of
    /// `Self::default()`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("EXTINIT_SIZE_THRESHOLD") {
            cfg.size_threshold = Self::parse_env_u64("EXTINIT_SIZE_THRESHOLD", &v)?;
        }
        if let Ok(v) = env::var("EXTINIT_ALIGN_OFFSET") {
            cfg.align_offset = Self::parse_env_bool("EXTINIT_ALIGN_OFFSET", &v)?;
        }
        if let Ok(v) = env::var("EXTINIT_ALIGN_THRESHOLD") {
            cfg.align_threshold = Self::parse_env_u64("EXTINIT_ALIGN_THRESHOLD", &v)?;
        }
        if let Ok(v) = env::var("EXTINIT_ALLOCATION_GRANULARITY") {
            cfg.allocation_granularity =
                Self::parse_env_u64("EXTINIT_ALLOCATION_GRANULARITY", &v)?;
        }
        if let Ok(v) = env::var("EXTINIT_SAVE_PREPACKED") {
            cfg.save_prepacked_as_constants = Self::parse_env_bool("EXTINIT_SAVE_PREPACKED", &v)?;
        }
        if let Ok(v) = env::var("EXTINIT_EXTERNAL_FILE") {
            if v.is_empty() {
                return Err(ConfigError::InvalidEnvVar {
                    key: "EXTINIT_EXTERNAL_FILE".into(),
                    value: v,
                });
            }
            cfg.external_file = Some(v);
        }

        Ok(cfg)
    }

    // ── Validation ──────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.align_offset && self.allocation_granularity == 0 {
            return Err(ConfigError::Validation(
                "allocation_granularity must be > 0 when align_offset is set".into(),
            ));
        }
        if self.external_file.as_deref() == Some("") {
            return Err(ConfigError::Validation("external_file must not be empty when set".into()));
        }
        Ok(())
    }

    /// Validated [`SaveOptions`] for a save operation.
    pub fn to_options(&self) -> Result<SaveOptions, ConfigError> {
        self.validate()?;
        Ok(SaveOptions {
            size_threshold: self.size_threshold,
            alignment: OffsetAlignmentInfo {
                align_offset: self.align_offset,
                align_threshold: self.align_threshold,
                allocation_granularity: self.allocation_granularity,
            },
            save_prepacked_as_constants: self.save_prepacked_as_constants,
        })
    }

    // ── Merge ───────────────────────────────────────────────────

    /// Overlay `other` on top of `self`. Fields in `other` that differ
    /// from the default take precedence.
    #[must_use]
    pub fn merge_with(&self, other: &Self) -> Self {
        let d = Self::default();
        Self {
            size_threshold: if other.size_threshold == d.size_threshold {
                self.size_threshold
            } else {
                other.size_threshold
            },
            align_offset: if other.align_offset == d.align_offset {
                self.align_offset
            } else {
                other.align_offset
            },
            align_threshold: if other.align_threshold == d.align_threshold {
                self.align_threshold
            } else {
                other.align_threshold
            },
            allocation_granularity: if other.allocation_granularity == d.allocation_granularity {
                self.allocation_granularity
            } else {
                other.allocation_granularity
            },
            save_prepacked_as_constants: if other.save_prepacked_as_constants
                == d.save_prepacked_as_constants
            {
                self.save_prepacked_as_constants
            } else {
                other.save_prepacked_as_constants
            },
            external_file: other.external_file.clone().or_else(|| self.external_file.clone()),
        }
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn parse_env_u64(key: &str, val: &str) -> Result<u64, ConfigError> {
        val.parse::<u64>().map_err(|_| ConfigError::InvalidEnvVar {
            key: key.to_string(),
            value: val.to_string(),
        })
    }

    fn parse_env_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() }),
        }
    }
}
