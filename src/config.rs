//! Configuration file (TOML).  Every field is optional; omitted values take
//! the built-in defaults.
//!
//! ```toml
//! [layout]
//! waves = 5
//! pulses_per_wave = 10
//! seed_size = 16
//! fragment_size = 128
//!
//! [extract]
//! output_dir = "extracted"
//! flush_every = 1
//!
//! [reconstruct]
//! fragments_dir = "extracted"
//! metadata = "extracted/metadata.json"
//! fallback_metadata = "pipeline_output/metadata.auto.json"
//! output = "recovered_field.raw"
//!
//! [encode]
//! input = "data_array.json"
//! output = "field.raw"
//! max_integer_digits = 50000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::{Layout, LayoutError};
use crate::metadata::DEFAULT_AUTO_METADATA;
use crate::raw_codec::DEFAULT_MAX_INTEGER_DIGITS;
use crate::recovery::{ReconstructOptions, DEFAULT_FRAGMENTS_DIR, DEFAULT_METADATA, DEFAULT_OUTPUT};
use crate::slicer::{ExtractOptions, DEFAULT_OUTPUT_DIR};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {}: {source}", .path.display())]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout:      Layout,
    pub extract:     ExtractConfig,
    pub reconstruct: ReconstructConfig,
    pub encode:      EncodeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub output_dir:  PathBuf,
    pub metadata:    Option<PathBuf>,
    pub flush_every: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            output_dir:  PathBuf::from(DEFAULT_OUTPUT_DIR),
            metadata:    None,
            flush_every: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructConfig {
    pub fragments_dir:     PathBuf,
    pub metadata:          PathBuf,
    pub fallback_metadata: Option<PathBuf>,
    pub output:            PathBuf,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            fragments_dir:     PathBuf::from(DEFAULT_FRAGMENTS_DIR),
            metadata:          PathBuf::from(DEFAULT_METADATA),
            fallback_metadata: Some(PathBuf::from(DEFAULT_AUTO_METADATA)),
            output:            PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub input:              PathBuf,
    pub output:             PathBuf,
    pub max_integer_digits: usize,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            input:              PathBuf::from("data_array.json"),
            output:             PathBuf::from("field.raw"),
            max_integer_digits: DEFAULT_MAX_INTEGER_DIGITS,
        }
    }
}

impl Config {
    /// Defaults when `path` is `None`, otherwise the parsed file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;
        if self.encode.max_integer_digits == 0 {
            return Err(ConfigError::Invalid("encode.max_integer_digits must be > 0".into()));
        }
        Ok(())
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            output_dir:    self.extract.output_dir.clone(),
            metadata_path: self.extract.metadata.clone(),
            flush_every:   self.extract.flush_every,
        }
    }

    pub fn reconstruct_options(&self) -> ReconstructOptions {
        ReconstructOptions {
            fragments_dir:     self.reconstruct.fragments_dir.clone(),
            metadata:          self.reconstruct.metadata.clone(),
            fallback_metadata: self.reconstruct.fallback_metadata.clone(),
            output:            self.reconstruct.output.clone(),
        }
    }
}
