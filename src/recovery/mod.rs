//! Best-effort reconstruction of a raw field from its fragment set.
//!
//! ## Overlap policy
//!
//! Records are replayed in store iteration order (insertion order, see
//! [`crate::metadata`]).  Each output position takes the byte of the first
//! record that covers it; later records never overwrite a covered position.
//!
//! ## Failure classes
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | metadata and fallback both absent | `MissingMetadata`, fatal |
//! | unknown transform in a chain | `UnknownTransform`, fatal |
//! | record ends past [`MAX_OUTPUT_LEN`] | `InvalidRecord`, fatal |
//! | fragment file missing | skipped, counted, coverage drops |
//! | fragment checksum mismatch | skipped, counted, coverage drops |
//!
//! Fatal errors abort before the output file is touched.

pub mod reconstruct;

pub use reconstruct::{rebuild, reconstruct, CoverageMap, Rebuilt};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::{MetadataError, DEFAULT_AUTO_METADATA};
use crate::transform::TransformError;

/// Default fragments directory.
pub const DEFAULT_FRAGMENTS_DIR: &str = "extracted";
/// Default metadata path.
pub const DEFAULT_METADATA: &str = "extracted/metadata.json";
/// Default output path.
pub const DEFAULT_OUTPUT: &str = "recovered_field.raw";
/// Largest output a store may describe (1 GiB).
pub const MAX_OUTPUT_LEN: usize = 1 << 30;

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("Metadata not found at {} (fallback: {})", .primary.display(), fallback_label(.fallback))]
    MissingMetadata { primary: PathBuf, fallback: Option<PathBuf> },
    #[error("Fragment '{fragment}': {source}")]
    Transform { fragment: String, #[source] source: TransformError },
    #[error("Fragment '{fragment}': offset {offset} + {extent} bytes exceeds the {} byte output limit", MAX_OUTPUT_LEN)]
    InvalidRecord { fragment: String, offset: usize, extent: usize },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn fallback_label(fallback: &Option<PathBuf>) -> String {
    fallback
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".into())
}

// ── ReconstructOptions ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    pub fragments_dir:     PathBuf,
    pub metadata:          PathBuf,
    /// Consulted only when `metadata` does not exist.
    pub fallback_metadata: Option<PathBuf>,
    pub output:            PathBuf,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            fragments_dir:     PathBuf::from(DEFAULT_FRAGMENTS_DIR),
            metadata:          PathBuf::from(DEFAULT_METADATA),
            fallback_metadata: Some(PathBuf::from(DEFAULT_AUTO_METADATA)),
            output:            PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl ReconstructOptions {
    /// The metadata path to read: primary if present, else the fallback if
    /// present.  The flag is `true` when the fallback was chosen.
    pub fn resolve_metadata(&self) -> Result<(PathBuf, bool), ReconstructError> {
        if self.metadata.exists() {
            return Ok((self.metadata.clone(), false));
        }
        match &self.fallback_metadata {
            Some(fb) if fb.exists() => Ok((fb.clone(), true)),
            _ => Err(ReconstructError::MissingMetadata {
                primary:  self.metadata.clone(),
                fallback: self.fallback_metadata.clone(),
            }),
        }
    }
}

// ── RecoveryReport ────────────────────────────────────────────────────────────

/// Outcome of one reconstruction run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    /// Records in the store.
    pub records:            usize,
    /// Fragments read and replayed.
    pub restored_fragments: usize,
    /// Records whose fragment file was absent.
    pub missing_fragments:  usize,
    /// Records whose fragment file failed its checksum.
    pub corrupt_fragments:  usize,
    pub covered_bytes:      usize,
    pub total_bytes:        usize,
    /// Metadata file actually read.
    pub metadata_path:      PathBuf,
    pub used_fallback:      bool,
    pub output:             PathBuf,
}

impl RecoveryReport {
    /// `covered / total`; an empty buffer counts as fully covered.
    pub fn coverage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.covered_bytes as f64 / self.total_bytes as f64
    }

    pub fn summary(&self) -> String {
        format!(
            "Recovered raw → {} (coverage {}/{}, {:.2}%; {} restored, {} missing, {} corrupt)",
            self.output.display(),
            self.covered_bytes,
            self.total_bytes,
            self.coverage() * 100.0,
            self.restored_fragments,
            self.missing_fragments,
            self.corrupt_fragments,
        )
    }
}
