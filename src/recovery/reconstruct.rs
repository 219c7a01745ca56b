//! Reconstruction engine: replay fragments into a fresh buffer.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{ReconstructError, ReconstructOptions, RecoveryReport, MAX_OUTPUT_LEN};
use crate::layout::wave_dir_name;
use crate::metadata::{MetadataRecord, MetadataStore};

// ── CoverageMap ───────────────────────────────────────────────────────────────

/// One flag per output position; set once the position has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMap {
    filled:  Vec<bool>,
    covered: usize,
}

impl CoverageMap {
    pub fn new(len: usize) -> Self {
        Self { filled: vec![false; len], covered: 0 }
    }

    pub fn len(&self) -> usize {
        self.filled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled.is_empty()
    }

    pub fn is_covered(&self, pos: usize) -> bool {
        self.filled.get(pos).copied().unwrap_or(false)
    }

    /// Claim `pos`.  Returns `false` if it was already covered or out of range.
    pub fn claim(&mut self, pos: usize) -> bool {
        match self.filled.get_mut(pos) {
            Some(slot) if !*slot => {
                *slot = true;
                self.covered += 1;
                true
            }
            _ => false,
        }
    }

    pub fn covered(&self) -> usize {
        self.covered
    }
}

// ── Rebuild ───────────────────────────────────────────────────────────────────

/// In-memory result of [`rebuild`].
#[derive(Debug, Clone)]
pub struct Rebuilt {
    pub buffer:   Vec<u8>,
    pub coverage: CoverageMap,
    pub restored: usize,
    pub missing:  usize,
    pub corrupt:  usize,
}

/// End position of `record`, or `InvalidRecord` when it lies past
/// [`MAX_OUTPUT_LEN`].  Zero-extent records end at 0.
fn record_end(name: &str, record: &MetadataRecord, fragment_size: usize) -> Result<usize, ReconstructError> {
    let extent = record.extent(fragment_size);
    if extent == 0 {
        return Ok(0);
    }
    record
        .start()
        .checked_add(extent)
        .filter(|&end| end <= MAX_OUTPUT_LEN)
        .ok_or_else(|| ReconstructError::InvalidRecord {
            fragment: name.to_owned(),
            offset:   record.start(),
            extent,
        })
}

/// Output length: furthest end claimed by any record.
pub fn output_len(store: &MetadataStore, fragment_size: usize) -> Result<usize, ReconstructError> {
    store
        .iter()
        .map(|(name, r)| record_end(name, r, fragment_size))
        .try_fold(0, |acc, end| Ok(acc.max(end?)))
}

/// Replay every record of `store` against the files under `fragments_dir`.
pub fn rebuild(
    fragments_dir: &Path,
    store:         &MetadataStore,
    fragment_size: usize,
) -> Result<Rebuilt, ReconstructError> {
    let len = output_len(store, fragment_size)?;
    let mut buffer = vec![0u8; len];
    let mut coverage = CoverageMap::new(len);
    let (mut restored, mut missing, mut corrupt) = (0usize, 0usize, 0usize);

    for (name, record) in store.iter() {
        let path = fragment_path(fragments_dir, name, record);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(fragment = name, path = %path.display(), "fragment missing, skipped");
                missing += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let chain = record.chain().map_err(|source| ReconstructError::Transform {
            fragment: name.to_owned(),
            source,
        })?;

        if let Some(expected) = record.checksum {
            let actual = crc32fast::hash(&data);
            if actual != expected {
                warn!(fragment = name, expected, actual, "fragment checksum mismatch, skipped");
                corrupt += 1;
                continue;
            }
        }

        let original = chain.invert(&data);
        let start = record.start();
        for (pos, b) in (start..len).zip(original) {
            if coverage.claim(pos) {
                buffer[pos] = b;
            }
        }
        restored += 1;
    }

    Ok(Rebuilt { buffer, coverage, restored, missing, corrupt })
}

/// Full run: resolve metadata, rebuild, write `opts.output`.
pub fn reconstruct(opts: &ReconstructOptions, fragment_size: usize) -> Result<RecoveryReport, ReconstructError> {
    let (meta_path, used_fallback) = opts.resolve_metadata()?;
    if used_fallback {
        warn!(primary = %opts.metadata.display(), fallback = %meta_path.display(), "metadata not found, using fallback");
    }

    let store = MetadataStore::load(&meta_path)?;
    info!(records = store.len(), metadata = %meta_path.display(), "reconstructing");

    let rebuilt = rebuild(&opts.fragments_dir, &store, fragment_size)?;

    if let Some(parent) = opts.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&opts.output, &rebuilt.buffer)?;

    let report = RecoveryReport {
        records:            store.len(),
        restored_fragments: rebuilt.restored,
        missing_fragments:  rebuilt.missing,
        corrupt_fragments:  rebuilt.corrupt,
        covered_bytes:      rebuilt.coverage.covered(),
        total_bytes:        rebuilt.coverage.len(),
        metadata_path:      meta_path,
        used_fallback,
        output:             opts.output.clone(),
    };
    info!("{}", report.summary());
    Ok(report)
}

/// `<fragments_dir>/wave_<w>/<name>`; records without a wave fall back to
/// `<fragments_dir>/<name>`.
fn fragment_path(fragments_dir: &Path, name: &str, record: &MetadataRecord) -> std::path::PathBuf {
    match record.wave {
        Some(w) => fragments_dir.join(wave_dir_name(w)).join(name),
        None    => fragments_dir.join(name),
    }
}
