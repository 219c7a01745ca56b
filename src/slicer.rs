//! Fragment slicer: cut a raw buffer into overlapping wave/pulse fragments.
//!
//! # Output
//! For every wave, every pulse and every registered transform, one file is
//! written under `<output_dir>/wave_<w>/` (see [`crate::layout`] for names)
//! and one [`MetadataRecord`] is merged into the store at
//! `<output_dir>/metadata.json`.
//!
//! # Crash resilience
//! The store is flushed every `flush_every` fragments and once at the end.
//! A flush only ever happens after the files it references are on disk, so
//! an interrupted run leaves a store that never names a missing fragment.
//!
//! # Preconditions
//! One extraction run per output directory at a time.  Two concurrent runs
//! against the same directory race on the store file and are not detected.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::{wave_dir_name, FragmentKey, Layout, LayoutError};
use crate::metadata::{MetadataError, MetadataRecord, MetadataStore};
use crate::seed::fingerprint;
use crate::transform::{detection_score, hamming_distance, Transform, TransformChain, REGISTRY};

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "extracted";
/// Store file name inside the output directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Raw file not found: {}", .0.display())]
    MissingRawFile(PathBuf),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub output_dir:    PathBuf,
    /// Defaults to `<output_dir>/metadata.json`.
    pub metadata_path: Option<PathBuf>,
    /// Flush the store after this many fragments.  `0` flushes only at the end.
    pub flush_every:   usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            output_dir:    PathBuf::from(DEFAULT_OUTPUT_DIR),
            metadata_path: None,
            flush_every:   1,
        }
    }
}

impl ExtractOptions {
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(METADATA_FILE_NAME))
    }
}

// ── Fragment ─────────────────────────────────────────────────────────────────

/// One fragment definition with its transformed bytes.
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    pub key:      FragmentKey,
    pub seed:     String,
    pub original: &'a [u8],
    pub data:     Vec<u8>,
}

impl Fragment<'_> {
    pub fn file_name(&self) -> String {
        self.key.file_name()
    }

    pub fn record(&self, layout: &Layout) -> MetadataRecord {
        let hd = hamming_distance(self.original, &self.data);
        MetadataRecord {
            wave:             Some(self.key.wave),
            seed:             Some(self.seed.clone()),
            offset:           Some(self.key.offset),
            pulse_index:      Some(self.key.pulse),
            transform_chain:  TransformChain::from(self.key.transform).names(),
            hamming_distance: Some(hd),
            detection_score:  Some(detection_score(hd, layout.fragment_size)),
            length:           Some(self.data.len()),
            checksum:         Some(crc32fast::hash(&self.data)),
        }
    }
}

/// Every fragment of `buf` in emission order: wave, then pulse, then transform.
pub fn fragments<'a>(layout: &'a Layout, buf: &'a [u8]) -> impl Iterator<Item = Fragment<'a>> + 'a {
    (0..layout.waves).flat_map(move |wave| {
        let seed = fingerprint(layout.seed_bytes(buf, wave));
        (0..layout.pulses_per_wave).flat_map(move |pulse| {
            let original = layout.fragment_bytes(buf, wave, pulse);
            let seed = seed.clone();
            REGISTRY.into_iter().map(move |t: Transform| Fragment {
                key:  FragmentKey::new(layout, wave, pulse, t),
                seed: seed.clone(),
                original,
                data: t.apply(original),
            })
        })
    })
}

// ── Report ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub raw_len:           usize,
    pub waves:             usize,
    pub fragments_written: usize,
    /// Records in the store after merging this run.
    pub store_records:     usize,
    pub metadata_path:     PathBuf,
}

impl ExtractReport {
    pub fn summary(&self) -> String {
        format!(
            "extracted {} fragment(s) from {} wave(s) of a {}-byte field; store holds {} record(s) at {}",
            self.fragments_written,
            self.waves,
            self.raw_len,
            self.store_records,
            self.metadata_path.display(),
        )
    }
}

// ── Slicer ───────────────────────────────────────────────────────────────────

pub struct Slicer {
    layout: Layout,
    opts:   ExtractOptions,
}

impl Slicer {
    pub fn new(layout: Layout, opts: ExtractOptions) -> Result<Self, ExtractError> {
        layout.validate()?;
        Ok(Self { layout, opts })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.opts
    }

    /// Extract from the raw file at `raw`.
    ///
    /// Fails with [`ExtractError::MissingRawFile`] when it does not exist.
    pub fn extract_file(&self, raw: &Path) -> Result<ExtractReport, ExtractError> {
        let buf = match fs::read(raw) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ExtractError::MissingRawFile(raw.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        info!(raw = %raw.display(), bytes = buf.len(), "extracting fragments");
        self.extract(&buf)
    }

    /// Like [`Slicer::extract_file`], but a missing raw file is reported and
    /// skipped rather than treated as an error.
    pub fn extract_if_present(&self, raw: &Path) -> Result<Option<ExtractReport>, ExtractError> {
        match self.extract_file(raw) {
            Ok(report) => Ok(Some(report)),
            Err(ExtractError::MissingRawFile(p)) => {
                warn!(raw = %p.display(), "raw file not found, skipping extract");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Merge the fragments of `buf` into the on-disk store.
    pub fn extract(&self, buf: &[u8]) -> Result<ExtractReport, ExtractError> {
        let meta_path = self.opts.metadata_path();
        let mut store = MetadataStore::load(&meta_path)?;
        self.extract_into(buf, &mut store)
    }

    /// Write every fragment of `buf` and merge its records into `store`,
    /// flushing `store` to the metadata path at each checkpoint.
    pub fn extract_into(&self, buf: &[u8], store: &mut MetadataStore) -> Result<ExtractReport, ExtractError> {
        let meta_path = self.opts.metadata_path();
        let mut written = 0usize;
        let mut pending = 0usize;

        for wave in 0..self.layout.waves {
            fs::create_dir_all(self.opts.output_dir.join(wave_dir_name(wave)))?;
        }

        for frag in fragments(&self.layout, buf) {
            let path = frag.key.path_in(&self.opts.output_dir);
            fs::write(&path, &frag.data)?;

            let record = frag.record(&self.layout);
            debug!(
                fragment = %frag.file_name(),
                seed = %frag.seed,
                len = frag.data.len(),
                hamming = ?record.hamming_distance,
                "fragment written"
            );
            store.insert(frag.file_name(), record);
            written += 1;
            pending += 1;

            if self.opts.flush_every > 0 && pending >= self.opts.flush_every {
                store.save(&meta_path)?;
                pending = 0;
            }
        }
        store.save(&meta_path)?;

        let report = ExtractReport {
            raw_len:           buf.len(),
            waves:             self.layout.waves,
            fragments_written: written,
            store_records:     store.len(),
            metadata_path:     meta_path,
        };
        info!("{}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slicer(dir: &Path, flush_every: usize) -> Slicer {
        let opts = ExtractOptions {
            output_dir: dir.to_owned(),
            metadata_path: None,
            flush_every,
        };
        Slicer::new(Layout::default(), opts).unwrap()
    }

    #[test]
    fn fragment_definitions_cover_the_grid() {
        let layout = Layout::default();
        let buf: Vec<u8> = (0..640u32).map(|i| i as u8).collect();
        let all: Vec<_> = fragments(&layout, &buf).collect();
        assert_eq!(all.len(), 150);

        let first = &all[0];
        assert_eq!(first.key.transform, Transform::Identity);
        assert_eq!(first.original, &buf[0..128]);
        assert_eq!(first.seed, fingerprint(&buf[0..16]));

        let last = all.last().unwrap();
        assert_eq!(last.key.offset, 584);
        assert_eq!(last.key.transform, Transform::Xor);
        assert_eq!(last.data.len(), 56);
    }

    #[test]
    fn records_score_by_transform() {
        let layout = Layout::default();
        let buf = vec![0x5Au8; 640];
        for frag in fragments(&layout, &buf).take(3) {
            let rec = frag.record(&layout);
            match frag.key.transform {
                Transform::Identity => {
                    assert_eq!(rec.hamming_distance, Some(0));
                    assert_eq!(rec.detection_score, Some(1.0));
                }
                _ => {
                    assert_eq!(rec.hamming_distance, Some(128));
                    assert_eq!(rec.detection_score, Some(0.0));
                }
            }
        }
    }

    #[test]
    fn missing_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = slicer(dir.path(), 1);
        let missing = dir.path().join("field.raw");
        assert!(matches!(s.extract_file(&missing), Err(ExtractError::MissingRawFile(_))));
        assert_eq!(s.extract_if_present(&missing).unwrap(), None);
        assert!(!dir.path().join(METADATA_FILE_NAME).exists());
    }

    #[test]
    fn batched_flush_still_persists_everything() {
        let dir = tempfile::tempdir().unwrap();
        let s = slicer(dir.path(), 0);
        let report = s.extract(&[1u8; 640]).unwrap();
        assert_eq!(report.fragments_written, 150);
        let store = MetadataStore::load(&report.metadata_path).unwrap();
        assert_eq!(store.len(), 150);
    }

    #[test]
    fn rerun_merges_into_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let s = slicer(dir.path(), 1);
        let mut store = MetadataStore::new();
        let foreign: MetadataRecord = serde_json::from_str(r#"{ "wave": null, "offset": 0 }"#).unwrap();
        store.insert("foreign.bin".into(), foreign);
        store.save(&s.options().metadata_path()).unwrap();

        s.extract(&[2u8; 640]).unwrap();
        let report = s.extract(&[2u8; 640]).unwrap();
        assert_eq!(report.store_records, 151);

        let merged = MetadataStore::load(&report.metadata_path).unwrap();
        assert_eq!(merged.iter().next().unwrap().0, "foreign.bin");
    }
}
