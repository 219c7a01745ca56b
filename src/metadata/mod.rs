//! Metadata store: one record per emitted fragment file, keyed by file name.
//!
//! # Ordering
//! The store is an insertion-ordered map.  Reconstruction resolves overlaps
//! first-writer-wins in iteration order, so that order is part of the format:
//! it is preserved on save, restored on load, and re-inserting an existing
//! name replaces the record without moving it.
//!
//! # Persistence
//! The whole store is written as one pretty-printed JSON object.  Each save
//! overwrites the previous snapshot (via a sibling temporary file and a
//! rename).  A failed save removes the temporary file and leaves the
//! previous snapshot intact.  Concurrent writers are not supported.

pub mod synthesize;

pub use synthesize::{synthesize, synthesize_to, DEFAULT_AUTO_METADATA};

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::transform::{Transform, TransformChain, TransformError};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error on metadata file: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ── MetadataRecord ───────────────────────────────────────────────────────────

/// Description of one fragment file.
///
/// Extraction fills every field.  Stores synthesized from file names (or
/// written by older tooling) may omit anything except the transform chain,
/// which defaults to `["identity"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Wave index; `null` when it could not be inferred.
    #[serde(default)]
    pub wave: Option<usize>,

    /// Seed fingerprint of the wave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,

    /// Byte offset of the fragment window in the raw buffer.
    #[serde(default)]
    pub offset: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_index: Option<usize>,

    /// Transform names in application order, outermost last.
    #[serde(default = "default_chain")]
    pub transform_chain: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hamming_distance: Option<u32>,

    /// `1 - hamming_distance / fragment_size`, 4 decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_score: Option<f64>,

    /// Bytes actually written; below `fragment_size` when clipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,

    /// CRC-32 of the fragment file's bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
}

fn default_chain() -> Vec<String> {
    vec![Transform::Identity.name().to_owned()]
}

impl MetadataRecord {
    /// Parse `transform_chain` against the closed registry.
    pub fn chain(&self) -> Result<TransformChain, TransformError> {
        TransformChain::parse(&self.transform_chain)
    }

    /// Offset used for placement; a missing offset places the fragment at 0.
    pub fn start(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Byte span this record claims in the output buffer.
    pub fn extent(&self, fragment_size: usize) -> usize {
        self.length.unwrap_or(fragment_size)
    }
}

// ── MetadataStore ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    entries: Vec<(String, MetadataRecord)>,
    index:   HashMap<String, usize>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store at `path`.  A missing file is the first-run state and
    /// yields an empty store.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the snapshot at `path` with the full store.
    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let written = fs::write(&tmp, self.to_bytes()?).and_then(|()| fs::rename(&tmp, path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(written?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetadataError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Insert or replace.  A replaced record keeps its original position.
    /// Returns the previous record, if any.
    pub fn insert(&mut self, name: String, record: MetadataRecord) -> Option<MetadataRecord> {
        match self.index.get(&name) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, record)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, record));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetadataRecord> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataRecord)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MetadataStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, record) in &self.entries {
            map.serialize_entry(name, record)?;
        }
        map.end()
    }
}

struct StoreVisitor;

impl<'de> Visitor<'de> for StoreVisitor {
    type Value = MetadataStore;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object mapping fragment file names to records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut store = MetadataStore::new();
        while let Some((name, record)) = access.next_entry::<String, MetadataRecord>()? {
            store.insert(name, record);
        }
        Ok(store)
    }
}

impl<'de> Deserialize<'de> for MetadataStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StoreVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: usize) -> MetadataRecord {
        MetadataRecord {
            wave:             Some(0),
            seed:             Some("0123456789ab".into()),
            offset:           Some(offset),
            pulse_index:      Some(0),
            transform_chain:  vec!["identity".into()],
            hamming_distance: Some(0),
            detection_score:  Some(1.0),
            length:           Some(128),
            checksum:         None,
        }
    }

    #[test]
    fn insertion_order_survives_a_roundtrip() {
        let mut store = MetadataStore::new();
        for name in ["zeta.bin", "alpha.bin", "mid.bin"] {
            store.insert(name.into(), record(0));
        }
        let back = MetadataStore::from_bytes(&store.to_bytes().unwrap()).unwrap();
        let names: Vec<_> = back.iter().map(|(n, _)| n.to_owned()).collect();
        assert_eq!(names, vec!["zeta.bin", "alpha.bin", "mid.bin"]);
    }

    #[test]
    fn reinsert_replaces_in_place() {
        let mut store = MetadataStore::new();
        store.insert("a".into(), record(0));
        store.insert("b".into(), record(8));
        let prev = store.insert("a".into(), record(16));
        assert_eq!(prev.unwrap().offset, Some(0));
        assert_eq!(store.len(), 2);
        let first = store.iter().next().unwrap();
        assert_eq!(first.0, "a");
        assert_eq!(first.1.offset, Some(16));
    }

    #[test]
    fn legacy_records_fill_defaults() {
        let json = br#"{ "w0_p0_0_identity.bin": { "wave": null, "offset": null } }"#;
        let store = MetadataStore::from_bytes(json).unwrap();
        let rec = store.get("w0_p0_0_identity.bin").unwrap();
        assert_eq!(rec.wave, None);
        assert_eq!(rec.start(), 0);
        assert_eq!(rec.transform_chain, vec!["identity"]);
        assert_eq!(rec.extent(128), 128);
        assert!(rec.seed.is_none());
    }

    #[test]
    fn wire_format_matches_field_names() {
        let mut store = MetadataStore::new();
        store.insert("w0_p0_0_identity.bin".into(), record(0));
        let v: serde_json::Value = serde_json::from_slice(&store.to_bytes().unwrap()).unwrap();
        let rec = &v["w0_p0_0_identity.bin"];
        for field in ["wave", "seed", "offset", "pulse_index", "transform_chain",
                      "hamming_distance", "detection_score", "length"] {
            assert!(rec.get(field).is_some(), "missing {field}");
        }
        assert!(rec.get("checksum").is_none());
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::load(&dir.path().join("metadata.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/metadata.json");
        let mut store = MetadataStore::new();
        store.insert("x.bin".into(), record(24));
        store.save(&path).unwrap();
        assert_eq!(MetadataStore::load(&path).unwrap(), store);
    }

    #[test]
    fn failed_save_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new();
        store.insert("w0_p0_0_identity.bin".into(), record(0));

        // Renaming a file over a non-empty directory fails.
        let path = dir.path().join("metadata.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        assert!(matches!(store.save(&path), Err(MetadataError::Io(_))));
        assert!(!dir.path().join("metadata.json.tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn unknown_transform_surfaces_from_chain() {
        let mut rec = record(0);
        rec.transform_chain = vec!["gzip".into()];
        assert!(matches!(rec.chain(), Err(TransformError::UnknownTransform { .. })));
    }
}
