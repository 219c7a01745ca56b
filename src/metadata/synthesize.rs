//! Metadata synthesis from fragment file names alone.
//!
//! Used when a fragments directory exists without its metadata store.  The
//! naming convention carries wave, pulse, offset and transform, so a full
//! store can usually be rebuilt.  Files that do not follow the convention
//! get a best-effort record:
//!
//! | Field | Source |
//! |-------|--------|
//! | `wave` | parent directory `wave_N`, else `null` |
//! | `offset` | second-to-last `_`-separated name segment, else `null` |
//! | `transform_chain` | `["identity"]` |
//!
//! Seed, Hamming distance and detection score cannot be recovered and are
//! left out.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{MetadataError, MetadataRecord, MetadataStore};
use crate::layout::{parse_wave_dir, FragmentKey, FRAGMENT_EXT};

/// Where synthesized metadata lands by default; reconstruction consults the
/// same path as its fallback.
pub const DEFAULT_AUTO_METADATA: &str = "pipeline_output/metadata.auto.json";

/// Build a store from every `*.bin` file under `fragments_dir`, in sorted
/// path order.
pub fn synthesize(fragments_dir: &Path) -> Result<MetadataStore, MetadataError> {
    let mut files = Vec::new();
    collect_fragments(fragments_dir, &mut files)?;
    files.sort();

    let mut store = MetadataStore::new();
    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let bytes = fs::read(&path)?;
        let record = infer_record(&path, name, &bytes);
        debug!(fragment = name, wave = ?record.wave, offset = ?record.offset, "synthesized record");
        store.insert(name.to_owned(), record);
    }
    Ok(store)
}

/// [`synthesize`] and save the result to `out_meta`.
pub fn synthesize_to(fragments_dir: &Path, out_meta: &Path) -> Result<MetadataStore, MetadataError> {
    info!(dir = %fragments_dir.display(), out = %out_meta.display(), "synthesizing metadata");
    let store = synthesize(fragments_dir)?;
    store.save(out_meta)?;
    info!(records = store.len(), "metadata synthesized");
    Ok(store)
}

fn infer_record(path: &Path, name: &str, bytes: &[u8]) -> MetadataRecord {
    let checksum = Some(crc32fast::hash(bytes));
    let length = Some(bytes.len());

    if let Ok(key) = FragmentKey::parse(name) {
        return MetadataRecord {
            wave:             Some(key.wave),
            seed:             None,
            offset:           Some(key.offset),
            pulse_index:      Some(key.pulse),
            transform_chain:  vec![key.transform.name().to_owned()],
            hamming_distance: None,
            detection_score:  None,
            length,
            checksum,
        };
    }

    let wave = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .and_then(parse_wave_dir);

    let offset = name
        .strip_suffix(FRAGMENT_EXT)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(name)
        .rsplit('_')
        .nth(1)
        .and_then(|s| s.parse().ok());

    MetadataRecord {
        wave,
        seed:             None,
        offset,
        pulse_index:      None,
        transform_chain:  vec!["identity".to_owned()],
        hamming_distance: None,
        detection_score:  None,
        length,
        checksum,
    }
}

fn collect_fragments(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_fragments(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(FRAGMENT_EXT) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventional_names_are_fully_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let wave = dir.path().join("wave_1");
        fs::create_dir_all(&wave).unwrap();
        fs::write(wave.join("w1_p2_144_xor.bin"), [0xFFu8; 128]).unwrap();

        let store = synthesize(dir.path()).unwrap();
        let rec = store.get("w1_p2_144_xor.bin").unwrap();
        assert_eq!(rec.wave, Some(1));
        assert_eq!(rec.pulse_index, Some(2));
        assert_eq!(rec.offset, Some(144));
        assert_eq!(rec.transform_chain, vec!["xor"]);
        assert_eq!(rec.length, Some(128));
        assert!(rec.seed.is_none());
    }

    #[test]
    fn foreign_names_fall_back_to_partial_inference() {
        let dir = tempfile::tempdir().unwrap();
        let wave = dir.path().join("wave_3");
        fs::create_dir_all(&wave).unwrap();
        fs::write(wave.join("carved_400_blob.bin"), b"abc").unwrap();
        fs::write(dir.path().join("loose.bin"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let store = synthesize(dir.path()).unwrap();
        assert_eq!(store.len(), 2);

        let carved = store.get("carved_400_blob.bin").unwrap();
        assert_eq!(carved.wave, Some(3));
        assert_eq!(carved.offset, Some(400));
        assert_eq!(carved.transform_chain, vec!["identity"]);

        let loose = store.get("loose.bin").unwrap();
        assert_eq!(loose.wave, None);
        assert_eq!(loose.offset, None);
    }

    #[test]
    fn synthesize_to_persists() {
        let dir = tempfile::tempdir().unwrap();
        let frags = dir.path().join("extracted/wave_0");
        fs::create_dir_all(&frags).unwrap();
        fs::write(frags.join("w0_p0_0_identity.bin"), b"seed").unwrap();

        let out = dir.path().join("pipeline_output/metadata.auto.json");
        let store = synthesize_to(&dir.path().join("extracted"), &out).unwrap();
        assert_eq!(MetadataStore::load(&out).unwrap(), store);
    }
}
