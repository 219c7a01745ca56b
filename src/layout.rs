//! Fragment geometry and on-disk naming.
//!
//! # Geometry
//! The raw buffer is split into `waves` windows of `fragment_size` bytes.
//! Each wave yields `pulses_per_wave` fragments; pulse `p` of wave `w` starts
//! at `w * fragment_size + p * (seed_size / 2)` and spans `fragment_size`
//! bytes, so consecutive pulses overlap.  Windows are clipped to the end of
//! the buffer.
//!
//! # Naming
//! ```text
//! <root>/wave_<w>/w<w>_p<p>_<offset>_<transform>.bin
//! ```
//! Every component is recoverable from the path alone; see
//! [`FragmentKey::parse`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::Transform;

pub const DEFAULT_WAVES:           usize = 5;
pub const DEFAULT_PULSES_PER_WAVE: usize = 10;
pub const DEFAULT_SEED_SIZE:       usize = 16;
pub const DEFAULT_FRAGMENT_SIZE:   usize = 128;

/// File extension of every fragment file.
pub const FRAGMENT_EXT: &str = "bin";
/// Prefix of per-wave subdirectories.
pub const WAVE_DIR_PREFIX: &str = "wave_";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Invalid layout: {0}")]
    Invalid(String),
    #[error("Malformed fragment file name '{name}': {reason}")]
    BadFragmentName { name: String, reason: String },
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub waves:           usize,
    pub pulses_per_wave: usize,
    pub seed_size:       usize,
    pub fragment_size:   usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            waves:           DEFAULT_WAVES,
            pulses_per_wave: DEFAULT_PULSES_PER_WAVE,
            seed_size:       DEFAULT_SEED_SIZE,
            fragment_size:   DEFAULT_FRAGMENT_SIZE,
        }
    }
}

impl Layout {
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.waves == 0 {
            return Err(LayoutError::Invalid("waves must be > 0".into()));
        }
        if self.pulses_per_wave == 0 {
            return Err(LayoutError::Invalid("pulses_per_wave must be > 0".into()));
        }
        if self.seed_size < 2 {
            return Err(LayoutError::Invalid("seed_size must be >= 2".into()));
        }
        if self.fragment_size == 0 {
            return Err(LayoutError::Invalid("fragment_size must be > 0".into()));
        }
        Ok(())
    }

    /// Distance between consecutive pulse offsets.
    #[inline]
    pub fn pulse_step(&self) -> usize {
        self.seed_size / 2
    }

    /// Start of the wave's window (and of its seed bytes).
    #[inline]
    pub fn wave_offset(&self, wave: usize) -> usize {
        wave * self.fragment_size
    }

    #[inline]
    pub fn fragment_offset(&self, wave: usize, pulse: usize) -> usize {
        self.wave_offset(wave) + pulse * self.pulse_step()
    }

    /// `buf[start..start+len]`, clipped to the buffer bounds (possibly empty).
    pub fn window<'a>(&self, buf: &'a [u8], start: usize, len: usize) -> &'a [u8] {
        let start = start.min(buf.len());
        let end = start.saturating_add(len).min(buf.len());
        &buf[start..end]
    }

    /// Seed bytes of `wave`, clipped like any other window.
    pub fn seed_bytes<'a>(&self, buf: &'a [u8], wave: usize) -> &'a [u8] {
        self.window(buf, self.wave_offset(wave), self.seed_size)
    }

    /// Fragment bytes for `(wave, pulse)`.
    pub fn fragment_bytes<'a>(&self, buf: &'a [u8], wave: usize, pulse: usize) -> &'a [u8] {
        self.window(buf, self.fragment_offset(wave, pulse), self.fragment_size)
    }

    /// Number of fragment files one extraction run writes.
    pub fn fragment_count(&self, transforms: usize) -> usize {
        self.waves * self.pulses_per_wave * transforms
    }
}

// ── FragmentKey ──────────────────────────────────────────────────────────────

/// Identity of one on-disk fragment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub wave:      usize,
    pub pulse:     usize,
    pub offset:    usize,
    pub transform: Transform,
}

impl FragmentKey {
    pub fn new(layout: &Layout, wave: usize, pulse: usize, transform: Transform) -> Self {
        Self { wave, pulse, offset: layout.fragment_offset(wave, pulse), transform }
    }

    pub fn file_name(&self) -> String {
        format!(
            "w{}_p{}_{}_{}.{}",
            self.wave, self.pulse, self.offset, self.transform, FRAGMENT_EXT
        )
    }

    /// `<root>/wave_<w>/<file_name>`
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(wave_dir_name(self.wave)).join(self.file_name())
    }

    /// Inverse of [`FragmentKey::file_name`].
    pub fn parse(name: &str) -> Result<Self, LayoutError> {
        let bad = |reason: &str| LayoutError::BadFragmentName {
            name:   name.to_owned(),
            reason: reason.to_owned(),
        };

        let stem = name
            .strip_suffix(FRAGMENT_EXT)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| bad("missing .bin extension"))?;

        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 4 {
            return Err(bad("expected 4 '_'-separated fields"));
        }

        let wave = parts[0]
            .strip_prefix('w')
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad("wave field must look like w<N>"))?;
        let pulse = parts[1]
            .strip_prefix('p')
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad("pulse field must look like p<N>"))?;
        let offset = parts[2].parse().map_err(|_| bad("offset is not an integer"))?;
        let transform = Transform::from_name(parts[3])
            .ok_or_else(|| bad(&format!("unknown transform '{}'", parts[3])))?;

        Ok(Self { wave, pulse, offset, transform })
    }
}

/// `wave_<w>`
pub fn wave_dir_name(wave: usize) -> String {
    format!("{WAVE_DIR_PREFIX}{wave}")
}

/// Parse `wave_<w>` back to `w`.
pub fn parse_wave_dir(name: &str) -> Option<usize> {
    name.strip_prefix(WAVE_DIR_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let l = Layout::default();
        assert_eq!(l.pulse_step(), 8);
        assert_eq!(l.fragment_offset(0, 0), 0);
        assert_eq!(l.fragment_offset(1, 0), 128);
        assert_eq!(l.fragment_offset(4, 9), 4 * 128 + 72);
        assert_eq!(l.fragment_count(3), 150);
    }

    #[test]
    fn windows_clip_at_end_of_buffer() {
        let l = Layout::default();
        let buf = vec![7u8; 640];
        assert_eq!(l.fragment_bytes(&buf, 4, 9).len(), 640 - 584);
        assert_eq!(l.fragment_bytes(&buf, 0, 0).len(), 128);
        let short = vec![0u8; 100];
        assert!(l.fragment_bytes(&short, 1, 0).is_empty());
        assert!(l.seed_bytes(&short, 3).is_empty());
    }

    #[test]
    fn file_name_roundtrip() {
        let l = Layout::default();
        let key = FragmentKey::new(&l, 3, 7, Transform::Invert);
        assert_eq!(key.file_name(), "w3_p7_440_invert.bin");
        assert_eq!(FragmentKey::parse(&key.file_name()).unwrap(), key);
        assert_eq!(
            key.path_in(Path::new("extracted")),
            Path::new("extracted/wave_3/w3_p7_440_invert.bin")
        );
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in [
            "w3_p7_440_invert.dat",
            "w3_p7_invert.bin",
            "x3_p7_440_invert.bin",
            "w3_q7_440_invert.bin",
            "w3_p7_abc_invert.bin",
            "w3_p7_440_rot13.bin",
        ] {
            assert!(FragmentKey::parse(name).is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn wave_dirs() {
        assert_eq!(wave_dir_name(2), "wave_2");
        assert_eq!(parse_wave_dir("wave_12"), Some(12));
        assert_eq!(parse_wave_dir("wave_x"), None);
        assert_eq!(parse_wave_dir("plots"), None);
    }

    #[test]
    fn validate_rejects_degenerate_layouts() {
        assert!(Layout::default().validate().is_ok());
        assert!(Layout { seed_size: 1, ..Layout::default() }.validate().is_err());
        assert!(Layout { waves: 0, ..Layout::default() }.validate().is_err());
        assert!(Layout { fragment_size: 0, ..Layout::default() }.validate().is_err());
    }
}
