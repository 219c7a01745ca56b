//! Transform registry: a closed set of reversible byte-wise transforms.
//!
//! # Identity rules
//! Every transform is identified on disk by its lowercase name.  That name is:
//!   - Embedded in every fragment file name (`w0_p0_0_xor.bin`).
//!   - Listed, in application order, in each record's `transform_chain`.
//!
//! The registry is closed.  A chain naming anything outside it MUST fail with
//! [`TransformError::UnknownTransform`]; falling back to another transform
//! would corrupt reconstructed bytes without any signal.
//!
//! # Inversion
//! `invert` and `xor` are involutions and `identity` is a no-op, so the
//! inverse of a chain is the same forward functions applied in reverse order.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Transform enum ───────────────────────────────────────────────────────────

/// Runtime transform discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    Identity,
    Invert,
    Xor,
}

/// Every registered transform, in the order extraction emits them.
pub const REGISTRY: [Transform; 3] = [Transform::Identity, Transform::Invert, Transform::Xor];

/// Key used by [`Transform::Xor`].
pub const XOR_KEY: u8 = 0xFF;

impl Transform {
    /// Name written into fragment file names and metadata.
    pub fn name(self) -> &'static str {
        match self {
            Transform::Identity => "identity",
            Transform::Invert   => "invert",
            Transform::Xor      => "xor",
        }
    }

    /// Resolve a name to a transform.
    /// Returns `None` if the name is not in the registry.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "identity" => Some(Transform::Identity),
            "invert"   => Some(Transform::Invert),
            "xor"      => Some(Transform::Xor),
            _          => None,
        }
    }

    /// Forward application.
    pub fn apply(self, data: &[u8]) -> Vec<u8> {
        match self {
            Transform::Identity => data.to_vec(),
            Transform::Invert   => data.iter().map(|b| !b).collect(),
            Transform::Xor      => data.iter().map(|b| b ^ XOR_KEY).collect(),
        }
    }

    /// Inverse application.  Every registered transform is self-inverse.
    #[inline]
    pub fn unapply(self, data: &[u8]) -> Vec<u8> {
        self.apply(data)
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transform {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transform::from_name(s).ok_or_else(|| TransformError::UnknownTransform { name: s.to_owned() })
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Decoding MUST NOT continue with a guessed transform.
    #[error("Unknown transform '{name}' (registry: identity, invert, xor)")]
    UnknownTransform { name: String },
}

// ── Chains ───────────────────────────────────────────────────────────────────

/// Ordered list of transforms, outermost last.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformChain(Vec<Transform>);

impl TransformChain {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self(transforms)
    }

    /// Parse the wire form stored in metadata.  Fails on the first unknown name.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, TransformError> {
        names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Wire form stored in metadata.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|t| t.name().to_owned()).collect()
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply every transform in chain order.
    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        self.0.iter().fold(data.to_vec(), |acc, t| t.apply(&acc))
    }

    /// Undo the chain: inverses in reverse order.
    pub fn invert(&self, data: &[u8]) -> Vec<u8> {
        self.0.iter().rev().fold(data.to_vec(), |acc, t| t.unapply(&acc))
    }
}

impl From<Transform> for TransformChain {
    fn from(t: Transform) -> Self {
        Self(vec![t])
    }
}

/// Number of positions at which `a` and `b` differ, over their common prefix.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).filter(|(x, y)| x != y).count() as u32
}

/// `1 - distance / fragment_size`, rounded half-to-even to 4 decimals and
/// clamped to [0, 1].
pub fn detection_score(distance: u32, fragment_size: usize) -> f64 {
    if fragment_size == 0 {
        return 1.0;
    }
    let raw = 1.0 - distance as f64 / fragment_size as f64;
    ((raw * 10_000.0).round_ties_even() / 10_000.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn names_roundtrip_through_registry() {
        for t in REGISTRY {
            assert_eq!(Transform::from_name(t.name()), Some(t));
        }
        assert_eq!(Transform::from_name("rot13"), None);
        assert_eq!(Transform::from_name("XOR"), None);
    }

    #[test]
    fn invert_and_xor_flip_every_bit() {
        let data = [0x00u8, 0x0F, 0xAA, 0xFF];
        assert_eq!(Transform::Invert.apply(&data), vec![0xFF, 0xF0, 0x55, 0x00]);
        assert_eq!(Transform::Xor.apply(&data), vec![0xFF, 0xF0, 0x55, 0x00]);
    }

    #[test]
    fn unknown_name_in_chain_is_an_error() {
        let err = TransformChain::parse(&["identity", "scramble"]).unwrap_err();
        assert_eq!(err, TransformError::UnknownTransform { name: "scramble".into() });
    }

    #[test]
    fn chain_inverts_in_reverse_order() {
        let chain = TransformChain::new(vec![Transform::Xor, Transform::Identity, Transform::Invert]);
        let data = b"wave seed bytes".to_vec();
        let encoded = chain.apply(&data);
        assert_eq!(chain.invert(&encoded), data);
        assert_eq!(chain.names(), vec!["xor", "identity", "invert"]);
    }

    #[test]
    fn empty_chain_is_a_no_op() {
        let chain = TransformChain::parse::<&str>(&[]).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.invert(b"abc"), b"abc".to_vec());
    }

    #[test]
    fn detection_score_bounds() {
        assert_eq!(detection_score(0, 128), 1.0);
        assert_eq!(detection_score(128, 128), 0.0);
        assert_eq!(detection_score(1, 128), 0.9922);
        assert_eq!(detection_score(124, 128), 0.0312);
    }

    proptest! {
        #[test]
        fn invert_is_an_involution(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(Transform::Invert.apply(&Transform::Invert.apply(&data)), data);
        }

        #[test]
        fn xor_is_an_involution(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(Transform::Xor.apply(&Transform::Xor.apply(&data)), data);
        }

        #[test]
        fn identity_scores_one(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let out = Transform::Identity.apply(&data);
            let hd = hamming_distance(&data, &out);
            prop_assert_eq!(&out, &data);
            prop_assert_eq!(hd, 0);
            prop_assert_eq!(detection_score(hd, 128), 1.0);
        }
    }
}
