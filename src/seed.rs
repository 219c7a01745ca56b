//! Wave seed fingerprints.
//!
//! A wave is identified by the content of its leading `seed_size` bytes, not
//! its position: two waves that start with identical bytes share a
//! fingerprint.

/// Hex characters kept from the digest (6 bytes).
pub const FINGERPRINT_HEX_LEN: usize = 12;

/// BLAKE3 of `seed_bytes`, truncated to [`FINGERPRINT_HEX_LEN`] lowercase hex chars.
pub fn fingerprint(seed_bytes: &[u8]) -> String {
    let digest = blake3::hash(seed_bytes);
    hex::encode(&digest.as_bytes()[..FINGERPRINT_HEX_LEN / 2])
}
