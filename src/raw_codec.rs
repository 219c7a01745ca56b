//! Raw codec: materialize a raw byte buffer from a JSON value.
//!
//! | JSON input | Bytes |
//! |------------|-------|
//! | integer `n >= 0` | big-endian, minimal length, at least one byte (`0` → `00`) |
//! | array of integers | one byte per element, each in `0..=255` |
//! | string | hex-decoded if it is even-length hex, else its UTF-8 text |
//!
//! Everything else (negative integers, floats, booleans, null, objects) is
//! rejected.
//!
//! # Caveat: hex wins
//! A string that happens to be valid hex is always decoded as hex.  `"cafe"`
//! becomes two bytes, not four characters of text.
//!
//! # Large integers
//! Integer literals keep their full precision (`serde_json` is built with
//! `arbitrary_precision`) and are accepted up to `max_integer_digits`
//! decimal digits.

use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Number, Value};
use thiserror::Error;
use tracing::info;

/// Default bound on decimal digits in an integer literal.
pub const DEFAULT_MAX_INTEGER_DIGITS: usize = 50_000;

/// Decimal digits folded into one limb multiplication.
const DIGITS_PER_STEP: usize = 9;

#[derive(Error, Debug)]
pub enum RawCodecError {
    #[error("Value encoding error: {0}")]
    ValueEncoding(String),
    #[error("Unsupported JSON input type: {found}")]
    UnsupportedInputType { found: &'static str },
    #[error("Integer literal has {digits} digits (limit {limit})")]
    IntegerTooLong { digits: usize, limit: usize },
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCodec {
    pub max_integer_digits: usize,
}

impl Default for RawCodec {
    fn default() -> Self {
        Self { max_integer_digits: DEFAULT_MAX_INTEGER_DIGITS }
    }
}

impl RawCodec {
    pub fn new(max_integer_digits: usize) -> Self {
        Self { max_integer_digits }
    }

    /// Parse `text` as JSON and encode it.
    pub fn encode_str(&self, text: &str) -> Result<Vec<u8>, RawCodecError> {
        let value: Value = serde_json::from_str(text)?;
        self.encode_value(&value)
    }

    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>, RawCodecError> {
        match value {
            Value::Number(n) => self.encode_integer(n),
            Value::Array(items) => encode_array(items),
            Value::String(s) => Ok(encode_string(s)),
            Value::Bool(_) => Err(RawCodecError::UnsupportedInputType { found: "boolean" }),
            Value::Null => Err(RawCodecError::UnsupportedInputType { found: "null" }),
            Value::Object(_) => Err(RawCodecError::UnsupportedInputType { found: "object" }),
        }
    }

    /// Read JSON from `input`, write raw bytes to `output`.  Returns the
    /// number of bytes written.
    pub fn encode_file(&self, input: &Path, output: &Path) -> Result<usize, RawCodecError> {
        let text = fs::read_to_string(input)?;
        let data = self.encode_str(&text)?;
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output, &data)?;
        info!(output = %output.display(), bytes = data.len(), "wrote raw file");
        Ok(data.len())
    }

    fn encode_integer(&self, n: &Number) -> Result<Vec<u8>, RawCodecError> {
        let literal = n.to_string();
        let (negative, digits) = match literal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, literal.as_str()),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RawCodecError::UnsupportedInputType { found: "float" });
        }
        if digits.len() > self.max_integer_digits {
            return Err(RawCodecError::IntegerTooLong {
                digits: digits.len(),
                limit:  self.max_integer_digits,
            });
        }
        let bytes = decimal_to_be_bytes(digits);
        if negative && bytes.iter().any(|&b| b != 0) {
            return Err(RawCodecError::ValueEncoding(format!(
                "negative integer -{digits} has no unsigned byte encoding"
            )));
        }
        Ok(bytes)
    }
}

fn encode_array(items: &[Value]) -> Result<Vec<u8>, RawCodecError> {
    items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| RawCodecError::ValueEncoding(format!(
                    "element {i} ({v}) is not an integer in 0..=255"
                )))
        })
        .collect()
}

fn encode_string(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap_or_else(|_| s.as_bytes().to_vec())
}

/// Big-endian magnitude of a non-empty ASCII decimal string, minimal length,
/// at least one byte.
fn decimal_to_be_bytes(digits: &str) -> Vec<u8> {
    // little-endian base-2^32 limbs
    let mut limbs: Vec<u32> = Vec::with_capacity(digits.len() / DIGITS_PER_STEP + 1);
    let bytes = digits.as_bytes();
    let head = match bytes.len() % DIGITS_PER_STEP {
        0 => DIGITS_PER_STEP.min(bytes.len()),
        n => n,
    };

    let mut start = 0;
    let mut end = head;
    while start < bytes.len() {
        let chunk = &bytes[start..end];
        let mul = 10u64.pow(chunk.len() as u32);
        let mut carry = chunk.iter().fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'));
        for limb in limbs.iter_mut() {
            let v = u64::from(*limb) * mul + carry;
            *limb = v as u32;
            carry = v >> 32;
        }
        if carry > 0 {
            limbs.push(carry as u32);
        }
        start = end;
        end += DIGITS_PER_STEP;
    }

    let mut out: Vec<u8> = limbs.iter().rev().flat_map(|l| l.to_be_bytes()).collect();
    let first = out.iter().position(|&b| b != 0).unwrap_or(out.len().saturating_sub(1));
    out.drain(..first);
    if out.is_empty() {
        out.push(0);
    }
    out
}
