//! Canonical byte layout shared by signatures and record identifiers.
//!
//! The remote verifier rebuilds these bytes independently, so every function
//! here must stay bit-for-bit stable.

use crate::error::{LedgerError, LedgerResult};

/// A varint never spans more than nine bytes; the ninth carries a full eight bits.
pub const VARINT_MAX_BYTES: usize = 9;

/// Separator placed between metadata tokens.
pub const METADATA_SEPARATOR: &str = "\u{0000}";

/// Objects with a canonical binary representation for hashing.
/// careful: This must be deterministic across platforms/versions.
pub trait CanonicalSerialize {
    fn canonical_serialize(&self, buf: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.canonical_serialize(&mut buf);
        buf
    }
}

// --- Primitives ---

pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(VARINT_MAX_BYTES);
    write_varint(&mut out, value);
    out
}

pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    if value < 0x80 {
        buf.push(value as u8);
        return;
    }
    let mut remaining = value;
    let mut written = 0;
    while written < VARINT_MAX_BYTES && remaining != 0 {
        let flag = if remaining < 0x80 { 0x00 } else { 0x80 };
        buf.push((remaining | flag) as u8);
        remaining >>= 7;
        written += 1;
    }
}

/// Decodes a varint from the front of `input`, returning the value and the
/// number of bytes consumed.
pub fn read_varint(input: &[u8]) -> LedgerResult<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in input.iter().take(VARINT_MAX_BYTES).enumerate() {
        if i == VARINT_MAX_BYTES - 1 {
            value |= (byte as u64) << 56;
            return Ok((value, i + 1));
        }
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(LedgerError::Encoding("truncated varint".to_string()))
}

pub fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

/// Flattens key/value pairs into `k1 NUL v1 NUL k2 NUL v2 ...`, dropping any
/// pair whose key or value is empty.
pub fn compact_metadata<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut parts: Vec<String> = Vec::new();
    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        parts.push(key.to_string());
        parts.push(value.to_string());
    }
    parts.join(METADATA_SEPARATOR)
}

/// Inverse of [`compact_metadata`]; a trailing unpaired token is dropped.
pub fn expand_metadata(compact: &str) -> Vec<(String, String)> {
    if compact.is_empty() {
        return Vec::new();
    }
    let tokens: Vec<&str> = compact.split(METADATA_SEPARATOR).collect();
    tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}
