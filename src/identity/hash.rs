// src/identity/hash.rs

//! Seed-free canonical hashing.
//!
//! Values are first written into a [`CanonicalEncoder`] as type-tagged,
//! length-prefixed bytes, and the bytes are then digested with blake3. The
//! same logical value always produces the same bytes, so the digest is stable
//! across processes, platforms and container orderings.

use blake3::Hasher;
use tracing::trace;

/// Byte tags written before every encoded value.
pub(crate) mod tag {
    pub const NULL: u8 = 0x00;
    pub const FALSE: u8 = 0x01;
    pub const TRUE: u8 = 0x02;
    pub const INT: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const STR: u8 = 0x05;
    pub const LIST: u8 = 0x06;
    pub const SET: u8 = 0x07;
    pub const MAP: u8 = 0x08;
    pub const HASH: u8 = 0x09;
}

/// Accumulates the canonical byte form of a value.
#[derive(Debug, Default, Clone)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, tag: u8) -> &mut Self {
        self.buf.push(tag);
        self
    }

    pub fn len_prefix(&mut self, len: usize) -> &mut Self {
        self.buf.extend_from_slice(&(len as u64).to_le_bytes());
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.tag(tag::NULL)
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.tag(if value { tag::TRUE } else { tag::FALSE })
    }

    pub fn int(&mut self, value: i64) -> &mut Self {
        self.tag(tag::INT);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Floats are encoded by bit pattern with `-0.0` folded into `0.0` and
    /// every NaN folded into one canonical NaN.
    pub fn float(&mut self, value: f64) -> &mut Self {
        let bits = if value.is_nan() {
            f64::NAN.to_bits()
        } else if value == 0.0 {
            0u64
        } else {
            value.to_bits()
        };
        self.tag(tag::FLOAT);
        self.buf.extend_from_slice(&bits.to_le_bytes());
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.tag(tag::STR);
        self.len_prefix(value.len());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// An already computed identity hash.
    pub fn hash(&mut self, value: u64) -> &mut Self {
        self.tag(tag::HASH);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Digest the encoded bytes into an identity hash.
    pub fn finish(&self) -> u64 {
        identity_hash(&self.buf)
    }
}

/// Reduce a blake3 digest of `bytes` to a non-negative value that fits a
/// signed 64-bit database column.
pub fn identity_hash(bytes: &[u8]) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    let value = u64::from_le_bytes(head) % (i64::MAX as u64);
    trace!(len = bytes.len(), hash = value, "computed identity hash");
    value
}
