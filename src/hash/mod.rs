//! Content hashing for change detection.
//!
//! Every source record is fingerprinted with a 128-bit digest computed over a
//! normalized serialization of its content:
//!
//! - [`ContentHash`] - the digest itself (SHA-256 truncated to 16 bytes)
//! - [`RecordHasher`] - a streaming hasher with typed, byte-exact feeders
//! - [`HashNormalizer`] - strips volatile fields and walks sub-records
//! - [`HashSink`] - diagnostics sink notified of every element hash
//!
//! Numbers are always fed as little-endian bytes (IEEE-754 for floats) so a
//! hash computed on one machine reproduces on every other.

mod normalizer;
mod sink;

pub use normalizer::{ComparisonTweak, DomainExtension, HashNormalizer};
pub use sink::{FileHashDump, HashSink, NullSink};

#[cfg(test)]
pub use sink::RecordingSink;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a content hash in bytes.
pub const HASH_LEN: usize = 16;

/// A 128-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; HASH_LEN]);

impl ContentHash {
    /// Lower-case hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        use fmt::Write;
        self.0.iter().fold(String::with_capacity(HASH_LEN * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl ToSql for ContentHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for ContentHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        <[u8; HASH_LEN]>::try_from(blob)
            .map(Self)
            .map_err(|_| FromSqlError::InvalidBlobSize {
                expected_size: HASH_LEN,
                blob_size: blob.len(),
            })
    }
}

/// Streaming hasher that feeds a single SHA-256 instance.
///
/// Sub-records are streamed into the same instance rather than hashed
/// separately, so the digest is sensitive to their order.
pub struct RecordHasher {
    inner: Sha256,
}

impl Default for RecordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordHasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Feed a length prefix followed by the bytes.
    pub fn add_block(&mut self, bytes: &[u8]) {
        self.add_u64(bytes.len() as u64);
        self.inner.update(bytes);
    }

    pub fn add_u16(&mut self, value: u16) {
        self.inner.update(value.to_le_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.inner.update(value.to_le_bytes());
    }

    pub fn add_i32(&mut self, value: i32) {
        self.inner.update(value.to_le_bytes());
    }

    pub fn add_u64(&mut self, value: u64) {
        self.inner.update(value.to_le_bytes());
    }

    pub fn add_f64(&mut self, value: f64) {
        self.inner.update(value.to_le_bytes());
    }

    pub fn add_str(&mut self, value: &str) {
        self.add_block(value.as_bytes());
    }

    /// Finish and truncate to 128 bits.
    #[must_use]
    pub fn finish(self) -> ContentHash {
        let digest = self.inner.finalize();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest[..HASH_LEN]);
        ContentHash(out)
    }
}

/// Hash a serializable value through its JSON form.
///
/// Used for records whose content is already structured data (views).
/// `serde_json` maps are ordered, so the encoding is deterministic.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn json_hash<T: Serialize>(value: &T) -> serde_json::Result<ContentHash> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = RecordHasher::new();
    hasher.add_block(&json);
    Ok(hasher.finish())
}
