//! Hashing utilities for source verification.
//!
//! This module provides:
//! - `DigestAlgorithm`: the checksum algorithms a manifest may declare
//! - `Checksum`: a validated, declared checksum
//! - `ContentHash`: a computed lowercase hex digest
//! - `hash_file()` / `hash_bytes()`: digest computation
//! - `digests_match()`: constant-structure digest comparison

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// Checksum algorithms accepted in source declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
  Sha256,
  Sha512,
}

impl DigestAlgorithm {
  /// Manifest field name carrying this checksum.
  pub fn field(self) -> &'static str {
    match self {
      Self::Sha256 => "sha256",
      Self::Sha512 => "sha512",
    }
  }

  /// Length of the lowercase hex encoding.
  pub fn hex_len(self) -> usize {
    match self {
      Self::Sha256 => 64,
      Self::Sha512 => 128,
    }
  }
}

impl fmt::Display for DigestAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.field())
  }
}

/// A computed digest, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl fmt::Display for ContentHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Why a declared checksum string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumFormatError {
  #[error("expected {expected} hex characters, found {actual}")]
  Length { expected: usize, actual: usize },

  #[error("invalid hex character {0:?}")]
  NotHex(char),
}

/// A declared checksum: algorithm plus normalized lowercase hex.
///
/// Serializes as its manifest field, e.g. `{"sha256": "<hex>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
  pub algorithm: DigestAlgorithm,
  pub hex: String,
}

impl Checksum {
  /// Validate a declared hex string for the given algorithm.
  pub fn parse(algorithm: DigestAlgorithm, hex: &str) -> Result<Self, ChecksumFormatError> {
    let hex = hex.trim();
    if hex.len() != algorithm.hex_len() {
      return Err(ChecksumFormatError::Length {
        expected: algorithm.hex_len(),
        actual: hex.len(),
      });
    }
    if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
      return Err(ChecksumFormatError::NotHex(bad));
    }
    Ok(Self {
      algorithm,
      hex: hex.to_ascii_lowercase(),
    })
  }

  /// Returns true if `computed` equals this checksum.
  pub fn matches(&self, computed: &ContentHash) -> bool {
    digests_match(&self.hex, &computed.0)
  }
}

impl Serialize for Checksum {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(self.algorithm.field(), &self.hex)?;
    map.end()
  }
}

impl fmt::Display for Checksum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.algorithm, self.hex)
  }
}

/// Streaming hasher over either supported algorithm.
pub enum StreamHasher {
  Sha256(Sha256),
  Sha512(Sha512),
}

impl StreamHasher {
  pub fn new(algorithm: DigestAlgorithm) -> Self {
    match algorithm {
      DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
      DigestAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
    }
  }

  pub fn update(&mut self, data: &[u8]) {
    match self {
      Self::Sha256(h) => h.update(data),
      Self::Sha512(h) => h.update(data),
    }
  }

  pub fn finish(self) -> ContentHash {
    match self {
      Self::Sha256(h) => ContentHash(hex::encode(h.finalize())),
      Self::Sha512(h) => ContentHash(hex::encode(h.finalize())),
    }
  }
}

/// Compare two hex digests without short-circuiting on the first differing byte.
///
/// Inputs are compared case-insensitively. Differing lengths never match.
pub fn digests_match(expected: &str, actual: &str) -> bool {
  let a = expected.as_bytes();
  let b = actual.as_bytes();
  if a.len() != b.len() {
    return false;
  }
  let diff = a
    .iter()
    .zip(b)
    .fold(0u8, |acc, (x, y)| acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase()));
  diff == 0
}

/// Hash a file's contents.
pub fn hash_file(path: &Path, algorithm: DigestAlgorithm) -> std::io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;
  let mut hasher = StreamHasher::new(algorithm);
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hasher.finish())
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8], algorithm: DigestAlgorithm) -> ContentHash {
  let mut hasher = StreamHasher::new(algorithm);
  hasher.update(data);
  hasher.finish()
}
