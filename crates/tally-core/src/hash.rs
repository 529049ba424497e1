//! Content identity — the durable identity of a physical receipt.
//!
//! A [`ContentHash`] is a SHA-256 digest over the raw file bytes, rendered
//! as `sha256:<hex>`. It is computed exactly once, by the content extractor,
//! and carried unchanged through every later event. Filenames and timestamps
//! do not participate, so a rescan of the same image collapses to the same
//! hash.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest of raw receipt bytes, serialized as `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
  /// Digest raw file bytes. The only constructor that hashes; every stage
  /// past the extractor must carry the value unchanged, never rehash.
  pub fn digest(bytes: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Self(format!("sha256:{}", hex::encode(hasher.finalize())))
  }

  /// Wrap an already-computed `sha256:<hex>` string from a wire payload.
  pub fn from_wire(s: impl Into<String>) -> Self {
    Self(s.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ContentHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
