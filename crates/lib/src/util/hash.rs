//! Hashing utilities for idempotency keys and cache keys.
//!
//! This module provides:
//! - `ObjectHash`: a truncated 20-character SHA-256 used for step keys and store entries
//! - `Hashable`: hashing of any serializable value through its canonical JSON form
//! - `hash_bytes()`: arbitrary byte hashing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A content-addressed hash identifying a unique object.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized value.
/// Values hashed this way must only contain ordered collections (`BTreeMap`,
/// `BTreeSet`, `Vec`) so that the JSON form is canonical.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl ObjectHash {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

/// Hash arbitrary bytes into a truncated [`ObjectHash`].
pub fn hash_bytes(data: &[u8]) -> ObjectHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  let full = hex::encode(hasher.finalize());
  ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string())
}
