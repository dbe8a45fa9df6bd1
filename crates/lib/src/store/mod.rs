//! Artifact store.
//!
//! Step outputs are stored under the step's idempotency key. A key is
//! written at most once: the store is append-only, and a second write for a
//! key that already exists leaves the first value in place.
//!
//! # Layout
//!
//! ```text
//! store/
//! └── obj/
//!     └── <key>.json      # StoredArtifacts of one step
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::consts::{DEFAULT_STORE_DIR, STORE_ENV};
use crate::plan::ArtifactRef;
use crate::util::hash::ObjectHash;

/// One produced artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub reference: ArtifactRef,
  #[serde(with = "hex::serde")]
  pub data: Vec<u8>,
}

impl Artifact {
  pub fn new(reference: ArtifactRef, data: impl Into<Vec<u8>>) -> Self {
    Self {
      reference,
      data: data.into(),
    }
  }
}

/// Everything a step stored under its key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifacts {
  pub artifacts: Vec<Artifact>,
}

impl StoredArtifacts {
  pub fn get(&self, reference: &ArtifactRef) -> Option<&Artifact> {
    self.artifacts.iter().find(|a| &a.reference == reference)
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("corrupt store entry {key}: {source}")]
  Corrupt {
    key: ObjectHash,
    #[source]
    source: serde_json::Error,
  },

  #[error("no store entry for {0}")]
  Missing(ObjectHash),

  #[error("store task failed: {0}")]
  Task(String),
}

/// Storage for step outputs keyed by idempotency key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
  async fn exists(&self, key: &ObjectHash) -> Result<bool, StoreError>;

  /// Store `artifacts` under `key`. An existing entry is never replaced.
  async fn write(&self, key: &ObjectHash, artifacts: &StoredArtifacts) -> Result<(), StoreError>;

  async fn read(&self, key: &ObjectHash) -> Result<StoredArtifacts, StoreError>;
}

/// Store backed by a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
  root: PathBuf,
}

impl FsArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Store root from `VEEBUILD_STORE`, falling back to `.veebuild/store`.
  pub fn default_root() -> PathBuf {
    if let Ok(path) = std::env::var(STORE_ENV) {
      return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_STORE_DIR)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn obj_dir(&self) -> PathBuf {
    self.root.join("obj")
  }

  fn entry_path(&self, key: &ObjectHash) -> PathBuf {
    self.obj_dir().join(format!("{key}.json"))
  }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
  move |source| StoreError::Io {
    path: path.to_path_buf(),
    source,
  }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
  async fn exists(&self, key: &ObjectHash) -> Result<bool, StoreError> {
    let path = self.entry_path(key);
    tokio::fs::try_exists(&path).await.map_err(io_error(&path))
  }

  async fn write(&self, key: &ObjectHash, artifacts: &StoredArtifacts) -> Result<(), StoreError> {
    let dir = self.obj_dir();
    let path = self.entry_path(key);
    let content = serde_json::to_vec(artifacts).map_err(|source| StoreError::Corrupt {
      key: key.clone(),
      source,
    })?;

    tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

    let key = key.clone();
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
      use std::io::Write;

      let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_error(&dir))?;
      tmp.write_all(&content).map_err(io_error(tmp.path()))?;
      tmp.as_file().sync_all().map_err(io_error(&path))?;

      match tmp.persist_noclobber(&path) {
        Ok(_) => {
          trace!(key = %key, path = %path.display(), "stored artifacts");
          Ok(())
        }
        Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
          debug!(key = %key, "store entry already present, keeping existing");
          Ok(())
        }
        Err(err) => Err(StoreError::Io {
          path,
          source: err.error,
        }),
      }
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))?
  }

  async fn read(&self, key: &ObjectHash) -> Result<StoredArtifacts, StoreError> {
    let path = self.entry_path(key);
    let content = match tokio::fs::read(&path).await {
      Ok(content) => content,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::Missing(key.clone())),
      Err(err) => return Err(io_error(&path)(err)),
    };
    serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
      key: key.clone(),
      source,
    })
  }
}

/// In-process store, for tests and one-shot builds.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
  entries: Mutex<BTreeMap<ObjectHash, StoredArtifacts>>,
}

impl MemoryArtifactStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
  async fn exists(&self, key: &ObjectHash) -> Result<bool, StoreError> {
    Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key))
  }

  async fn write(&self, key: &ObjectHash, artifacts: &StoredArtifacts) -> Result<(), StoreError> {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(key.clone())
      .or_insert_with(|| artifacts.clone());
    Ok(())
  }

  async fn read(&self, key: &ObjectHash) -> Result<StoredArtifacts, StoreError> {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .cloned()
      .ok_or_else(|| StoreError::Missing(key.clone()))
  }
}

#[cfg(test)]
mod tests {
  use serial_test::serial;
  use temp_env::with_var;

  use super::*;
  use crate::module::{ArtifactKind, Coordinate};

  fn key(s: &str) -> ObjectHash {
    ObjectHash(s.to_string())
  }

  fn artifacts(data: &str) -> StoredArtifacts {
    StoredArtifacts {
      artifacts: vec![Artifact::new(
        ArtifactRef::new(Coordinate::local("ui"), ArtifactKind::Library),
        data,
      )],
    }
  }

  #[tokio::test]
  async fn fs_store_round_trips_and_never_overwrites() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path());
    let k = key("0123456789abcdef0123");

    assert!(!store.exists(&k).await.unwrap());
    store.write(&k, &artifacts("first")).await.unwrap();
    assert!(store.exists(&k).await.unwrap());
    assert!(temp.path().join("obj").join("0123456789abcdef0123.json").exists());

    store.write(&k, &artifacts("second")).await.unwrap();
    assert_eq!(store.read(&k).await.unwrap(), artifacts("first"));
  }

  #[tokio::test]
  async fn fs_store_reports_missing_and_corrupt_entries() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path());

    assert!(matches!(store.read(&key("absent")).await, Err(StoreError::Missing(_))));

    std::fs::create_dir_all(temp.path().join("obj")).unwrap();
    std::fs::write(temp.path().join("obj").join("broken.json"), "{not json").unwrap();
    assert!(matches!(
      store.read(&key("broken")).await,
      Err(StoreError::Corrupt { .. })
    ));
  }

  #[tokio::test]
  async fn memory_store_is_append_only() {
    let store = MemoryArtifactStore::new();
    let k = key("k");
    assert!(store.is_empty());

    store.write(&k, &artifacts("first")).await.unwrap();
    store.write(&k, &artifacts("second")).await.unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.read(&k).await.unwrap(), artifacts("first"));
    assert!(matches!(store.read(&key("other")).await, Err(StoreError::Missing(_))));
  }

  #[test]
  fn artifact_data_is_hex_encoded() {
    let json = serde_json::to_string(&artifacts("hi")).unwrap();
    assert!(json.contains("\"data\":\"6869\""));
  }

  #[test]
  #[serial]
  fn env_var_overrides_default_root() {
    with_var(STORE_ENV, Some("/custom/store"), || {
      assert_eq!(FsArtifactStore::default_root(), PathBuf::from("/custom/store"));
    });
    with_var(STORE_ENV, None::<&str>, || {
      assert_eq!(FsArtifactStore::default_root(), PathBuf::from(DEFAULT_STORE_DIR));
    });
  }
}
