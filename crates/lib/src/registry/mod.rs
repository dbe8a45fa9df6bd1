//! Module registry.
//!
//! Holds every known module by coordinate and version. The registry is
//! populated once (usually from a TOML description, see [`load`]) and is
//! read-only for the lifetime of a build; it can be shared between
//! concurrent builds behind an `Arc` without locking.

pub mod load;

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;
use serde::Serialize;
use thiserror::Error;

use crate::module::{Coordinate, Module};
use crate::util::hash::{HashError, Hashable, ObjectHash};

pub use load::LoadError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  #[error("module not found: {coordinate}{}", .version.as_ref().map(|v| format!("@{v}")).unwrap_or_default())]
  NotFound {
    coordinate: Coordinate,
    version: Option<Version>,
  },

  #[error("module {coordinate}@{version} is already registered")]
  Duplicate { coordinate: Coordinate, version: Version },

  #[error("module {coordinate} depends on itself")]
  SelfDependency { coordinate: Coordinate },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
  modules: BTreeMap<Coordinate, BTreeMap<Version, Module>>,
}

impl Hashable for Registry {}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a registry from a set of modules.
  pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Result<Self, RegistryError> {
    let mut registry = Self::new();
    for module in modules {
      registry.register(module)?;
    }
    Ok(registry)
  }

  /// Add a module. Fails on duplicate coordinate+version or a self-dependency.
  pub fn register(&mut self, module: Module) -> Result<(), RegistryError> {
    if module.dependencies.iter().any(|d| d.target == module.coordinate) {
      return Err(RegistryError::SelfDependency {
        coordinate: module.coordinate,
      });
    }

    let versions = self.modules.entry(module.coordinate.clone()).or_default();
    if versions.contains_key(&module.version) {
      return Err(RegistryError::Duplicate {
        coordinate: module.coordinate,
        version: module.version,
      });
    }
    versions.insert(module.version.clone(), module);
    Ok(())
  }

  /// All registered versions of a coordinate (empty when unknown).
  pub fn lookup(&self, coordinate: &Coordinate) -> BTreeSet<Version> {
    self
      .modules
      .get(coordinate)
      .map(|versions| versions.keys().cloned().collect())
      .unwrap_or_default()
  }

  pub fn describe(&self, coordinate: &Coordinate, version: &Version) -> Result<&Module, RegistryError> {
    self
      .modules
      .get(coordinate)
      .and_then(|versions| versions.get(version))
      .ok_or_else(|| RegistryError::NotFound {
        coordinate: coordinate.clone(),
        version: Some(version.clone()),
      })
  }

  /// Highest registered version of a coordinate.
  pub fn latest(&self, coordinate: &Coordinate) -> Result<&Module, RegistryError> {
    self
      .modules
      .get(coordinate)
      .and_then(|versions| versions.values().next_back())
      .ok_or_else(|| RegistryError::NotFound {
        coordinate: coordinate.clone(),
        version: None,
      })
  }

  pub fn contains(&self, coordinate: &Coordinate) -> bool {
    self.modules.contains_key(coordinate)
  }

  /// Every module version, ordered by coordinate then version.
  pub fn modules(&self) -> impl Iterator<Item = &Module> {
    self.modules.values().flat_map(|versions| versions.values())
  }

  pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
    self.modules.keys()
  }

  /// Number of registered module versions.
  pub fn len(&self) -> usize {
    self.modules.values().map(BTreeMap::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// Content hash of the registry, used to key resolution caches.
  pub fn snapshot_version(&self) -> Result<ObjectHash, HashError> {
    self.compute_hash()
  }
}
