//! Types produced by dependency resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use semver::{Version, VersionReq};
use serde::Serialize;
use thiserror::Error;

use crate::module::{Capability, Coordinate, Module, ModuleType, Scope};
use crate::util::hash::{HashError, Hashable, ObjectHash};
use crate::variant::VariantContext;

/// One constraint placed on a coordinate, with the module that placed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintSource {
  pub required_by: Coordinate,
  pub constraint: VersionReq,
}

impl fmt::Display for ConstraintSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (from {})", self.constraint, self.required_by)
  }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
  items.iter().map(ToString::to_string).collect::<Vec<_>>().join(sep)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  #[error("module not found: {coordinate}{}{}",
    .version.as_ref().map(|v| format!("@{v}")).unwrap_or_default(),
    .required_by.as_ref().map(|c| format!(" (required by {c})")).unwrap_or_default()
  )]
  NotFound {
    coordinate: Coordinate,
    version: Option<Version>,
    required_by: Option<Coordinate>,
  },

  #[error("no version of {coordinate} satisfies all constraints: {}", join(.constraints, ", "))]
  VersionConflict {
    coordinate: Coordinate,
    constraints: Vec<ConstraintSource>,
  },

  #[error("dependency cycle: {}", join(.path, " -> "))]
  CyclicDependency { path: Vec<Coordinate> },

  #[error("{root} must resolve to exactly one platform port, found {}: [{}]", .ports.len(), join(.ports, ", "))]
  AmbiguousEnvironment { root: Coordinate, ports: Vec<Coordinate> },

  #[error("pack {pack} requires [{}] which platform port {port}@{port_version} does not provide", join(.missing, ", "))]
  IncompatiblePack {
    pack: Coordinate,
    port: Coordinate,
    port_version: Version,
    missing: Vec<Capability>,
  },
}

/// A module selected into a closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModule {
  pub module: Module,
  /// Scope of the edge that brought the module in; `None` for the root.
  ///
  /// When several edges reach a module, a propagating scope wins over a
  /// resolution-local one; among equals the first edge in traversal order wins.
  pub scope: Option<Scope>,
}

impl ResolvedModule {
  pub fn coordinate(&self) -> &Coordinate {
    &self.module.coordinate
  }

  pub fn version(&self) -> &Version {
    &self.module.version
  }
}

/// A dependency edge the resolver followed under the active variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ResolvedEdge {
  pub from: Coordinate,
  pub to: Coordinate,
  pub scope: Scope,
}

/// The conflict-free set of modules needed to build a root.
///
/// Modules are keyed by coordinate only: a closure never holds two versions
/// of one coordinate. Iteration is in ascending coordinate order, so equal
/// closures serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedClosure {
  pub(crate) root: Coordinate,
  pub(crate) environment: Option<Coordinate>,
  pub(crate) variant: VariantContext,
  pub(crate) modules: BTreeMap<Coordinate, ResolvedModule>,
  pub(crate) edges: BTreeSet<ResolvedEdge>,
}

impl Hashable for ResolvedClosure {}

impl ResolvedClosure {
  pub fn root(&self) -> &Coordinate {
    &self.root
  }

  pub fn root_module(&self) -> &Module {
    // The resolver always inserts the root.
    &self.modules[&self.root].module
  }

  /// The selected platform port, if any.
  pub fn environment(&self) -> Option<&ResolvedModule> {
    self.environment.as_ref().and_then(|c| self.modules.get(c))
  }

  pub fn variant(&self) -> &VariantContext {
    &self.variant
  }

  pub fn get(&self, coordinate: &Coordinate) -> Option<&ResolvedModule> {
    self.modules.get(coordinate)
  }

  pub fn contains(&self, coordinate: &Coordinate) -> bool {
    self.modules.contains_key(coordinate)
  }

  pub fn version_of(&self, coordinate: &Coordinate) -> Option<&Version> {
    self.modules.get(coordinate).map(ResolvedModule::version)
  }

  pub fn modules(&self) -> impl Iterator<Item = &ResolvedModule> {
    self.modules.values()
  }

  pub fn modules_of_type(&self, module_type: ModuleType) -> impl Iterator<Item = &ResolvedModule> {
    self.modules.values().filter(move |m| m.module.module_type == module_type)
  }

  pub fn edges(&self) -> impl Iterator<Item = &ResolvedEdge> {
    self.edges.iter()
  }

  /// Edges leaving `coordinate`, in ascending target order.
  pub fn dependencies_of<'a>(&'a self, coordinate: &'a Coordinate) -> impl Iterator<Item = &'a ResolvedEdge> + 'a {
    self.edges.iter().filter(move |e| &e.from == coordinate)
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  pub fn content_hash(&self) -> Result<ObjectHash, HashError> {
    self.compute_hash()
  }
}
