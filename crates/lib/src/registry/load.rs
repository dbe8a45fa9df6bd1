//! TOML registry loader.
//!
//! A registry file is a list of `[[module]]` tables:
//!
//! ```toml
//! [[module]]
//! name = "com.nxp:vee-port"
//! version = "1.2"
//! type = "platform-port"
//! capabilities = ["UI", "FS", "NET"]
//! skipped-checks = "changelog,readme,license"
//!
//! [[module.dependency]]
//! target = "com.microej:architecture"
//! version = "^8.1"
//! scope = "implementation"
//!
//! [[module.dependency]]
//! target = "com.nxp:front-panel"
//! scope = "front-end"
//! ```
//!
//! Coordinates without a namespace land in the default namespace; versions
//! accept the short `1` / `1.2` forms.

use std::path::{Path, PathBuf};

use semver::VersionReq;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{Registry, RegistryError};
use crate::module::{
  ArtifactKind, Capability, Coordinate, CoordinateError, DependencyRef, FrontEndKind, Module, ModuleType, Scope,
  StepCommands, parse_version,
};
use crate::variant::parse_check_list;

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse registry: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("module {module}: invalid version '{input}': {source}")]
  InvalidVersion {
    module: String,
    input: String,
    #[source]
    source: semver::Error,
  },

  #[error("module {module}: invalid version constraint '{input}' for {target}: {source}")]
  InvalidConstraint {
    module: String,
    target: String,
    input: String,
    #[source]
    source: semver::Error,
  },

  #[error("invalid coordinate: {0}")]
  InvalidCoordinate(#[from] CoordinateError),

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
  #[serde(default, rename = "module")]
  modules: Vec<RawModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawModule {
  name: String,
  #[serde(default)]
  namespace: Option<String>,
  version: String,
  #[serde(rename = "type")]
  module_type: RawModuleType,
  #[serde(default)]
  produces: Option<Vec<ArtifactKind>>,
  #[serde(default)]
  capabilities: Vec<String>,
  #[serde(default)]
  requires: Vec<String>,
  #[serde(default)]
  skipped_checks: Option<String>,
  #[serde(default)]
  exclude_tests: Vec<String>,
  #[serde(default, rename = "dependency")]
  dependencies: Vec<RawDependency>,
  #[serde(default)]
  commands: StepCommands,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RawModuleType {
  Application,
  #[serde(alias = "vee-port")]
  PlatformPort,
  Pack,
  Architecture,
  Mock,
  FrontPanel,
  #[serde(alias = "tool")]
  Generator,
  #[serde(alias = "testsuite")]
  ValidationSuite,
}

impl From<RawModuleType> for ModuleType {
  fn from(raw: RawModuleType) -> Self {
    match raw {
      RawModuleType::Application => ModuleType::Application,
      RawModuleType::PlatformPort => ModuleType::PlatformPort,
      RawModuleType::Pack => ModuleType::Pack,
      RawModuleType::Architecture => ModuleType::Architecture,
      RawModuleType::Mock => ModuleType::FrontEnd(FrontEndKind::Mock),
      RawModuleType::FrontPanel => ModuleType::FrontEnd(FrontEndKind::Panel),
      RawModuleType::Generator => ModuleType::Generator,
      RawModuleType::ValidationSuite => ModuleType::ValidationSuite,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
  target: String,
  #[serde(default = "any_version")]
  version: String,
  #[serde(default)]
  scope: RawScope,
  #[serde(default)]
  optional: bool,
}

fn any_version() -> String {
  "*".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RawScope {
  #[default]
  Implementation,
  #[serde(alias = "vee")]
  ExecutionEnvironment,
  #[serde(alias = "tool")]
  Toolchain,
  #[serde(alias = "test")]
  TestOnly,
  #[serde(alias = "front-end", alias = "mock")]
  FrontEndOnly,
}

impl From<RawScope> for Scope {
  fn from(raw: RawScope) -> Self {
    match raw {
      RawScope::Implementation => Scope::Implementation,
      RawScope::ExecutionEnvironment => Scope::ExecutionEnvironment,
      RawScope::Toolchain => Scope::ToolChain,
      RawScope::TestOnly => Scope::TestOnly,
      RawScope::FrontEndOnly => Scope::FrontEndOnly,
    }
  }
}

impl RawModule {
  fn coordinate(&self) -> Result<Coordinate, CoordinateError> {
    match &self.namespace {
      Some(ns) if !self.name.contains(':') => format!("{}:{}", ns, self.name).parse(),
      _ => self.name.parse(),
    }
  }

  fn into_module(self) -> Result<Module, LoadError> {
    let coordinate = self.coordinate()?;
    let label = coordinate.to_string();

    let version = parse_version(&self.version).map_err(|source| LoadError::InvalidVersion {
      module: label.clone(),
      input: self.version.clone(),
      source,
    })?;

    let module_type = ModuleType::from(self.module_type);
    let mut module = Module::new(coordinate, version, module_type);

    for raw in self.dependencies {
      let target: Coordinate = raw.target.parse()?;
      let constraint = VersionReq::parse(&raw.version).map_err(|source| LoadError::InvalidConstraint {
        module: label.clone(),
        target: raw.target.clone(),
        input: raw.version.clone(),
        source,
      })?;
      let mut dep = DependencyRef::new(target, constraint, raw.scope.into());
      if raw.optional {
        dep = dep.optional();
      }
      module.dependencies.push(dep);
    }

    if let Some(produces) = self.produces {
      module.produces = produces.into_iter().collect();
    }
    module.capabilities = self.capabilities.iter().map(Capability::new).collect();
    module.requires = self.requires.iter().map(Capability::new).collect();
    module.skipped_checks = self.skipped_checks.as_deref().map(parse_check_list).unwrap_or_default();
    module.test_exclusions = self.exclude_tests;
    module.commands = self.commands;

    Ok(module)
  }
}

impl Registry {
  /// Parse a registry from TOML text.
  pub fn from_toml_str(input: &str) -> Result<Self, LoadError> {
    let file: RegistryFile = toml::from_str(input)?;
    let mut registry = Registry::new();
    for raw in file.modules {
      let module = raw.into_module()?;
      debug!(module = %module.label(), kind = %module.module_type, "registering module");
      registry.register(module)?;
    }
    Ok(registry)
  }

  /// Read and parse a registry file.
  pub fn load(path: &Path) -> Result<Self, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let registry = Self::from_toml_str(&content)?;
    info!(path = %path.display(), modules = registry.len(), "loaded module registry");
    Ok(registry)
  }
}
