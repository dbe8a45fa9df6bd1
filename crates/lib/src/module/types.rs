use std::collections::BTreeSet;
use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use super::Coordinate;
use crate::util::hash::Hashable;
use crate::variant::{CheckName, TargetEnvironment, TestMode, VariantContext};

/// Simulation front-end flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrontEndKind {
  /// Native stand-in for hardware-backed natives.
  Mock,
  /// Graphical board simulation.
  Panel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleType {
  Application,
  PlatformPort,
  Pack,
  Architecture,
  FrontEnd(FrontEndKind),
  Generator,
  ValidationSuite,
}

impl ModuleType {
  /// Artifacts a module of this type produces when its description does not say otherwise.
  pub fn default_artifacts(self) -> BTreeSet<ArtifactKind> {
    use ArtifactKind::*;
    let kinds: &[ArtifactKind] = match self {
      ModuleType::Application => &[Library, Executable],
      ModuleType::ValidationSuite => &[Library, TestReport],
      ModuleType::PlatformPort => &[Sources, Library],
      ModuleType::Pack | ModuleType::Architecture | ModuleType::FrontEnd(_) => &[Library],
      ModuleType::Generator => &[Tool],
    };
    kinds.iter().copied().collect()
  }

  /// Whether a root of this type needs exactly one platform port to run against.
  pub fn needs_environment(self) -> bool {
    matches!(self, ModuleType::Application | ModuleType::ValidationSuite)
  }
}

impl fmt::Display for ModuleType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ModuleType::Application => "application",
      ModuleType::PlatformPort => "platform-port",
      ModuleType::Pack => "pack",
      ModuleType::Architecture => "architecture",
      ModuleType::FrontEnd(FrontEndKind::Mock) => "mock",
      ModuleType::FrontEnd(FrontEndKind::Panel) => "front-panel",
      ModuleType::Generator => "generator",
      ModuleType::ValidationSuite => "validation-suite",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
  /// Generated code or resources.
  Sources,
  Library,
  Executable,
  /// An executable tool consumed by other modules' generate steps.
  Tool,
  TestReport,
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ArtifactKind::Sources => "sources",
      ArtifactKind::Library => "library",
      ArtifactKind::Executable => "executable",
      ArtifactKind::Tool => "tool",
      ArtifactKind::TestReport => "test-report",
    };
    f.write_str(s)
  }
}

/// How a dependency participates in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
  Implementation,
  /// The platform port ("VEE") an application or suite runs against.
  ExecutionEnvironment,
  ToolChain,
  TestOnly,
  FrontEndOnly,
}

impl Scope {
  /// Whether the dependency transits into the final artifact of the consumer's consumers.
  pub fn propagates(self) -> bool {
    matches!(self, Scope::Implementation | Scope::ExecutionEnvironment)
  }

  /// Whether an edge of this scope is followed under the given variant.
  pub fn is_active(self, variant: &VariantContext) -> bool {
    match self {
      Scope::TestOnly => variant.test_mode() != TestMode::None,
      Scope::FrontEndOnly => variant.target() == TargetEnvironment::Simulated,
      Scope::Implementation | Scope::ExecutionEnvironment | Scope::ToolChain => true,
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Scope::Implementation => "implementation",
      Scope::ExecutionEnvironment => "execution-environment",
      Scope::ToolChain => "toolchain",
      Scope::TestOnly => "test-only",
      Scope::FrontEndOnly => "front-end-only",
    };
    f.write_str(s)
  }
}

/// A feature a platform port offers and a pack may require (`UI`, `FS`, `NET`, ...).
///
/// Capabilities compare case-insensitively; they are stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
  pub fn new(name: impl AsRef<str>) -> Self {
    Self(name.as_ref().trim().to_ascii_uppercase())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for Capability {
  fn from(value: String) -> Self {
    Self::new(value)
  }
}

impl From<&str> for Capability {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<Capability> for String {
  fn from(value: Capability) -> Self {
    value.0
  }
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A declared edge from one module to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
  pub target: Coordinate,
  pub constraint: VersionReq,
  pub scope: Scope,
  pub required: bool,
}

impl DependencyRef {
  pub fn new(target: Coordinate, constraint: VersionReq, scope: Scope) -> Self {
    Self {
      target,
      constraint,
      scope,
      required: true,
    }
  }

  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }
}

/// Shell commands the bundled command toolchain runs for each step kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCommands {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub generate: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compile: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub package: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub test: Option<String>,
}

/// Immutable description of one module version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
  pub coordinate: Coordinate,
  pub version: Version,
  pub module_type: ModuleType,
  pub dependencies: Vec<DependencyRef>,
  pub produces: BTreeSet<ArtifactKind>,
  /// Features offered (platform ports).
  pub capabilities: BTreeSet<Capability>,
  /// Features needed from the selected platform port (packs).
  pub requires: BTreeSet<Capability>,
  pub skipped_checks: BTreeSet<CheckName>,
  /// Test-name glob patterns handed to the test runner untouched.
  pub test_exclusions: Vec<String>,
  pub commands: StepCommands,
}

impl Hashable for Module {}

impl Module {
  pub fn new(coordinate: Coordinate, version: Version, module_type: ModuleType) -> Self {
    Self {
      coordinate,
      version,
      module_type,
      dependencies: Vec::new(),
      produces: module_type.default_artifacts(),
      capabilities: BTreeSet::new(),
      requires: BTreeSet::new(),
      skipped_checks: BTreeSet::new(),
      test_exclusions: Vec::new(),
      commands: StepCommands::default(),
    }
  }

  pub fn with_dependency(mut self, dependency: DependencyRef) -> Self {
    self.dependencies.push(dependency);
    self
  }

  pub fn with_produces(mut self, kinds: impl IntoIterator<Item = ArtifactKind>) -> Self {
    self.produces = kinds.into_iter().collect();
    self
  }

  pub fn with_capabilities<C: Into<Capability>>(mut self, caps: impl IntoIterator<Item = C>) -> Self {
    self.capabilities = caps.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_requires<C: Into<Capability>>(mut self, caps: impl IntoIterator<Item = C>) -> Self {
    self.requires = caps.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_test_exclusions(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.test_exclusions = patterns.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_commands(mut self, commands: StepCommands) -> Self {
    self.commands = commands;
    self
  }

  pub fn produces(&self, kind: ArtifactKind) -> bool {
    self.produces.contains(&kind)
  }

  /// `namespace:name@version`, used in logs and error messages.
  pub fn label(&self) -> String {
    format!("{}@{}", self.coordinate, self.version)
  }
}

/// Parse a version, accepting the short `1` and `1.2` forms used in module descriptions.
pub fn parse_version(input: &str) -> Result<Version, semver::Error> {
  let trimmed = input.trim();
  let (core, rest) = match trimmed.find(['-', '+']) {
    Some(idx) => trimmed.split_at(idx),
    None => (trimmed, ""),
  };
  let padded = match core.matches('.').count() {
    0 => format!("{core}.0.0{rest}"),
    1 => format!("{core}.0{rest}"),
    _ => trimmed.to_string(),
  };
  Version::parse(&padded)
}
