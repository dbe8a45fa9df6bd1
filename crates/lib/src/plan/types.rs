//! Build plan data types.

use std::collections::BTreeSet;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::{ArtifactKind, Coordinate, ModuleType};
use crate::util::hash::{HashError, Hashable, ObjectHash};
use crate::variant::{CheckName, VariantContext, VariantError};

/// The kind of work a step performs.
///
/// The declaration order doubles as the tie-break order between steps of
/// one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
  Generate,
  Compile,
  Package,
  RunTests,
}

impl fmt::Display for StepKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      StepKind::Generate => "generate",
      StepKind::Compile => "compile",
      StepKind::Package => "package",
      StepKind::RunTests => "run-tests",
    })
  }
}

/// An artifact of a given kind produced for a module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
  pub coordinate: Coordinate,
  pub kind: ArtifactKind,
}

impl ArtifactRef {
  pub fn new(coordinate: Coordinate, kind: ArtifactKind) -> Self {
    Self { coordinate, kind }
  }
}

impl fmt::Display for ArtifactRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[{}]", self.coordinate, self.kind)
  }
}

/// Identifies a step: a closure holds one version per coordinate and a
/// module has at most one step per kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId {
  pub coordinate: Coordinate,
  pub kind: StepKind,
}

impl StepId {
  pub fn new(coordinate: Coordinate, kind: StepKind) -> Self {
    Self { coordinate, kind }
  }
}

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.coordinate, self.kind)
  }
}

/// One unit of work in a [`BuildPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
  pub id: StepId,
  pub version: Version,
  pub module_type: ModuleType,
  /// Artifacts read by the step, each produced by exactly one earlier step.
  pub inputs: BTreeSet<ArtifactRef>,
  pub outputs: BTreeSet<ArtifactRef>,
  /// Steps producing `inputs`.
  pub depends_on: BTreeSet<StepId>,
  pub idempotency_key: ObjectHash,
  /// Checks skipped for this step: the variant's list plus the module's own.
  pub skipped_checks: BTreeSet<CheckName>,
  /// Test-name globs, only set on `RunTests` steps.
  pub test_exclusions: Vec<String>,
  pub command: Option<String>,
}

impl BuildStep {
  pub fn label(&self) -> String {
    format!("{}@{}#{}", self.id.coordinate, self.version, self.id.kind)
  }
}

/// A topologically ordered list of steps building one root under one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
  pub root: Coordinate,
  pub variant: VariantContext,
  pub steps: Vec<BuildStep>,
}

impl Hashable for BuildPlan {}

impl BuildPlan {
  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn get(&self, id: &StepId) -> Option<&BuildStep> {
    self.steps.iter().find(|s| &s.id == id)
  }

  /// Position of a step in plan order.
  pub fn position(&self, id: &StepId) -> Option<usize> {
    self.steps.iter().position(|s| &s.id == id)
  }

  /// Steps that directly consume an output of `id`, in plan order.
  pub fn dependents(&self, id: &StepId) -> Vec<&StepId> {
    self
      .steps
      .iter()
      .filter(|s| s.depends_on.contains(id))
      .map(|s| &s.id)
      .collect()
  }

  /// The step producing `artifact`.
  pub fn producer_of(&self, artifact: &ArtifactRef) -> Option<&BuildStep> {
    self.steps.iter().find(|s| s.outputs.contains(artifact))
  }

  pub fn content_hash(&self) -> Result<ObjectHash, HashError> {
    self.compute_hash()
  }
}

#[derive(Debug, Error)]
pub enum PlanError {
  #[error("build steps form a cycle: {}", .steps.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
  StepCycle { steps: Vec<StepId> },

  #[error("{artifact} is produced by both {first} and {second}")]
  DuplicateOutput {
    artifact: ArtifactRef,
    first: StepId,
    second: StepId,
  },

  #[error("{module} skips checks this variant requires: {source}")]
  InvalidVariant {
    module: Coordinate,
    #[source]
    source: VariantError,
  },

  #[error("failed to hash step inputs: {0}")]
  Hash(#[from] HashError),
}
