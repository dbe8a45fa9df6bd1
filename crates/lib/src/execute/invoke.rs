//! Collaborator interfaces.
//!
//! The executor never generates, compiles or runs anything itself; it hands
//! each step to one of these traits. Implementations must be safe to call
//! concurrently for distinct steps.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::ModuleType;
use crate::plan::{ArtifactRef, StepId};
use crate::store::Artifact;
use crate::util::hash::ObjectHash;
use crate::variant::{CheckName, TargetEnvironment, VariantContext};

/// Everything a collaborator needs to run one step.
#[derive(Debug, Clone)]
pub struct StepRequest {
  pub step: StepId,
  pub key: ObjectHash,
  pub version: Version,
  pub module_type: ModuleType,
  pub command: Option<String>,
  /// Contents of the step's inputs, loaded from the store.
  pub inputs: Vec<Artifact>,
  /// Artifacts the step must return.
  pub outputs: BTreeSet<ArtifactRef>,
  pub skipped_checks: BTreeSet<CheckName>,
  pub variant: VariantContext,
}

#[derive(Debug, Clone, Default)]
pub struct StepOutput {
  pub artifacts: Vec<Artifact>,
}

impl StepOutput {
  pub fn new(artifacts: Vec<Artifact>) -> Self {
    Self { artifacts }
  }
}

#[derive(Debug, Clone)]
pub struct TestRequest {
  pub step: StepRequest,
  pub target: TargetEnvironment,
  /// Test-name globs, passed through uninterpreted.
  pub exclusions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOutcome {
  Passed,
  Failed,
  Skipped,
}

/// Per-test results of one `RunTests` step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
  pub results: BTreeMap<String, TestOutcome>,
}

impl TestReport {
  pub fn record(&mut self, name: impl Into<String>, outcome: TestOutcome) {
    self.results.insert(name.into(), outcome);
  }

  pub fn failed_tests(&self) -> Vec<String> {
    self
      .results
      .iter()
      .filter(|(_, o)| **o == TestOutcome::Failed)
      .map(|(name, _)| name.clone())
      .collect()
  }

  pub fn count(&self, outcome: TestOutcome) -> usize {
    self.results.values().filter(|o| **o == outcome).count()
  }
}

/// A collaborator failure, passed through to the step error unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", .exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
pub struct InvokeError {
  pub message: String,
  pub exit_code: Option<i32>,
}

impl InvokeError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      exit_code: None,
    }
  }

  pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
    self.exit_code = code;
    self
  }
}

#[async_trait]
pub trait Generator: Send + Sync {
  async fn generate(&self, request: &StepRequest) -> Result<StepOutput, InvokeError>;
}

#[async_trait]
pub trait Compiler: Send + Sync {
  async fn compile(&self, request: &StepRequest) -> Result<StepOutput, InvokeError>;

  async fn package(&self, request: &StepRequest) -> Result<StepOutput, InvokeError>;
}

#[async_trait]
pub trait TestRunner: Send + Sync {
  async fn run_tests(&self, request: &TestRequest) -> Result<TestReport, InvokeError>;
}

/// The set of collaborators a build runs with.
#[derive(Clone)]
pub struct Toolchain {
  pub generator: Arc<dyn Generator>,
  pub compiler: Arc<dyn Compiler>,
  pub test_runner: Arc<dyn TestRunner>,
}

impl Toolchain {
  pub fn new(generator: Arc<dyn Generator>, compiler: Arc<dyn Compiler>, test_runner: Arc<dyn TestRunner>) -> Self {
    Self {
      generator,
      compiler,
      test_runner,
    }
  }

  /// Use one value for all three roles.
  pub fn uniform<T>(collaborator: Arc<T>) -> Self
  where
    T: Generator + Compiler + TestRunner + 'static,
  {
    Self {
      generator: collaborator.clone(),
      compiler: collaborator.clone(),
      test_runner: collaborator,
    }
  }
}

impl std::fmt::Debug for Toolchain {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Toolchain").finish_non_exhaustive()
  }
}
