//! Types for plan execution.
//!
//! This module defines the per-step outcomes, the execution report and the
//! configuration for running a [`BuildPlan`](crate::plan::BuildPlan).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use super::invoke::{InvokeError, TestReport};
use crate::plan::{ArtifactRef, StepId};
use crate::store::StoreError;
use crate::util::hash::ObjectHash;

/// Identifies the failed step that caused a step to be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
  pub failed: StepId,
}

impl std::fmt::Display for UpstreamFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "upstream step {} failed", self.failed)
  }
}

/// Errors local to one step. They never abort the rest of the plan.
#[derive(Debug, Error)]
pub enum StepError {
  #[error("generator failed: {0}")]
  GeneratorFailure(#[source] InvokeError),

  #[error("compiler failed: {0}")]
  CompileFailure(#[source] InvokeError),

  #[error("test runner failed: {0}")]
  TestRunFailure(#[source] InvokeError),

  #[error("{} test(s) failed: {}", .failed.len(), .failed.join(", "))]
  TestsFailed { failed: Vec<String> },

  #[error("step did not produce {artifact}")]
  MissingOutput { artifact: ArtifactRef },

  #[error("invalid test report: {0}")]
  Report(#[from] serde_json::Error),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("step task panicked: {0}")]
  Panicked(String),
}

/// Errors that abort execution as a whole.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("executor task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// Final state of one step.
#[derive(Debug)]
pub enum StepStatus {
  /// A collaborator ran and the outputs were stored.
  Succeeded,
  /// The store already held outputs for the step's key.
  UpToDate,
  Failed(StepError),
  Skipped(UpstreamFailure),
  /// Never started because the build was cancelled.
  Cancelled,
}

impl StepStatus {
  /// Whether the step's outputs are available.
  pub fn is_ok(&self) -> bool {
    matches!(self, StepStatus::Succeeded | StepStatus::UpToDate)
  }

  pub fn label(&self) -> &'static str {
    match self {
      StepStatus::Succeeded => "succeeded",
      StepStatus::UpToDate => "up-to-date",
      StepStatus::Failed(_) => "failed",
      StepStatus::Skipped(_) => "skipped",
      StepStatus::Cancelled => "cancelled",
    }
  }
}

#[derive(Debug)]
pub struct StepReport {
  pub id: StepId,
  pub key: ObjectHash,
  pub status: StepStatus,
  /// Set for `RunTests` steps that ran or were up to date.
  pub test_report: Option<TestReport>,
  /// Wall time of the step, when it was started.
  pub duration: Option<Duration>,
}

/// Outcome of executing a plan, with one entry per step in plan order.
#[derive(Debug, Default)]
pub struct ExecutionReport {
  pub steps: Vec<StepReport>,
  pub elapsed: Duration,
}

impl ExecutionReport {
  /// True when every step succeeded or was up to date.
  pub fn is_success(&self) -> bool {
    self.steps.iter().all(|s| s.status.is_ok())
  }

  pub fn get(&self, id: &StepId) -> Option<&StepReport> {
    self.steps.iter().find(|s| &s.id == id)
  }

  pub fn succeeded(&self) -> usize {
    self.count(|s| matches!(s, StepStatus::Succeeded))
  }

  pub fn up_to_date(&self) -> usize {
    self.count(|s| matches!(s, StepStatus::UpToDate))
  }

  pub fn failed(&self) -> usize {
    self.count(|s| matches!(s, StepStatus::Failed(_)))
  }

  pub fn skipped(&self) -> usize {
    self.count(|s| matches!(s, StepStatus::Skipped(_)))
  }

  pub fn cancelled(&self) -> usize {
    self.count(|s| matches!(s, StepStatus::Cancelled))
  }

  /// Failed steps with their errors.
  pub fn failures(&self) -> impl Iterator<Item = (&StepId, &StepError)> {
    self.steps.iter().filter_map(|s| match &s.status {
      StepStatus::Failed(err) => Some((&s.id, err)),
      _ => None,
    })
  }

  fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
    self.steps.iter().filter(|s| pred(&s.status)).count()
  }
}

/// Configuration for plan execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of steps in flight.
  pub parallelism: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Cooperative cancellation flag shared between a build and its caller.
///
/// Cancelling stops new steps from starting; steps already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}
