//! The engine ties resolution, planning and execution together.
//!
//! Resolution and plan compilation are pure, so their results are cached:
//! closures by `(root, version, variant, registry snapshot)` and plans by the
//! closure's content hash. Repeated calls return the same shared value.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use semver::Version;
use thiserror::Error;
use tracing::{debug, info};

use crate::execute::{CancelToken, ExecuteConfig, ExecuteError, ExecutionReport, Toolchain, execute};
use crate::module::Coordinate;
use crate::plan::{BuildPlan, PlanError, compile};
use crate::registry::{Registry, RegistryError};
use crate::resolve::{ResolveError, ResolvedClosure, resolve};
use crate::store::ArtifactStore;
use crate::util::hash::{HashError, ObjectHash};
use crate::variant::VariantContext;

/// Errors that stop a request before or outside step execution.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("failed to hash: {0}")]
  Hash(#[from] HashError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolveKey {
  root: Coordinate,
  version: Version,
  variant: ObjectHash,
  snapshot: ObjectHash,
}

pub struct Engine {
  registry: Arc<Registry>,
  snapshot: ObjectHash,
  toolchain: Toolchain,
  store: Arc<dyn ArtifactStore>,
  config: ExecuteConfig,
  closures: Mutex<HashMap<ResolveKey, Arc<ResolvedClosure>>>,
  plans: Mutex<HashMap<ObjectHash, Arc<BuildPlan>>>,
}

impl Engine {
  pub fn new(
    registry: Arc<Registry>,
    toolchain: Toolchain,
    store: Arc<dyn ArtifactStore>,
    config: ExecuteConfig,
  ) -> Result<Self, EngineError> {
    let snapshot = registry.snapshot_version()?;
    debug!(snapshot = %snapshot, modules = registry.len(), "engine created");
    Ok(Self {
      registry,
      snapshot,
      toolchain,
      store,
      config,
      closures: Mutex::new(HashMap::new()),
      plans: Mutex::new(HashMap::new()),
    })
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  /// Resolve the highest registered version of `root`.
  pub fn resolve(&self, root: &Coordinate, variant: &VariantContext) -> Result<Arc<ResolvedClosure>, EngineError> {
    let version = self.registry.latest(root)?.version.clone();
    self.resolve_version(root, &version, variant)
  }

  pub fn resolve_version(
    &self,
    root: &Coordinate,
    version: &Version,
    variant: &VariantContext,
  ) -> Result<Arc<ResolvedClosure>, EngineError> {
    let key = ResolveKey {
      root: root.clone(),
      version: version.clone(),
      variant: variant.content_hash()?,
      snapshot: self.snapshot.clone(),
    };
    if let Some(closure) = self.closures.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
      debug!(root = %root, version = %version, "resolution cache hit");
      return Ok(closure.clone());
    }

    let closure = Arc::new(resolve(&self.registry, root, version, variant)?);
    self
      .closures
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key, closure.clone());
    Ok(closure)
  }

  /// Plan a build of the highest registered version of `root`.
  pub fn plan(&self, root: &Coordinate, variant: &VariantContext) -> Result<Arc<BuildPlan>, EngineError> {
    let closure = self.resolve(root, variant)?;
    self.plan_closure(&closure)
  }

  pub fn plan_version(
    &self,
    root: &Coordinate,
    version: &Version,
    variant: &VariantContext,
  ) -> Result<Arc<BuildPlan>, EngineError> {
    let closure = self.resolve_version(root, version, variant)?;
    self.plan_closure(&closure)
  }

  /// Compile `closure`, reusing an earlier plan for an identical closure.
  pub fn plan_closure(&self, closure: &ResolvedClosure) -> Result<Arc<BuildPlan>, EngineError> {
    let key = closure.content_hash()?;
    if let Some(plan) = self.plans.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
      debug!(closure = %key, "plan cache hit");
      return Ok(plan.clone());
    }

    let plan = Arc::new(compile(closure)?);
    self
      .plans
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key, plan.clone());
    Ok(plan)
  }

  /// Build the highest registered version of `root`.
  ///
  /// Resolution and planning errors are returned; step failures are in the report.
  pub async fn build(
    &self,
    root: &Coordinate,
    variant: &VariantContext,
    cancel: &CancelToken,
  ) -> Result<ExecutionReport, EngineError> {
    let plan = self.plan(root, variant)?;
    self.run(&plan, cancel).await
  }

  pub async fn build_version(
    &self,
    root: &Coordinate,
    version: &Version,
    variant: &VariantContext,
    cancel: &CancelToken,
  ) -> Result<ExecutionReport, EngineError> {
    let plan = self.plan_version(root, version, variant)?;
    self.run(&plan, cancel).await
  }

  async fn run(&self, plan: &BuildPlan, cancel: &CancelToken) -> Result<ExecutionReport, EngineError> {
    info!(root = %plan.root, variant = %plan.variant, steps = plan.len(), "building");
    let report = execute(plan, &self.toolchain, self.store.clone(), &self.config, cancel).await?;
    Ok(report)
  }
}

impl std::fmt::Debug for Engine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Engine")
      .field("snapshot", &self.snapshot)
      .field("modules", &self.registry.len())
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}
