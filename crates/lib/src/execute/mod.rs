//! Plan execution.
//!
//! Runs the steps of a [`BuildPlan`] on a bounded worker pool:
//! - every step keeps a countdown of unfinished producers and becomes ready
//!   when it reaches zero
//! - ready steps start in plan order, at most `parallelism` at a time
//! - a step whose idempotency key is already in the store is up to date and
//!   no collaborator is called
//! - a failed step skips everything downstream of it; independent branches
//!   keep going
//! - cancelling stops new steps from starting and reports them `Cancelled`

pub mod command;
pub mod invoke;
pub mod types;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::module::ArtifactKind;
use crate::plan::{ArtifactRef, BuildPlan, BuildStep, StepKind};
use crate::store::{Artifact, ArtifactStore, StoredArtifacts};
use crate::util::hash::ObjectHash;
use crate::variant::VariantContext;

pub use command::CommandToolchain;
pub use invoke::{
  Compiler, Generator, InvokeError, StepOutput, StepRequest, TestOutcome, TestReport, TestRequest, TestRunner,
  Toolchain,
};
pub use types::{
  CancelToken, ExecuteConfig, ExecuteError, ExecutionReport, StepError, StepReport, StepStatus, UpstreamFailure,
};

/// A finished step that produced (or already had) its outputs.
struct Completed {
  up_to_date: bool,
  test_report: Option<TestReport>,
}

/// Everything a spawned step needs, owned so the task is `'static`.
struct StepTask {
  step: BuildStep,
  /// Each input with the key its producer stored it under.
  sources: Vec<(ArtifactRef, ObjectHash)>,
  variant: VariantContext,
  toolchain: Toolchain,
  store: Arc<dyn ArtifactStore>,
}

/// Execute a plan.
///
/// Step failures are recorded in the report; only executor faults are
/// returned as errors.
pub async fn execute(
  plan: &BuildPlan,
  toolchain: &Toolchain,
  store: Arc<dyn ArtifactStore>,
  config: &ExecuteConfig,
  cancel: &CancelToken,
) -> Result<ExecutionReport, ExecuteError> {
  let start = Instant::now();
  let parallelism = config.parallelism.max(1);
  info!(root = %plan.root, steps = plan.len(), parallelism, "starting plan execution");

  let index: BTreeMap<_, usize> = plan.steps.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();
  let keys_by_output: BTreeMap<&ArtifactRef, &ObjectHash> = plan
    .steps
    .iter()
    .flat_map(|s| s.outputs.iter().map(move |o| (o, &s.idempotency_key)))
    .collect();

  let mut remaining: Vec<usize> = vec![0; plan.len()];
  let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plan.len()];
  for (i, step) in plan.steps.iter().enumerate() {
    for dep in &step.depends_on {
      if let Some(&d) = index.get(dep) {
        remaining[i] += 1;
        dependents[d].push(i);
      }
    }
  }

  let mut statuses: Vec<Option<StepStatus>> = (0..plan.len()).map(|_| None).collect();
  let mut test_reports: Vec<Option<TestReport>> = vec![None; plan.len()];
  let mut durations: Vec<Option<Duration>> = vec![None; plan.len()];
  let mut started: Vec<Option<Instant>> = vec![None; plan.len()];

  let mut ready: BTreeSet<usize> = (0..plan.len()).filter(|&i| remaining[i] == 0).collect();
  let semaphore = Arc::new(Semaphore::new(parallelism));
  let mut join_set = JoinSet::new();

  loop {
    while join_set.len() < parallelism && !cancel.is_cancelled() {
      let Some(i) = ready.pop_first() else {
        break;
      };
      let step = &plan.steps[i];
      let sources = step
        .inputs
        .iter()
        .filter_map(|input| keys_by_output.get(input).map(|key| (input.clone(), (*key).clone())))
        .collect();
      let task = StepTask {
        step: step.clone(),
        sources,
        variant: plan.variant.clone(),
        toolchain: toolchain.clone(),
        store: store.clone(),
      };
      let semaphore = semaphore.clone();

      debug!(step = %step.id, key = %step.idempotency_key, "starting step");
      started[i] = Some(Instant::now());
      join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.ok();
        // Run on a separate task so a panicking collaborator fails only this step.
        let result = match tokio::spawn(run_step(task)).await {
          Ok(result) => result,
          Err(err) => Err(StepError::Panicked(err.to_string())),
        };
        (i, result)
      });
    }

    let Some(joined) = join_set.join_next().await else {
      break;
    };
    let (i, result) = joined?;
    let id = &plan.steps[i].id;
    durations[i] = started[i].map(|t| t.elapsed());

    match result {
      Ok(done) => {
        if done.up_to_date {
          info!(step = %id, "step up to date");
        } else {
          info!(step = %id, "step succeeded");
        }
        test_reports[i] = done.test_report;
        statuses[i] = Some(if done.up_to_date {
          StepStatus::UpToDate
        } else {
          StepStatus::Succeeded
        });
        for &d in &dependents[i] {
          remaining[d] -= 1;
          if remaining[d] == 0 && statuses[d].is_none() {
            ready.insert(d);
          }
        }
      }
      Err(err) => {
        error!(step = %id, error = %err, "step failed");
        statuses[i] = Some(StepStatus::Failed(err));
        skip_downstream(plan, i, &dependents, &mut statuses);
      }
    }
  }

  if cancel.is_cancelled() {
    warn!("build cancelled, remaining steps were not started");
  }

  let steps: Vec<StepReport> = plan
    .steps
    .iter()
    .zip(statuses)
    .zip(test_reports)
    .zip(durations)
    .map(|(((step, status), test_report), duration)| StepReport {
      id: step.id.clone(),
      key: step.idempotency_key.clone(),
      status: status.unwrap_or(StepStatus::Cancelled),
      test_report,
      duration,
    })
    .collect();

  let report = ExecutionReport {
    steps,
    elapsed: start.elapsed(),
  };
  info!(
    succeeded = report.succeeded(),
    up_to_date = report.up_to_date(),
    failed = report.failed(),
    skipped = report.skipped(),
    cancelled = report.cancelled(),
    "plan execution complete"
  );
  Ok(report)
}

/// Mark every not-yet-finished step downstream of `failed` as skipped.
fn skip_downstream(plan: &BuildPlan, failed: usize, dependents: &[Vec<usize>], statuses: &mut [Option<StepStatus>]) {
  let failed_id = &plan.steps[failed].id;
  let mut queue: VecDeque<usize> = dependents[failed].iter().copied().collect();
  while let Some(d) = queue.pop_front() {
    if statuses[d].is_some() {
      continue;
    }
    warn!(step = %plan.steps[d].id, failed_dep = %failed_id, "skipping step due to failed dependency");
    statuses[d] = Some(StepStatus::Skipped(UpstreamFailure {
      failed: failed_id.clone(),
    }));
    queue.extend(dependents[d].iter().copied());
  }
}

async fn run_step(task: StepTask) -> Result<Completed, StepError> {
  let step = &task.step;
  let key = &step.idempotency_key;

  if task.store.exists(key).await? {
    let test_report = match step.id.kind {
      StepKind::RunTests => stored_test_report(&*task.store, step).await?,
      _ => None,
    };
    return Ok(Completed {
      up_to_date: true,
      test_report,
    });
  }

  let mut inputs = Vec::with_capacity(task.sources.len());
  let mut cache: BTreeMap<&ObjectHash, StoredArtifacts> = BTreeMap::new();
  for (reference, producer_key) in &task.sources {
    if !cache.contains_key(producer_key) {
      cache.insert(producer_key, task.store.read(producer_key).await?);
    }
    if let Some(artifact) = cache.get(producer_key).and_then(|stored| stored.get(reference)) {
      inputs.push(artifact.clone());
    }
  }

  let request = StepRequest {
    step: step.id.clone(),
    key: key.clone(),
    version: step.version.clone(),
    module_type: step.module_type,
    command: step.command.clone(),
    inputs,
    outputs: step.outputs.clone(),
    skipped_checks: step.skipped_checks.clone(),
    variant: task.variant.clone(),
  };

  let toolchain = &task.toolchain;
  let (artifacts, test_report) = match step.id.kind {
    StepKind::Generate => {
      let output = toolchain
        .generator
        .generate(&request)
        .await
        .map_err(StepError::GeneratorFailure)?;
      (output.artifacts, None)
    }
    StepKind::Compile => {
      let output = toolchain
        .compiler
        .compile(&request)
        .await
        .map_err(StepError::CompileFailure)?;
      (output.artifacts, None)
    }
    StepKind::Package => {
      let output = toolchain
        .compiler
        .package(&request)
        .await
        .map_err(StepError::CompileFailure)?;
      (output.artifacts, None)
    }
    StepKind::RunTests => {
      let test_request = TestRequest {
        target: task.variant.target(),
        exclusions: step.test_exclusions.clone(),
        step: request,
      };
      let report = toolchain
        .test_runner
        .run_tests(&test_request)
        .await
        .map_err(StepError::TestRunFailure)?;
      let failed = report.failed_tests();
      if !failed.is_empty() {
        return Err(StepError::TestsFailed { failed });
      }
      let artifacts = step
        .outputs
        .iter()
        .filter(|o| o.kind == ArtifactKind::TestReport)
        .map(|o| Ok(Artifact::new(o.clone(), serde_json::to_vec(&report)?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
      (artifacts, Some(report))
    }
  };

  let mut stored = StoredArtifacts::default();
  for output in &step.outputs {
    let artifact = artifacts
      .iter()
      .find(|a| &a.reference == output)
      .ok_or_else(|| StepError::MissingOutput {
        artifact: output.clone(),
      })?;
    stored.artifacts.push(artifact.clone());
  }
  task.store.write(key, &stored).await?;

  Ok(Completed {
    up_to_date: false,
    test_report,
  })
}

async fn stored_test_report(store: &dyn ArtifactStore, step: &BuildStep) -> Result<Option<TestReport>, StepError> {
  let stored = store.read(&step.idempotency_key).await?;
  let report = stored
    .artifacts
    .iter()
    .find(|a| a.reference.kind == ArtifactKind::TestReport)
    .map(|a| serde_json::from_slice(&a.data))
    .transpose()?;
  Ok(report)
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;
  use semver::{Version, VersionReq};
  use tokio::sync::Notify;

  use super::*;
  use crate::module::{Coordinate, DependencyRef, Module, ModuleType, Scope};
  use crate::plan::{StepId, compile};
  use crate::registry::Registry;
  use crate::resolve::resolve;
  use crate::store::MemoryArtifactStore;
  use crate::variant::TestMode;

  /// Records every call and fails the steps it is told to.
  #[derive(Default)]
  struct FakeToolchain {
    calls: Mutex<Vec<StepId>>,
    fail: BTreeSet<StepId>,
    panic_on: Option<StepId>,
    failing_tests: Vec<String>,
  }

  impl FakeToolchain {
    fn failing(steps: impl IntoIterator<Item = StepId>) -> Self {
      Self {
        fail: steps.into_iter().collect(),
        ..Self::default()
      }
    }

    fn calls(&self) -> Vec<StepId> {
      self.calls.lock().unwrap().clone()
    }

    fn invoke(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.calls.lock().unwrap().push(request.step.clone());
      if self.panic_on.as_ref() == Some(&request.step) {
        panic!("{} crashed", request.step);
      }
      if self.fail.contains(&request.step) {
        return Err(InvokeError::new(format!("{} exploded", request.step)).with_exit_code(Some(1)));
      }
      let inputs: Vec<String> = request.inputs.iter().map(|a| a.reference.to_string()).collect();
      let artifacts = request
        .outputs
        .iter()
        .map(|o| Artifact::new(o.clone(), format!("{} <- [{}]", o, inputs.join(","))))
        .collect();
      Ok(StepOutput::new(artifacts))
    }
  }

  #[async_trait]
  impl Generator for FakeToolchain {
    async fn generate(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.invoke(request)
    }
  }

  #[async_trait]
  impl Compiler for FakeToolchain {
    async fn compile(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.invoke(request)
    }

    async fn package(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.invoke(request)
    }
  }

  #[async_trait]
  impl TestRunner for FakeToolchain {
    async fn run_tests(&self, request: &TestRequest) -> Result<TestReport, InvokeError> {
      self.invoke(&request.step)?;
      let mut report = TestReport::default();
      report.record("LabelTest", TestOutcome::Passed);
      for name in &self.failing_tests {
        report.record(name.clone(), TestOutcome::Failed);
      }
      for pattern in &request.exclusions {
        report.record(pattern.clone(), TestOutcome::Skipped);
      }
      Ok(report)
    }
  }

  fn c(name: &str) -> Coordinate {
    Coordinate::local(name)
  }

  fn id(name: &str, kind: StepKind) -> StepId {
    StepId::new(c(name), kind)
  }

  fn dep(target: &str, scope: Scope) -> DependencyRef {
    DependencyRef::new(c(target), VersionReq::STAR, scope)
  }

  /// app -> port, ui, net; ui -> gfx. net is an independent branch.
  fn modules(ui_version: u64) -> Vec<Module> {
    vec![
      Module::new(c("app"), Version::new(1, 0, 0), ModuleType::Application)
        .with_dependency(dep("port", Scope::ExecutionEnvironment))
        .with_dependency(dep("ui", Scope::Implementation))
        .with_dependency(dep("net", Scope::Implementation)),
      Module::new(c("port"), Version::new(1, 0, 0), ModuleType::PlatformPort),
      Module::new(c("ui"), Version::new(ui_version, 0, 0), ModuleType::Pack)
        .with_dependency(dep("gfx", Scope::Implementation)),
      Module::new(c("gfx"), Version::new(1, 0, 0), ModuleType::Pack),
      Module::new(c("net"), Version::new(1, 0, 0), ModuleType::Pack),
    ]
  }

  fn plan(modules: Vec<Module>, variant: &VariantContext, root: &str) -> BuildPlan {
    let registry = Registry::from_modules(modules).unwrap();
    let closure = resolve(&registry, &c(root), &Version::new(1, 0, 0), variant).unwrap();
    compile(&closure).unwrap()
  }

  fn config(parallelism: usize) -> ExecuteConfig {
    ExecuteConfig { parallelism }
  }

  #[tokio::test]
  async fn runs_every_step_once_in_dependency_order() {
    let plan = plan(modules(2), &VariantContext::default(), "app");
    let fake = Arc::new(FakeToolchain::default());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = execute(&plan, &Toolchain::uniform(fake.clone()), store.clone(), &config(4), &CancelToken::new())
      .await
      .unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded(), plan.len());
    assert_eq!(store.len(), plan.len());

    let calls = fake.calls();
    assert_eq!(calls.len(), plan.len());
    for step in &plan.steps {
      let pos = calls.iter().position(|c| c == &step.id).unwrap();
      for producer in &step.depends_on {
        assert!(calls.iter().position(|c| c == producer).unwrap() < pos);
      }
    }

    let package = plan.get(&id("app", StepKind::Package)).unwrap();
    let stored = store.read(&package.idempotency_key).await.unwrap();
    let text = String::from_utf8(stored.artifacts[0].data.clone()).unwrap();
    assert!(text.contains("default:gfx[library]"));
  }

  #[tokio::test]
  async fn single_worker_follows_plan_order() {
    let plan = plan(modules(2), &VariantContext::default(), "app");
    let fake = Arc::new(FakeToolchain::default());

    execute(
      &plan,
      &Toolchain::uniform(fake.clone()),
      Arc::new(MemoryArtifactStore::new()),
      &config(1),
      &CancelToken::new(),
    )
    .await
    .unwrap();

    let expected: Vec<StepId> = plan.steps.iter().map(|s| s.id.clone()).collect();
    assert_eq!(fake.calls(), expected);
  }

  #[tokio::test]
  async fn failure_skips_only_downstream_steps() {
    let plan = plan(modules(2), &VariantContext::default(), "app");
    let gfx = id("gfx", StepKind::Compile);
    let fake = Arc::new(FakeToolchain::failing([gfx.clone()]));
    let store = Arc::new(MemoryArtifactStore::new());

    let report = execute(&plan, &Toolchain::uniform(fake.clone()), store.clone(), &config(2), &CancelToken::new())
      .await
      .unwrap();

    assert!(!report.is_success());
    let status = |name: &str, kind| &report.get(&id(name, kind)).unwrap().status;

    assert!(matches!(
      status("gfx", StepKind::Compile),
      StepStatus::Failed(StepError::CompileFailure(InvokeError { exit_code: Some(1), .. }))
    ));
    for (name, kind) in [
      ("ui", StepKind::Compile),
      ("app", StepKind::Compile),
      ("app", StepKind::Package),
    ] {
      match status(name, kind) {
        StepStatus::Skipped(UpstreamFailure { failed }) => assert_eq!(failed, &gfx),
        other => panic!("{name} should be skipped, got {other:?}"),
      }
    }
    assert!(matches!(status("net", StepKind::Compile), StepStatus::Succeeded));
    assert!(matches!(status("port", StepKind::Compile), StepStatus::Succeeded));

    // Failed and skipped steps store nothing.
    let gfx_key = &plan.get(&gfx).unwrap().idempotency_key;
    assert!(!store.exists(gfx_key).await.unwrap());
    assert_eq!(store.len(), report.succeeded());
  }

  #[tokio::test]
  async fn rerun_is_up_to_date_and_bump_reruns_downstream() {
    let store: Arc<MemoryArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let first = plan(modules(2), &VariantContext::default(), "app");
    execute(
      &first,
      &Toolchain::uniform(Arc::new(FakeToolchain::default())),
      store.clone(),
      &config(4),
      &CancelToken::new(),
    )
    .await
    .unwrap();

    let fake = Arc::new(FakeToolchain::default());
    let again = execute(&first, &Toolchain::uniform(fake.clone()), store.clone(), &config(4), &CancelToken::new())
      .await
      .unwrap();
    assert_eq!(again.up_to_date(), first.len());
    assert!(fake.calls().is_empty());

    // ui 2.0.0 -> 3.0.0 re-runs ui and the application, nothing else.
    let bumped = plan(modules(3), &VariantContext::default(), "app");
    let fake = Arc::new(FakeToolchain::default());
    let report = execute(&bumped, &Toolchain::uniform(fake.clone()), store, &config(4), &CancelToken::new())
      .await
      .unwrap();
    let mut rerun = fake.calls();
    rerun.sort();
    assert_eq!(
      rerun,
      vec![
        id("app", StepKind::Compile),
        id("app", StepKind::Package),
        id("ui", StepKind::Compile),
      ]
    );
    assert_eq!(report.up_to_date(), bumped.len() - 3);
  }

  /// Blocks every step until released, so a test can cancel mid-build.
  struct GatedToolchain {
    inner: FakeToolchain,
    started: Notify,
    release: Notify,
  }

  #[async_trait]
  impl Compiler for GatedToolchain {
    async fn compile(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.started.notify_one();
      self.release.notified().await;
      self.inner.invoke(request)
    }

    async fn package(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.inner.invoke(request)
    }
  }

  #[async_trait]
  impl Generator for GatedToolchain {
    async fn generate(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
      self.inner.invoke(request)
    }
  }

  #[async_trait]
  impl TestRunner for GatedToolchain {
    async fn run_tests(&self, request: &TestRequest) -> Result<TestReport, InvokeError> {
      self.inner.run_tests(request).await
    }
  }

  #[tokio::test]
  async fn cancellation_finishes_in_flight_and_cancels_the_rest() {
    let plan = plan(modules(2), &VariantContext::default(), "app");
    let gated = Arc::new(GatedToolchain {
      inner: FakeToolchain::default(),
      started: Notify::new(),
      release: Notify::new(),
    });
    let cancel = CancelToken::new();

    let run = {
      let plan = plan.clone();
      let toolchain = Toolchain::uniform(gated.clone());
      let cancel = cancel.clone();
      tokio::spawn(async move {
        execute(
          &plan,
          &toolchain,
          Arc::new(MemoryArtifactStore::new()),
          &config(1),
          &cancel,
        )
        .await
      })
    };

    gated.started.notified().await;
    cancel.cancel();
    gated.release.notify_one();

    let report = run.await.unwrap().unwrap();
    let first = &report.steps[0];
    assert!(matches!(first.status, StepStatus::Succeeded));
    assert!(first.duration.is_some());
    assert_eq!(report.cancelled(), plan.len() - 1);
    assert!(report.steps[1..].iter().all(|s| s.duration.is_none()));
    assert_eq!(gated.inner.calls().len(), 1);
  }

  fn suite_modules() -> Vec<Module> {
    vec![
      Module::new(c("suite"), Version::new(1, 0, 0), ModuleType::ValidationSuite)
        .with_dependency(dep("port", Scope::ExecutionEnvironment))
        .with_test_exclusions(["*AllTestClasses"]),
      Module::new(c("port"), Version::new(1, 0, 0), ModuleType::PlatformPort),
    ]
  }

  #[tokio::test]
  async fn test_reports_are_kept_and_replayed() {
    let variant = VariantContext::builder().test_mode(TestMode::Unit).build().unwrap();
    let plan = plan(suite_modules(), &variant, "suite");
    let store = Arc::new(MemoryArtifactStore::new());
    let run_tests = id("suite", StepKind::RunTests);

    let report = execute(
      &plan,
      &Toolchain::uniform(Arc::new(FakeToolchain::default())),
      store.clone(),
      &config(2),
      &CancelToken::new(),
    )
    .await
    .unwrap();
    let tests = report.get(&run_tests).unwrap().test_report.clone().unwrap();
    assert_eq!(tests.results["*AllTestClasses"], TestOutcome::Skipped);

    let again = execute(
      &plan,
      &Toolchain::uniform(Arc::new(FakeToolchain::default())),
      store,
      &config(2),
      &CancelToken::new(),
    )
    .await
    .unwrap();
    let replayed = again.get(&run_tests).unwrap();
    assert!(matches!(replayed.status, StepStatus::UpToDate));
    assert_eq!(replayed.test_report.as_ref(), Some(&tests));
  }

  #[tokio::test]
  async fn failing_tests_fail_the_step() {
    let variant = VariantContext::builder().test_mode(TestMode::Unit).build().unwrap();
    let plan = plan(suite_modules(), &variant, "suite");
    let fake = Arc::new(FakeToolchain {
      failing_tests: vec!["ButtonTest".to_string()],
      ..FakeToolchain::default()
    });
    let store = Arc::new(MemoryArtifactStore::new());

    let report = execute(&plan, &Toolchain::uniform(fake), store.clone(), &config(2), &CancelToken::new())
      .await
      .unwrap();

    let run = report.get(&id("suite", StepKind::RunTests)).unwrap();
    match &run.status {
      StepStatus::Failed(StepError::TestsFailed { failed }) => assert_eq!(failed, &vec!["ButtonTest".to_string()]),
      other => panic!("expected TestsFailed, got {other:?}"),
    }
    assert!(!store.exists(&run.key).await.unwrap());
  }

  /// Returns nothing at all, to exercise output validation.
  struct Forgetful;

  #[async_trait]
  impl Generator for Forgetful {
    async fn generate(&self, _: &StepRequest) -> Result<StepOutput, InvokeError> {
      Ok(StepOutput::default())
    }
  }

  #[async_trait]
  impl Compiler for Forgetful {
    async fn compile(&self, _: &StepRequest) -> Result<StepOutput, InvokeError> {
      Ok(StepOutput::default())
    }

    async fn package(&self, _: &StepRequest) -> Result<StepOutput, InvokeError> {
      panic!("package should never run");
    }
  }

  #[async_trait]
  impl TestRunner for Forgetful {
    async fn run_tests(&self, _: &TestRequest) -> Result<TestReport, InvokeError> {
      Ok(TestReport::default())
    }
  }

  #[tokio::test]
  async fn missing_outputs_fail_the_step() {
    let registry_modules = vec![Module::new(c("net"), Version::new(1, 0, 0), ModuleType::Pack)];
    let plan = plan(registry_modules, &VariantContext::default(), "net");
    let report = execute(
      &plan,
      &Toolchain::uniform(Arc::new(Forgetful)),
      Arc::new(MemoryArtifactStore::new()),
      &config(1),
      &CancelToken::new(),
    )
    .await
    .unwrap();
    assert!(matches!(
      report.steps[0].status,
      StepStatus::Failed(StepError::MissingOutput { .. })
    ));
  }

  #[tokio::test]
  async fn panicking_collaborator_fails_only_its_step() {
    let plan = plan(modules(2), &VariantContext::default(), "app");
    let fake = Arc::new(FakeToolchain {
      panic_on: Some(id("gfx", StepKind::Compile)),
      ..FakeToolchain::default()
    });
    let report = execute(
      &plan,
      &Toolchain::uniform(fake),
      Arc::new(MemoryArtifactStore::new()),
      &config(2),
      &CancelToken::new(),
    )
    .await
    .unwrap();

    assert!(matches!(
      report.get(&id("gfx", StepKind::Compile)).unwrap().status,
      StepStatus::Failed(StepError::Panicked(_))
    ));
    assert!(matches!(
      report.get(&id("net", StepKind::Compile)).unwrap().status,
      StepStatus::Succeeded
    ));
    assert_eq!(report.skipped(), 3);
  }
}
