//! Build plan compilation.
//!
//! Turns a [`ResolvedClosure`] into an ordered list of [`BuildStep`]s. Each
//! module type has exactly one derivation rule:
//!
//! | type                                | steps                                          |
//! |-------------------------------------|------------------------------------------------|
//! | architecture, pack, platform port   | `generate` if it produces sources, `compile` if it produces a library |
//! | mock, front panel                   | `compile`                                      |
//! | generator                           | `compile` producing a tool                     |
//! | application                         | `compile`, then `package`                      |
//! | validation suite                    | `compile`, then `run-tests`                    |
//!
//! Step order is a Kahn topological sort with ties broken by ascending
//! `(coordinate, kind)`, so equal closures always compile to equal plans.
//! Every step carries an idempotency key hashing its module, its kind, the
//! keys of the steps producing its inputs and the variant; a change to one
//! module changes the keys of its own steps and of everything downstream.

mod dag;
mod types;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info};

pub use dag::StepDag;
pub use types::{ArtifactRef, BuildPlan, BuildStep, PlanError, StepId, StepKind};

use crate::module::{ArtifactKind, Coordinate, Module, ModuleType, Scope};
use crate::resolve::ResolvedClosure;
use crate::util::hash::{Hashable, ObjectHash};

/// A step before ordering and keying.
struct Draft<'a> {
  module: &'a Module,
  kind: StepKind,
  outputs: BTreeSet<ArtifactRef>,
  inputs: BTreeSet<ArtifactRef>,
}

/// Everything an idempotency key covers.
#[derive(Serialize)]
struct KeyMaterial<'a> {
  kind: StepKind,
  coordinate: &'a Coordinate,
  version: &'a semver::Version,
  module: ObjectHash,
  inputs: Vec<(&'a ArtifactRef, &'a ObjectHash)>,
  variant: ObjectHash,
}

impl Hashable for KeyMaterial<'_> {}

/// Compile a resolved closure into a build plan.
pub fn compile(closure: &ResolvedClosure) -> Result<BuildPlan, PlanError> {
  let mut drafts: BTreeMap<StepId, Draft<'_>> = BTreeMap::new();
  for resolved in closure.modules() {
    closure
      .variant()
      .admit_skips(&resolved.module.skipped_checks)
      .map_err(|source| PlanError::InvalidVariant {
        module: resolved.coordinate().clone(),
        source,
      })?;
    for (kind, outputs) in derive_steps(&resolved.module) {
      let id = StepId::new(resolved.coordinate().clone(), kind);
      let outputs = outputs
        .into_iter()
        .map(|k| ArtifactRef::new(resolved.coordinate().clone(), k))
        .collect();
      drafts.insert(
        id,
        Draft {
          module: &resolved.module,
          kind,
          outputs,
          inputs: BTreeSet::new(),
        },
      );
    }
  }

  let mut producers: BTreeMap<ArtifactRef, StepId> = BTreeMap::new();
  for (id, draft) in &drafts {
    for artifact in &draft.outputs {
      if let Some(first) = producers.insert(artifact.clone(), id.clone()) {
        return Err(PlanError::DuplicateOutput {
          artifact: artifact.clone(),
          first,
          second: id.clone(),
        });
      }
    }
  }

  let mut dependencies: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
  for (id, draft) in drafts.iter_mut() {
    draft.inputs = wanted_inputs(closure, draft.module, draft.kind)
      .into_iter()
      .filter(|artifact| producers.get(artifact).is_some_and(|p| p != id))
      .collect();
    let deps = draft.inputs.iter().map(|artifact| producers[artifact].clone()).collect();
    dependencies.insert(id.clone(), deps);
  }

  let dag = StepDag::from_dependencies(&dependencies)?;
  let order = dag.topological_order()?;

  let variant_hash = closure.variant().content_hash()?;
  let mut keys: BTreeMap<StepId, ObjectHash> = BTreeMap::new();
  let mut steps = Vec::with_capacity(order.len());

  for id in order {
    let Some(draft) = drafts.remove(&id) else {
      continue;
    };
    let module = draft.module;

    let material = KeyMaterial {
      kind: draft.kind,
      coordinate: &module.coordinate,
      version: &module.version,
      module: module.compute_hash()?,
      inputs: draft
        .inputs
        .iter()
        .filter_map(|artifact| keys.get(&producers[artifact]).map(|key| (artifact, key)))
        .collect(),
      variant: variant_hash.clone(),
    };
    let key = material.compute_hash()?;

    let mut skipped_checks = closure.variant().skipped_checks().clone();
    skipped_checks.extend(module.skipped_checks.iter().cloned());

    let step = BuildStep {
      version: module.version.clone(),
      module_type: module.module_type,
      depends_on: dependencies.remove(&id).unwrap_or_default(),
      idempotency_key: key.clone(),
      skipped_checks,
      test_exclusions: match draft.kind {
        StepKind::RunTests => module.test_exclusions.clone(),
        _ => Vec::new(),
      },
      command: command_for(module, draft.kind),
      inputs: draft.inputs,
      outputs: draft.outputs,
      id: id.clone(),
    };
    debug!(step = %step.id, key = %key, inputs = step.inputs.len(), "planned step");

    keys.insert(id, key);
    steps.push(step);
  }

  info!(
    root = %closure.root(),
    steps = steps.len(),
    variant = %closure.variant(),
    "compiled build plan"
  );

  Ok(BuildPlan {
    root: closure.root().clone(),
    variant: closure.variant().clone(),
    steps,
  })
}

/// The derivation rule: which steps a module gets and what each produces.
fn derive_steps(module: &Module) -> Vec<(StepKind, BTreeSet<ArtifactKind>)> {
  let one = |kind: ArtifactKind| BTreeSet::from([kind]);

  match module.module_type {
    ModuleType::Architecture | ModuleType::Pack | ModuleType::PlatformPort => {
      let mut steps = Vec::new();
      if module.produces(ArtifactKind::Sources) {
        steps.push((StepKind::Generate, one(ArtifactKind::Sources)));
      }
      if module.produces(ArtifactKind::Library) {
        steps.push((StepKind::Compile, one(ArtifactKind::Library)));
      }
      steps
    }
    ModuleType::FrontEnd(_) => vec![(StepKind::Compile, one(ArtifactKind::Library))],
    ModuleType::Generator => vec![(StepKind::Compile, one(ArtifactKind::Tool))],
    ModuleType::Application => vec![
      (StepKind::Compile, one(ArtifactKind::Library)),
      (StepKind::Package, one(ArtifactKind::Executable)),
    ],
    ModuleType::ValidationSuite => vec![
      (StepKind::Compile, one(ArtifactKind::Library)),
      (StepKind::RunTests, one(ArtifactKind::TestReport)),
    ],
  }
}

fn command_for(module: &Module, kind: StepKind) -> Option<String> {
  let commands = &module.commands;
  match kind {
    StepKind::Generate => commands.generate.clone(),
    StepKind::Compile => commands.compile.clone(),
    StepKind::Package => commands.package.clone(),
    StepKind::RunTests => commands.test.clone(),
  }
}

/// Artifacts a step would like to read; the caller keeps those some step produces.
fn wanted_inputs(closure: &ResolvedClosure, module: &Module, kind: StepKind) -> BTreeSet<ArtifactRef> {
  let own = &module.coordinate;
  let mut wanted = BTreeSet::new();

  match kind {
    StepKind::Generate => {
      for edge in closure.dependencies_of(own).filter(|e| e.scope == Scope::ToolChain) {
        wanted.insert(ArtifactRef::new(edge.to.clone(), ArtifactKind::Tool));
      }
    }
    StepKind::Compile => {
      wanted.insert(ArtifactRef::new(own.clone(), ArtifactKind::Sources));
      for edge in closure.dependencies_of(own) {
        if edge.scope == Scope::ToolChain {
          wanted.insert(ArtifactRef::new(edge.to.clone(), ArtifactKind::Tool));
        } else {
          wanted.insert(ArtifactRef::new(edge.to.clone(), ArtifactKind::Sources));
          wanted.insert(ArtifactRef::new(edge.to.clone(), ArtifactKind::Library));
        }
      }
    }
    StepKind::Package | StepKind::RunTests => {
      let linked = propagating_closure(closure, own);
      for coordinate in &linked {
        wanted.insert(ArtifactRef::new(coordinate.clone(), ArtifactKind::Library));
        for edge in closure.dependencies_of(coordinate) {
          if edge.scope == Scope::FrontEndOnly {
            wanted.insert(ArtifactRef::new(edge.to.clone(), ArtifactKind::Library));
          }
        }
      }
      for edge in closure.dependencies_of(own).filter(|e| e.scope == Scope::TestOnly) {
        wanted.insert(ArtifactRef::new(edge.to.clone(), ArtifactKind::Library));
      }
    }
  }

  wanted
}

/// `start` plus everything reachable from it through propagating edges.
fn propagating_closure(closure: &ResolvedClosure, start: &Coordinate) -> BTreeSet<Coordinate> {
  let mut seen = BTreeSet::from([start.clone()]);
  let mut queue = VecDeque::from([start.clone()]);
  while let Some(current) = queue.pop_front() {
    for edge in closure.dependencies_of(&current) {
      if edge.scope.propagates() && seen.insert(edge.to.clone()) {
        queue.push_back(edge.to.clone());
      }
    }
  }
  seen
}

impl BuildPlan {
  /// Rebuild the step DAG, e.g. to group steps into waves for display.
  pub fn dag(&self) -> Result<StepDag, PlanError> {
    let dependencies = self
      .steps
      .iter()
      .map(|s| (s.id.clone(), s.depends_on.clone()))
      .collect();
    StepDag::from_dependencies(&dependencies)
  }
}
