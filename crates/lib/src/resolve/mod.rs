//! Constraint resolution.
//!
//! Computes the closure of modules a root needs under a variant. Traversal
//! is breadth-first with edges visited in declaration order, so for a given
//! registry and variant the result never depends on hash-map ordering or on
//! the order modules were registered.
//!
//! Selecting a version changes which dependencies are seen, so resolution
//! runs in passes: each pass traverses the graph with the previous pass's
//! selection, collects every constraint placed on every coordinate, then
//! re-selects the highest version satisfying all of them. Resolution ends
//! when a pass reproduces its own selection.

mod types;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use semver::Version;
use tracing::{debug, info, trace};

pub use types::{ConstraintSource, ResolveError, ResolvedClosure, ResolvedEdge, ResolvedModule};

use crate::module::{Coordinate, Module, ModuleType, Scope};
use crate::registry::Registry;
use crate::variant::VariantContext;

/// State gathered by one traversal pass.
#[derive(Debug, Default)]
struct Pass {
  selected: BTreeMap<Coordinate, Version>,
  scopes: BTreeMap<Coordinate, Option<Scope>>,
  constraints: BTreeMap<Coordinate, Vec<ConstraintSource>>,
  edges: BTreeSet<ResolvedEdge>,
}

/// Resolve the closure of `root@root_version` under `variant`.
pub fn resolve(
  registry: &Registry,
  root: &Coordinate,
  root_version: &Version,
  variant: &VariantContext,
) -> Result<ResolvedClosure, ResolveError> {
  // Validate the root before doing any work.
  describe(registry, root, root_version, None)?;

  let max_passes = registry.len() + 1;
  let mut pinned: BTreeMap<Coordinate, Version> = BTreeMap::new();
  let mut last_conflict = None;

  for pass_no in 1..=max_passes {
    let pass = traverse(registry, root, root_version, variant, &pinned)?;
    let next = reselect(registry, root, &pass)?;

    let changed: Vec<&Coordinate> = next
      .iter()
      .filter(|(c, v)| pass.selected.get(*c) != Some(*v))
      .map(|(c, _)| c)
      .collect();

    if changed.is_empty() {
      debug!(root = %root, passes = pass_no, "selection reached fixpoint");
      return finish(registry, root, variant, pass);
    }

    debug!(
      root = %root,
      pass = pass_no,
      changed = changed.len(),
      "selection changed, running another pass"
    );
    last_conflict = changed.first().map(|c| ResolveError::VersionConflict {
      coordinate: (*c).clone(),
      constraints: pass.constraints.get(*c).cloned().unwrap_or_default(),
    });
    pinned = next;
  }

  Err(last_conflict.unwrap_or_else(|| ResolveError::VersionConflict {
    coordinate: root.clone(),
    constraints: Vec::new(),
  }))
}

fn describe<'a>(
  registry: &'a Registry,
  coordinate: &Coordinate,
  version: &Version,
  required_by: Option<&Coordinate>,
) -> Result<&'a Module, ResolveError> {
  registry
    .describe(coordinate, version)
    .map_err(|_| ResolveError::NotFound {
      coordinate: coordinate.clone(),
      version: Some(version.clone()),
      required_by: required_by.cloned(),
    })
}

/// Walk the graph breadth-first, using `pinned` versions where available.
fn traverse(
  registry: &Registry,
  root: &Coordinate,
  root_version: &Version,
  variant: &VariantContext,
  pinned: &BTreeMap<Coordinate, Version>,
) -> Result<Pass, ResolveError> {
  let mut pass = Pass::default();
  let mut expanded: BTreeSet<Coordinate> = BTreeSet::new();
  let mut queue: VecDeque<Coordinate> = VecDeque::new();

  pass.selected.insert(root.clone(), root_version.clone());
  pass.scopes.insert(root.clone(), None);
  expanded.insert(root.clone());
  queue.push_back(root.clone());

  while let Some(current) = queue.pop_front() {
    let module = describe(registry, &current, &pass.selected[&current], None)?;

    for dep in &module.dependencies {
      if !dep.scope.is_active(variant) {
        trace!(from = %current, to = %dep.target, scope = %dep.scope, "edge inactive under variant");
        continue;
      }

      // Any edge back into the root closes a cycle; keep it for detection only.
      if &dep.target == root {
        pass.edges.insert(ResolvedEdge {
          from: current.clone(),
          to: dep.target.clone(),
          scope: dep.scope,
        });
        continue;
      }

      let versions = registry.lookup(&dep.target);
      if versions.is_empty() {
        if dep.required {
          return Err(ResolveError::NotFound {
            coordinate: dep.target.clone(),
            version: None,
            required_by: Some(current.clone()),
          });
        }
        debug!(from = %current, to = %dep.target, "dropping optional dependency on unknown module");
        continue;
      }
      if !dep.required && !versions.iter().any(|v| dep.constraint.matches(v)) {
        debug!(
          from = %current,
          to = %dep.target,
          constraint = %dep.constraint,
          "dropping optional dependency with no satisfying version"
        );
        continue;
      }

      let sources = pass.constraints.entry(dep.target.clone()).or_default();
      sources.push(ConstraintSource {
        required_by: current.clone(),
        constraint: dep.constraint.clone(),
      });
      pass.edges.insert(ResolvedEdge {
        from: current.clone(),
        to: dep.target.clone(),
        scope: dep.scope,
      });

      if !pass.selected.contains_key(&dep.target) {
        let version = match pinned.get(&dep.target).filter(|v| versions.contains(*v)) {
          Some(v) => v.clone(),
          None => highest_satisfying(&versions, sources).ok_or_else(|| ResolveError::VersionConflict {
            coordinate: dep.target.clone(),
            constraints: sources.clone(),
          })?,
        };
        trace!(module = %dep.target, version = %version, scope = %dep.scope, "selected");
        pass.selected.insert(dep.target.clone(), version);
        pass.scopes.insert(dep.target.clone(), Some(dep.scope));
      }

      // Local-scope targets stay leaves unless some propagating edge reaches them.
      if dep.scope.propagates() && !expanded.contains(&dep.target) {
        pass.scopes.insert(dep.target.clone(), Some(dep.scope));
        expanded.insert(dep.target.clone());
        queue.push_back(dep.target.clone());
      }
    }
  }

  Ok(pass)
}

fn highest_satisfying(versions: &BTreeSet<Version>, constraints: &[ConstraintSource]) -> Option<Version> {
  versions
    .iter()
    .rev()
    .find(|v| constraints.iter().all(|c| c.constraint.matches(v)))
    .cloned()
}

/// Re-select every non-root coordinate against all constraints of the pass.
fn reselect(registry: &Registry, root: &Coordinate, pass: &Pass) -> Result<BTreeMap<Coordinate, Version>, ResolveError> {
  let mut next = BTreeMap::new();
  for coordinate in pass.selected.keys().filter(|c| *c != root) {
    let constraints = pass.constraints.get(coordinate).map(Vec::as_slice).unwrap_or_default();
    let version = highest_satisfying(&registry.lookup(coordinate), constraints).ok_or_else(|| {
      ResolveError::VersionConflict {
        coordinate: coordinate.clone(),
        constraints: constraints.to_vec(),
      }
    })?;
    next.insert(coordinate.clone(), version);
  }
  Ok(next)
}

fn finish(
  registry: &Registry,
  root: &Coordinate,
  variant: &VariantContext,
  pass: Pass,
) -> Result<ResolvedClosure, ResolveError> {
  if let Some(path) = find_cycle(root, &pass.edges) {
    return Err(ResolveError::CyclicDependency { path });
  }

  let mut modules = BTreeMap::new();
  for (coordinate, version) in &pass.selected {
    let module = describe(registry, coordinate, version, None)?;
    modules.insert(
      coordinate.clone(),
      ResolvedModule {
        module: module.clone(),
        scope: pass.scopes.get(coordinate).copied().flatten(),
      },
    );
  }

  let environment = check_environment(root, &modules)?;
  if let Some(port) = &environment {
    check_packs(&modules[port].module, &modules)?;
  }

  let closure = ResolvedClosure {
    root: root.clone(),
    environment,
    variant: variant.clone(),
    modules,
    edges: pass.edges,
  };

  info!(
    root = %root,
    version = %closure.root_module().version,
    modules = closure.len(),
    environment = %closure.environment.as_ref().map(ToString::to_string).unwrap_or_default(),
    variant = %variant,
    "resolved dependency closure"
  );
  Ok(closure)
}

/// Iterative depth-first search over followed edges.
///
/// Returns the first cycle found as a path whose first and last elements
/// are the same coordinate.
fn find_cycle(root: &Coordinate, edges: &BTreeSet<ResolvedEdge>) -> Option<Vec<Coordinate>> {
  let mut adjacency: BTreeMap<&Coordinate, Vec<&Coordinate>> = BTreeMap::new();
  for edge in edges {
    adjacency.entry(&edge.from).or_default().push(&edge.to);
  }

  let mut finished: BTreeSet<&Coordinate> = BTreeSet::new();
  let mut path: Vec<&Coordinate> = vec![root];
  let mut cursors: Vec<usize> = vec![0];

  while let Some(&node) = path.last() {
    let children = adjacency.get(node).map(Vec::as_slice).unwrap_or_default();
    let Some(cursor) = cursors.last_mut() else {
      break;
    };

    match children.get(*cursor) {
      Some(&child) => {
        *cursor += 1;
        if let Some(pos) = path.iter().position(|c| *c == child) {
          let mut cycle: Vec<Coordinate> = path[pos..].iter().map(|c| (*c).clone()).collect();
          cycle.push(child.clone());
          return Some(cycle);
        }
        if !finished.contains(child) {
          path.push(child);
          cursors.push(0);
        }
      }
      None => {
        finished.insert(node);
        path.pop();
        cursors.pop();
      }
    }
  }

  None
}

fn check_environment(
  root: &Coordinate,
  modules: &BTreeMap<Coordinate, ResolvedModule>,
) -> Result<Option<Coordinate>, ResolveError> {
  let ports: Vec<Coordinate> = modules
    .values()
    .filter(|m| m.module.module_type == ModuleType::PlatformPort)
    .map(|m| m.coordinate().clone())
    .collect();

  let needs_one = modules[root].module.module_type.needs_environment();
  match ports.len() {
    1 => Ok(ports.into_iter().next()),
    0 if !needs_one => Ok(None),
    _ => Err(ResolveError::AmbiguousEnvironment {
      root: root.clone(),
      ports,
    }),
  }
}

fn check_packs(port: &Module, modules: &BTreeMap<Coordinate, ResolvedModule>) -> Result<(), ResolveError> {
  for pack in modules.values().filter(|m| m.module.module_type == ModuleType::Pack) {
    let missing: Vec<_> = pack.module.requires.difference(&port.capabilities).cloned().collect();
    if !missing.is_empty() {
      return Err(ResolveError::IncompatiblePack {
        pack: pack.coordinate().clone(),
        port: port.coordinate.clone(),
        port_version: port.version.clone(),
        missing,
      });
    }
  }
  Ok(())
}
