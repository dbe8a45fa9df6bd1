//! Step DAG for ordering and cycle checks.
//!
//! Edges run from a producing step to the steps consuming its outputs.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::{PlanError, StepId};

pub struct StepDag {
  graph: DiGraph<StepId, ()>,
  nodes: BTreeMap<StepId, NodeIndex>,
}

impl StepDag {
  /// Build the DAG from each step's set of producer steps.
  ///
  /// Dependencies naming steps outside the map are ignored.
  ///
  /// # Errors
  ///
  /// Returns `StepCycle` listing every step that sits on a cycle.
  pub fn from_dependencies(dependencies: &BTreeMap<StepId, BTreeSet<StepId>>) -> Result<Self, PlanError> {
    let mut graph = DiGraph::new();
    let mut nodes = BTreeMap::new();

    for id in dependencies.keys() {
      let idx = graph.add_node(id.clone());
      nodes.insert(id.clone(), idx);
    }

    for (id, deps) in dependencies {
      let dependent_idx = nodes[id];
      for dep in deps {
        if let Some(&dep_idx) = nodes.get(dep) {
          graph.add_edge(dep_idx, dependent_idx, ());
        }
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), PlanError> {
    if toposort(&self.graph, None).is_ok() {
      return Ok(());
    }

    let mut steps: Vec<StepId> = tarjan_scc(&self.graph)
      .into_iter()
      .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
      .flatten()
      .map(|idx| self.graph[idx].clone())
      .collect();
    steps.sort();
    Err(PlanError::StepCycle { steps })
  }

  /// Kahn's algorithm, always taking the smallest ready step next.
  pub fn topological_order(&self) -> Result<Vec<StepId>, PlanError> {
    let mut in_degree: BTreeMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut ready: BTreeSet<(StepId, NodeIndex)> = in_degree
      .iter()
      .filter(|(_, deg)| **deg == 0)
      .map(|(&idx, _)| (self.graph[idx].clone(), idx))
      .collect();

    let mut order = Vec::with_capacity(self.nodes.len());
    while let Some((id, idx)) = ready.pop_first() {
      order.push(id);
      for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        if let Some(deg) = in_degree.get_mut(&next) {
          *deg = deg.saturating_sub(1);
          if *deg == 0 {
            ready.insert((self.graph[next].clone(), next));
          }
        }
      }
    }

    if order.len() != self.nodes.len() {
      let placed: BTreeSet<&StepId> = order.iter().collect();
      let steps = self.nodes.keys().filter(|id| !placed.contains(id)).cloned().collect();
      return Err(PlanError::StepCycle { steps });
    }
    Ok(order)
  }

  /// Group steps into waves: every step's producers sit in earlier waves.
  pub fn waves(&self) -> Vec<Vec<StepId>> {
    let mut level: BTreeMap<NodeIndex, usize> = BTreeMap::new();
    let Ok(sorted) = toposort(&self.graph, None) else {
      return Vec::new();
    };

    for idx in sorted {
      let wave = self
        .graph
        .neighbors_directed(idx, Direction::Incoming)
        .filter_map(|dep| level.get(&dep))
        .map(|l| l + 1)
        .max()
        .unwrap_or(0);
      level.insert(idx, wave);
    }

    let max_level = level.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<StepId>> = vec![Vec::new(); max_level + 1];
    for (id, idx) in &self.nodes {
      if let Some(&l) = level.get(idx) {
        waves[l].push(id.clone());
      }
    }
    waves.retain(|w| !w.is_empty());
    waves
  }

  /// Direct producers of a step.
  pub fn dependencies(&self, id: &StepId) -> Vec<StepId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct consumers of a step.
  pub fn dependents(&self, id: &StepId) -> Vec<StepId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &StepId, direction: Direction) -> Vec<StepId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    let mut ids: Vec<StepId> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    ids.sort();
    ids
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
