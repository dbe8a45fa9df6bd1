//! Implementation of the `veebuild resolve` command.
//!
//! Resolves a root module under a variant and lists the selected modules.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use veebuild_lib::consts::APP_NAME;
use veebuild_lib::execute::ExecuteConfig;
use veebuild_lib::resolve::ResolvedClosure;
use veebuild_lib::store::MemoryArtifactStore;

use super::{TargetArgs, engine};
use crate::output::{print_json, print_stat, print_success, symbols};

pub fn cmd_resolve(registry: &Path, args: &TargetArgs) -> Result<()> {
  let work_dir = std::env::temp_dir().join(APP_NAME);
  let engine = engine(
    registry,
    Arc::new(MemoryArtifactStore::new()),
    &work_dir,
    None,
    ExecuteConfig::default(),
  )?;
  let closure = args.resolve(&engine)?;

  if args.output.is_json() {
    print_json(&closure_json(&closure))?;
    return Ok(());
  }

  print_success(&format!(
    "Resolved {} ({} modules)",
    closure.root_module().label(),
    closure.len()
  ));
  print_stat("Variant", &closure.variant().to_string());
  if let Some(env) = closure.environment() {
    print_stat("Environment", &env.module.label());
  }
  println!();
  for resolved in closure.modules() {
    let scope = resolved.scope.map(|s| format!(" [{s}]")).unwrap_or_default();
    println!(
      "  {} {} {}{}",
      symbols::INFO,
      resolved.module.label(),
      resolved.module.module_type,
      scope
    );
    for edge in closure.dependencies_of(resolved.coordinate()) {
      println!("      {} {} ({})", symbols::ARROW, edge.to, edge.scope);
    }
  }

  Ok(())
}

fn closure_json(closure: &ResolvedClosure) -> serde_json::Value {
  let modules: Vec<_> = closure
    .modules()
    .map(|m| {
      json!({
        "coordinate": m.coordinate().to_string(),
        "version": m.version().to_string(),
        "type": m.module.module_type.to_string(),
        "scope": m.scope.map(|s| s.to_string()),
      })
    })
    .collect();
  let edges: Vec<_> = closure
    .edges()
    .map(|e| json!({ "from": e.from.to_string(), "to": e.to.to_string(), "scope": e.scope.to_string() }))
    .collect();

  json!({
    "root": closure.root().to_string(),
    "version": closure.root_module().version.to_string(),
    "variant": closure.variant(),
    "environment": closure.environment().map(|e| e.module.label()),
    "modules": modules,
    "edges": edges,
  })
}
