//! Implementation of the `veebuild plan` command.
//!
//! Compiles the build plan for a root and shows each step in execution
//! order, marking the steps whose outputs are already in the store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use veebuild_lib::execute::ExecuteConfig;
use veebuild_lib::store::{ArtifactStore, FsArtifactStore};

use super::{TargetArgs, engine};
use crate::output::{print_json, print_stat, print_success, short_key, symbols};

pub fn cmd_plan(registry: &Path, args: &TargetArgs) -> Result<()> {
  let store_root = FsArtifactStore::default_root();
  let store = Arc::new(FsArtifactStore::new(&store_root));
  let engine = engine(
    registry,
    store.clone(),
    &store_root.join("work"),
    None,
    ExecuteConfig::default(),
  )?;
  let plan = args.plan(&engine)?;
  let hash = plan.content_hash().context("Failed to compute plan hash")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let cached: Vec<bool> = rt.block_on(async {
    let mut cached = Vec::with_capacity(plan.len());
    for step in &plan.steps {
      cached.push(store.exists(&step.idempotency_key).await?);
    }
    Ok::<_, veebuild_lib::store::StoreError>(cached)
  })?;
  let to_run = cached.iter().filter(|c| !**c).count();

  if args.output.is_json() {
    let steps: Vec<_> = plan
      .steps
      .iter()
      .zip(&cached)
      .map(|(step, cached)| {
        json!({
          "step": step.id.to_string(),
          "version": step.version.to_string(),
          "key": step.idempotency_key.to_string(),
          "depends_on": step.depends_on.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
          "inputs": step.inputs.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
          "outputs": step.outputs.iter().map(|o| o.to_string()).collect::<Vec<_>>(),
          "skipped_checks": step.skipped_checks,
          "test_exclusions": step.test_exclusions,
          "cached": cached,
        })
      })
      .collect();
    print_json(&json!({
      "plan": hash.to_string(),
      "root": plan.root.to_string(),
      "variant": plan.variant,
      "steps": steps,
    }))?;
    return Ok(());
  }

  print_success(&format!("Plan: {}", hash));
  print_stat("Root", &plan.root.to_string());
  print_stat("Variant", &plan.variant.to_string());
  print_stat("Steps", &plan.len().to_string());
  print_stat("To run", &to_run.to_string());
  print_stat("Cached", &(plan.len() - to_run).to_string());
  println!();

  for (step, cached) in plan.steps.iter().zip(&cached) {
    let symbol = if *cached { symbols::CACHED } else { symbols::PENDING };
    println!("  {} {} {}", symbol, step.label(), short_key(step.idempotency_key.as_str()));
    for dep in &step.depends_on {
      println!("      {} {}", symbols::ARROW, dep);
    }
  }

  Ok(())
}
