//! Implementation of the `veebuild build` command.
//!
//! Builds a root against the on-disk artifact store, running each module's
//! configured commands. Steps whose outputs are already stored are skipped as
//! up to date. Ctrl-C or `--timeout` cancels the build: running steps finish,
//! the rest are reported as cancelled.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::json;
use tracing::warn;

use veebuild_lib::execute::{CancelToken, ExecuteConfig, ExecutionReport, StepStatus, TestOutcome};
use veebuild_lib::store::FsArtifactStore;

use super::{TargetArgs, engine};
use crate::output::{format_duration, print_error, print_json, print_stat, print_step, print_success, print_warning};

#[derive(Args, Debug)]
pub struct BuildArgs {
  #[command(flatten)]
  pub target: TargetArgs,

  /// Maximum number of steps running at once (defaults to the CPU count)
  #[arg(short, long, env = "VEEBUILD_JOBS")]
  pub jobs: Option<usize>,

  /// Artifact store directory (defaults to $VEEBUILD_STORE or .veebuild/store)
  #[arg(long)]
  pub store: Option<PathBuf>,

  /// Shell used to run module commands
  #[arg(long)]
  pub shell: Option<String>,

  /// Cancel the build after this long (e.g. "30s", "10m")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,
}

pub fn cmd_build(registry: &Path, args: &BuildArgs) -> Result<()> {
  let store_root = args.store.clone().unwrap_or_else(FsArtifactStore::default_root);
  let config = match args.jobs {
    Some(jobs) => ExecuteConfig { parallelism: jobs },
    None => ExecuteConfig::default(),
  };
  let engine = engine(
    registry,
    Arc::new(FsArtifactStore::new(&store_root)),
    &store_root.join("work"),
    args.shell.as_deref(),
    config,
  )?;

  let (root, version) = args.target.root()?;
  let variant = args.target.variant.context()?;
  let cancel = CancelToken::new();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(async {
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone(), args.timeout));
    let result = match &version {
      Some(version) => engine.build_version(&root, version, &variant, &cancel).await,
      None => engine.build(&root, &variant, &cancel).await,
    };
    watcher.abort();
    result
  });
  let report = report.with_context(|| format!("Failed to build {}", args.target.root))?;

  if args.target.output.is_json() {
    print_json(&report_json(&report))?;
  } else {
    print_report(&report);
  }

  if !report.is_success() {
    bail!(
      "build failed: {} failed, {} skipped, {} cancelled",
      report.failed(),
      report.skipped(),
      report.cancelled()
    );
  }
  Ok(())
}

async fn cancel_on_signal(cancel: CancelToken, timeout: Option<Duration>) {
  match timeout {
    Some(timeout) => {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => warn!("interrupted, cancelling build"),
        _ = tokio::time::sleep(timeout) => warn!(timeout = %format_duration(timeout), "timed out, cancelling build"),
      }
    }
    None => {
      if tokio::signal::ctrl_c().await.is_err() {
        return;
      }
      warn!("interrupted, cancelling build");
    }
  }
  cancel.cancel();
}

fn print_report(report: &ExecutionReport) {
  for step in &report.steps {
    print_step(&step.id.to_string(), &step.status, step.duration);
    match &step.status {
      StepStatus::Failed(err) => print_error(&format!("    {err}")),
      StepStatus::Skipped(upstream) => println!("      {upstream}"),
      _ => {}
    }
    if let Some(tests) = &step.test_report {
      println!(
        "      tests: {} passed, {} failed, {} skipped",
        tests.count(TestOutcome::Passed),
        tests.count(TestOutcome::Failed),
        tests.count(TestOutcome::Skipped)
      );
    }
  }
  println!();

  if report.is_success() {
    print_success(&format!("Build complete in {}", format_duration(report.elapsed)));
  } else if report.cancelled() > 0 {
    print_warning("Build cancelled");
  } else {
    print_error("Build failed");
  }
  print_stat("Built", &report.succeeded().to_string());
  print_stat("Up to date", &report.up_to_date().to_string());
  print_stat("Failed", &report.failed().to_string());
  print_stat("Skipped", &report.skipped().to_string());
  print_stat("Cancelled", &report.cancelled().to_string());
}

fn report_json(report: &ExecutionReport) -> serde_json::Value {
  let steps: Vec<_> = report
    .steps
    .iter()
    .map(|step| {
      let error = match &step.status {
        StepStatus::Failed(err) => Some(err.to_string()),
        StepStatus::Skipped(upstream) => Some(upstream.to_string()),
        _ => None,
      };
      json!({
        "step": step.id.to_string(),
        "key": step.key.to_string(),
        "status": step.status.label(),
        "error": error,
        "duration_ms": step.duration.map(|d| d.as_millis() as u64),
        "tests": step.test_report,
      })
    })
    .collect();

  json!({
    "success": report.is_success(),
    "elapsed_ms": report.elapsed.as_millis() as u64,
    "succeeded": report.succeeded(),
    "up_to_date": report.up_to_date(),
    "failed": report.failed(),
    "skipped": report.skipped(),
    "cancelled": report.cancelled(),
    "steps": steps,
  })
}
