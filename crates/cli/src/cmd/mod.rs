mod build;
mod plan;
mod resolve;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use semver::Version;

use veebuild_lib::Engine;
use veebuild_lib::execute::{CommandToolchain, ExecuteConfig, Toolchain};
use veebuild_lib::module::{Coordinate, parse_version};
use veebuild_lib::plan::BuildPlan;
use veebuild_lib::registry::Registry;
use veebuild_lib::resolve::ResolvedClosure;
use veebuild_lib::store::ArtifactStore;
use veebuild_lib::variant::{TargetEnvironment, TestMode, UsageProfile, VariantContext, parse_check_list};

use crate::output::OutputFormat;

pub use build::{BuildArgs, cmd_build};
pub use plan::cmd_plan;
pub use resolve::cmd_resolve;

/// Arguments naming what to resolve and under which variant.
#[derive(Args, Debug)]
pub struct TargetArgs {
  /// Root module as `namespace:name`, optionally pinned with `@version`
  pub root: String,

  #[command(flatten)]
  pub variant: VariantArgs,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text", visible_alias = "format")]
  pub output: OutputFormat,
}

/// Build-time selectors. Each flag falls back to a `VEEBUILD_*` variable.
#[derive(Args, Debug)]
pub struct VariantArgs {
  /// Usage profile: eval or prod
  #[arg(long, env = "VEEBUILD_USAGE", default_value = "eval")]
  pub usage: UsageProfile,

  /// Target environment: embedded or simulated
  #[arg(long, env = "VEEBUILD_TARGET", default_value = "embedded")]
  pub target: TargetEnvironment,

  /// Test mode: none, unit or integration
  #[arg(long, env = "VEEBUILD_TEST_MODE", default_value = "none")]
  pub test_mode: TestMode,

  /// Comma-separated checks to skip (e.g. "changelog,readme")
  #[arg(long, env = "VEEBUILD_SKIP_CHECKS", default_value = "")]
  pub skip_checks: String,

  /// Let a production build with tests skip mandatory checks
  #[arg(long)]
  pub allow_skipped_mandatory: bool,
}

impl VariantArgs {
  pub fn context(&self) -> Result<VariantContext> {
    VariantContext::builder()
      .usage(self.usage)
      .target(self.target)
      .test_mode(self.test_mode)
      .skip_checks(parse_check_list(&self.skip_checks))
      .allow_skipped_mandatory_checks(self.allow_skipped_mandatory)
      .build()
      .context("Invalid variant")
  }
}

impl TargetArgs {
  /// Split `ns:name@version` into a coordinate and an optional pinned version.
  pub fn root(&self) -> Result<(Coordinate, Option<Version>)> {
    let (coordinate, version) = match self.root.split_once('@') {
      Some((coordinate, version)) => (coordinate, Some(version)),
      None => (self.root.as_str(), None),
    };
    let coordinate: Coordinate = coordinate
      .parse()
      .with_context(|| format!("Invalid root module: {}", self.root))?;
    let version = version
      .map(|v| parse_version(v).with_context(|| format!("Invalid root version: {v}")))
      .transpose()?;
    Ok((coordinate, version))
  }

  pub fn resolve(&self, engine: &Engine) -> Result<Arc<ResolvedClosure>> {
    let (root, version) = self.root()?;
    let variant = self.variant.context()?;
    let closure = match version {
      Some(version) => engine.resolve_version(&root, &version, &variant),
      None => engine.resolve(&root, &variant),
    };
    closure.with_context(|| format!("Failed to resolve {}", self.root))
  }

  pub fn plan(&self, engine: &Engine) -> Result<Arc<BuildPlan>> {
    let closure = self.resolve(engine)?;
    engine
      .plan_closure(&closure)
      .with_context(|| format!("Failed to plan {}", self.root))
  }
}

pub fn load_registry(path: &Path) -> Result<Registry> {
  Registry::load(path).with_context(|| format!("Failed to load registry: {}", path.display()))
}

/// An engine over the registry at `path`.
///
/// `work_dir` is where external commands get their scratch directories.
pub fn engine(
  path: &Path,
  store: Arc<dyn ArtifactStore>,
  work_dir: &Path,
  shell: Option<&str>,
  config: ExecuteConfig,
) -> Result<Engine> {
  let registry = load_registry(path)?;
  let mut toolchain = CommandToolchain::new(work_dir);
  if let Some(shell) = shell {
    toolchain = toolchain.with_shell(shell);
  }
  Engine::new(
    Arc::new(registry),
    Toolchain::uniform(Arc::new(toolchain)),
    store,
    config,
  )
  .context("Failed to initialize engine")
}
