mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, TargetArgs};

/// veebuild - resolve, plan and build module graphs
#[derive(Parser)]
#[command(name = "veebuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Raise log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Registry file describing the available modules
  #[arg(short, long, global = true, env = "VEEBUILD_REGISTRY", default_value = "veebuild.toml")]
  registry: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the modules a root resolves to
  Resolve(TargetArgs),

  /// Show the build steps for a root without running them
  Plan(TargetArgs),

  /// Build a root
  Build(BuildArgs),
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = match cli.verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Resolve(args) => cmd::cmd_resolve(&cli.registry, &args),
    Commands::Plan(args) => cmd::cmd_plan(&cli.registry, &args),
    Commands::Build(args) => cmd::cmd_build(&cli.registry, &args),
  }
}
