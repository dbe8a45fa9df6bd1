//! CLI output formatting utilities.
//!
//! Colored status lines for steps and modules, short keys and human-readable
//! durations. Colors are dropped when the stream is not a terminal.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use veebuild_lib::execute::StepStatus;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const PENDING: &str = "+";
  pub const CACHED: &str = "=";
  pub const SKIPPED: &str = "-";
  pub const CANCELLED: &str = "∅";
}

/// First 12 characters of an idempotency key.
pub fn short_key(key: &str) -> &str {
  let len = key.len().min(12);
  &key[..len]
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  if secs >= 60 {
    humantime::format_duration(Duration::from_secs(secs)).to_string()
  } else if secs > 0 {
    format!("{}.{:02}s", secs, duration.subsec_millis() / 10)
  } else {
    format!("{}ms", duration.subsec_millis())
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// One line per step: symbol, step id, status and (when it ran) duration.
pub fn print_step(step: &str, status: &StepStatus, duration: Option<Duration>) {
  let symbol = match status {
    StepStatus::Succeeded => symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    StepStatus::UpToDate => symbols::CACHED.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
    StepStatus::Failed(_) => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    StepStatus::Skipped(_) => symbols::SKIPPED.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    StepStatus::Cancelled => symbols::CANCELLED.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
  };
  let timing = duration.map(|d| format!(" ({})", format_duration(d))).unwrap_or_default();
  println!(
    "  {} {} {}{}",
    symbol,
    step,
    status.label().if_supports_color(Stream::Stdout, |s| s.dimmed()),
    timing
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
