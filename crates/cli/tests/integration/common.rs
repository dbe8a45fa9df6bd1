//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the registry and the
/// artifact store.
pub struct TestEnv {
  pub temp: TempDir,
  pub registry_path: PathBuf,
}

impl TestEnv {
  /// Copy a fixture registry to `veebuild.toml` in a fresh directory.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let registry_path = temp.path().join("veebuild.toml");
    std::fs::copy(fixture_path(name), &registry_path)
      .unwrap_or_else(|e| panic!("Failed to copy fixture {}: {}", name, e));
    Self { temp, registry_path }
  }

  /// Write `contents` as the registry in a fresh directory.
  pub fn from_toml(contents: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let registry_path = temp.path().join("veebuild.toml");
    std::fs::write(&registry_path, contents).unwrap();
    Self { temp, registry_path }
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    self.temp.path().join("store")
  }

  /// Number of entries in the artifact store.
  pub fn stored_entries(&self) -> usize {
    match std::fs::read_dir(self.store_path().join("obj")) {
      Ok(entries) => entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .count(),
      Err(_) => 0,
    }
  }

  /// Get a pre-configured Command for the veebuild binary.
  ///
  /// Runs in the temp directory with `VEEBUILD_STORE` pointing at the
  /// isolated store and every other `VEEBUILD_*` selector cleared.
  pub fn veebuild_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("veebuild");
    cmd.current_dir(self.temp.path());
    for var in [
      "VEEBUILD_REGISTRY",
      "VEEBUILD_USAGE",
      "VEEBUILD_TARGET",
      "VEEBUILD_TEST_MODE",
      "VEEBUILD_SKIP_CHECKS",
      "VEEBUILD_JOBS",
    ] {
      cmd.env_remove(var);
    }
    cmd.env("VEEBUILD_STORE", self.store_path());
    cmd
  }

  /// Run `veebuild <args> -o json` and parse stdout, whatever the exit status.
  pub fn json(&self, args: &[&str]) -> (bool, serde_json::Value) {
    let output = self.veebuild_cmd().args(args).args(["-o", "json"]).output().unwrap();
    let json = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
      panic!(
        "invalid JSON ({e}); stderr: {}",
        String::from_utf8_lossy(&output.stderr)
      )
    });
    (output.status.success(), json)
  }
}

/// The entry for `step` in a build or plan report.
pub fn step<'a>(json: &'a serde_json::Value, step: &str) -> &'a serde_json::Value {
  json["steps"]
    .as_array()
    .unwrap()
    .iter()
    .find(|s| s["step"] == step)
    .unwrap_or_else(|| panic!("no step {step} in {json}"))
}
