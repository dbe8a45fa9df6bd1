//! Shell-command collaborators.
//!
//! [`CommandToolchain`] runs the shell command a module declares for each
//! step kind. Each step gets a scratch directory under the work dir:
//!
//! ```text
//! <work_dir>/<key>/
//! ├── in/    # one file per input artifact, named <namespace>_<name>.<kind>
//! ├── out/   # $out: the command writes one file per output kind
//! └── tmp/
//! ```
//!
//! The scratch directory is removed once the command finishes, whether it
//! succeeded or not. The environment is cleared apart from `PATH`, so
//! commands only see the variables describing their step. Test commands report results as stdout
//! lines `PASS <name>`, `FAIL <name>` or `SKIP <name>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::invoke::{
  Compiler, Generator, InvokeError, StepOutput, StepRequest, TestOutcome, TestReport, TestRequest, TestRunner,
};
use crate::consts::SOURCE_DATE_EPOCH;
use crate::store::Artifact;

#[derive(Debug, Clone)]
pub struct CommandToolchain {
  work_dir: PathBuf,
  shell: Option<String>,
}

impl CommandToolchain {
  pub fn new(work_dir: impl Into<PathBuf>) -> Self {
    Self {
      work_dir: work_dir.into(),
      shell: None,
    }
  }

  /// Run commands with a specific shell instead of the platform default.
  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  /// Run the step's command and return its stdout and collected outputs.
  async fn run(&self, request: &StepRequest, extra_env: &[(&str, String)]) -> Result<(String, StepOutput), InvokeError> {
    let Some(cmd) = request.command.as_deref() else {
      debug!(step = %request.step, "no command configured, producing empty outputs");
      let artifacts = request
        .outputs
        .iter()
        .map(|r| Artifact::new(r.clone(), Vec::new()))
        .collect();
      return Ok((String::new(), StepOutput::new(artifacts)));
    };

    let step_dir = self.work_dir.join(request.key.as_str());
    let result = self.run_command(request, cmd, &step_dir, extra_env).await;

    if let Err(err) = tokio::fs::remove_dir_all(&step_dir).await {
      debug!(dir = %step_dir.display(), error = %err, "failed to clean step directory");
    }
    result
  }

  async fn run_command(
    &self,
    request: &StepRequest,
    cmd: &str,
    step_dir: &Path,
    extra_env: &[(&str, String)],
  ) -> Result<(String, StepOutput), InvokeError> {
    let in_dir = step_dir.join("in");
    let out_dir = step_dir.join("out");
    let tmp_dir = step_dir.join("tmp");
    for dir in [&in_dir, &out_dir, &tmp_dir] {
      tokio::fs::create_dir_all(dir).await.map_err(io_failure(dir))?;
    }

    for input in &request.inputs {
      let path = in_dir.join(file_name(&input.reference.coordinate.to_string(), &input.reference.kind.to_string()));
      tokio::fs::write(&path, &input.data).await.map_err(io_failure(&path))?;
    }

    info!(step = %request.step, cmd = %cmd, "executing command");

    let (shell, shell_args) = get_shell(self.shell.as_deref());
    let skipped: Vec<&str> = request.skipped_checks.iter().map(|c| c.as_str()).collect();

    let mut command = Command::new(&shell);
    command
      .args(&shell_args)
      .arg(cmd)
      .current_dir(step_dir)
      .env_clear()
      .env("PATH", std::env::var_os("PATH").unwrap_or_default())
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", &tmp_dir)
      .env("TMP", &tmp_dir)
      .env("TEMP", &tmp_dir)
      .env("out", &out_dir)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
      .env("VEEBUILD_STEP", request.step.to_string())
      .env("VEEBUILD_MODULE", request.step.coordinate.to_string())
      .env("VEEBUILD_VERSION", request.version.to_string())
      .env("VEEBUILD_MODULE_TYPE", request.module_type.to_string())
      .env("VEEBUILD_KIND", request.step.kind.to_string())
      .env("VEEBUILD_KEY", request.key.as_str())
      .env("VEEBUILD_INPUTS", &in_dir)
      .env("VEEBUILD_USAGE", request.variant.usage().to_string())
      .env("VEEBUILD_TARGET", request.variant.target().to_string())
      .env("VEEBUILD_TEST_MODE", request.variant.test_mode().to_string())
      .env("VEEBUILD_SKIPPED_CHECKS", skipped.join(","));
    for (name, value) in extra_env {
      command.env(name, value);
    }

    debug!(shell = %shell, dir = %step_dir.display(), "spawning process");
    let output = command
      .output()
      .await
      .map_err(|e| InvokeError::new(format!("failed to spawn {shell}: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      let detail = stderr.lines().last().unwrap_or_default().trim();
      let message = if detail.is_empty() {
        format!("command failed: {cmd}")
      } else {
        format!("command failed: {cmd}: {detail}")
      };
      return Err(InvokeError::new(message).with_exit_code(output.status.code()));
    }

    let mut artifacts = Vec::with_capacity(request.outputs.len());
    for reference in &request.outputs {
      let path = out_dir.join(reference.kind.to_string());
      match tokio::fs::read(&path).await {
        Ok(data) => artifacts.push(Artifact::new(reference.clone(), data)),
        // Left out so the executor reports the missing output.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
          debug!(step = %request.step, output = %reference, "command wrote no output");
        }
        Err(err) => return Err(io_failure(&path)(err)),
      }
    }

    Ok((stdout, StepOutput::new(artifacts)))
  }
}

fn io_failure(path: &Path) -> impl FnOnce(std::io::Error) -> InvokeError + '_ {
  move |err| InvokeError::new(format!("{}: {err}", path.display()))
}

fn file_name(coordinate: &str, kind: &str) -> String {
  format!("{}.{kind}", coordinate.replace(':', "_"))
}

/// Parse `PASS`/`FAIL`/`SKIP <name>` lines; anything else is ignored.
fn parse_test_output(stdout: &str) -> TestReport {
  let mut report = TestReport::default();
  for line in stdout.lines() {
    let Some((status, name)) = line.trim().split_once(char::is_whitespace) else {
      continue;
    };
    let outcome = match status {
      "PASS" => TestOutcome::Passed,
      "FAIL" => TestOutcome::Failed,
      "SKIP" => TestOutcome::Skipped,
      _ => continue,
    };
    report.record(name.trim(), outcome);
  }
  report
}

fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C".to_string()])
  }
}

#[async_trait]
impl Generator for CommandToolchain {
  async fn generate(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
    self.run(request, &[]).await.map(|(_, output)| output)
  }
}

#[async_trait]
impl Compiler for CommandToolchain {
  async fn compile(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
    self.run(request, &[]).await.map(|(_, output)| output)
  }

  async fn package(&self, request: &StepRequest) -> Result<StepOutput, InvokeError> {
    self.run(request, &[]).await.map(|(_, output)| output)
  }
}

#[async_trait]
impl TestRunner for CommandToolchain {
  async fn run_tests(&self, request: &TestRequest) -> Result<TestReport, InvokeError> {
    let env = [
      ("VEEBUILD_EXCLUDE_TESTS", request.exclusions.join(",")),
      ("VEEBUILD_TEST_TARGET", request.target.to_string()),
    ];
    let (stdout, _) = self.run(&request.step, &env).await?;
    Ok(parse_test_output(&stdout))
  }
}
