//! Build command integration tests.

#![cfg(unix)]

use predicates::prelude::*;

use super::common::{TestEnv, step};

#[test]
fn build_product_runs_every_step() {
  let env = TestEnv::from_fixture("product.toml");

  env
    .veebuild_cmd()
    .args(["build", "com.example:app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"))
    .stdout(predicate::str::contains("com.example:app#package"));

  assert_eq!(env.stored_entries(), 6);
}

#[test]
fn rebuild_is_up_to_date() {
  let env = TestEnv::from_fixture("product.toml");

  let (ok, first) = env.json(&["build", "com.example:app"]);
  assert!(ok);
  assert_eq!(first["succeeded"], 6);

  let (ok, second) = env.json(&["build", "com.example:app"]);
  assert!(ok);
  assert_eq!(second["succeeded"], 0);
  assert_eq!(second["up_to_date"], 6);
  assert_eq!(env.stored_entries(), 6);
}

#[test]
fn changing_the_variant_rebuilds() {
  let env = TestEnv::from_fixture("product.toml");
  env.veebuild_cmd().args(["build", "com.example:app"]).assert().success();

  // The simulated target pulls in the mock and changes every key.
  let (ok, sim) = env.json(&["build", "com.example:app", "--target", "simulated"]);
  assert!(ok);
  assert_eq!(sim["up_to_date"], 0);
  assert_eq!(sim["succeeded"], 7);
  assert_eq!(step(&sim, "com.example:mock#compile")["status"], "succeeded");
  assert_eq!(env.stored_entries(), 13);
}

#[test]
fn failure_skips_dependents_only() {
  let env = TestEnv::from_fixture("broken.toml");

  let (ok, report) = env.json(&["build", "com.example:app", "--jobs", "1"]);
  assert!(!ok);
  assert_eq!(report["success"], false);
  assert_eq!(report["failed"], 1);
  assert_eq!(report["skipped"], 2);
  assert_eq!(report["succeeded"], 2);

  let net = step(&report, "com.example:pack-net#compile");
  assert_eq!(net["status"], "failed");
  let error = net["error"].as_str().unwrap();
  assert!(error.contains("socket.h"), "{error}");
  assert!(error.contains("exit code 3"), "{error}");

  let app = step(&report, "com.example:app#package");
  assert_eq!(app["status"], "skipped");
  assert!(app["error"].as_str().unwrap().contains("com.example:pack-net#compile"));

  assert_eq!(step(&report, "com.example:pack-ui#compile")["status"], "succeeded");
}

#[test]
fn failed_build_exits_nonzero() {
  let env = TestEnv::from_fixture("broken.toml");

  env
    .veebuild_cmd()
    .args(["build", "com.example:app"])
    .assert()
    .failure()
    .code(1)
    .stdout(predicate::str::contains("com.example:pack-net#compile failed"))
    .stderr(predicate::str::contains("Build failed"))
    .stderr(predicate::str::contains("build failed: 1 failed, 2 skipped, 0 cancelled"));
}

#[test]
fn suite_reports_tests_and_honors_exclusions() {
  let env = TestEnv::from_fixture("suite.toml");

  let (ok, report) = env.json(&["build", "com.example:port-tests", "--test-mode", "unit"]);
  assert!(ok);

  let results = &step(&report, "com.example:port-tests#run-tests")["tests"]["results"];
  assert_eq!(results["CoreTest"], "passed");
  assert_eq!(results["FsTest"], "passed");
  assert_eq!(results["AllTestClasses"], "skipped");

  // Replayed from the store on the next run.
  let (ok, again) = env.json(&["build", "com.example:port-tests", "--test-mode", "unit"]);
  assert!(ok);
  let run = step(&again, "com.example:port-tests#run-tests");
  assert_eq!(run["status"], "up-to-date");
  assert_eq!(run["tests"]["results"]["FsTest"], "passed");
}

#[test]
fn store_flag_overrides_environment() {
  let env = TestEnv::from_fixture("product.toml");
  let other = env.temp.path().join("elsewhere");

  env
    .veebuild_cmd()
    .args(["build", "com.example:app", "--store"])
    .arg(&other)
    .assert()
    .success();

  assert_eq!(env.stored_entries(), 0);
  assert_eq!(std::fs::read_dir(other.join("obj")).unwrap().count(), 6);
}

#[test]
fn unwritten_output_fails_and_is_not_stored() {
  let env = TestEnv::from_toml(
    r#"
[[module]]
name = "com.example:pack-fs"
version = "1.0"
type = "pack"

[module.commands]
compile = 'true'
"#,
  );

  for _ in 0..2 {
    let (ok, report) = env.json(&["build", "com.example:pack-fs"]);
    assert!(!ok);
    let compile = step(&report, "com.example:pack-fs#compile");
    assert_eq!(compile["status"], "failed");
    assert!(
      compile["error"]
        .as_str()
        .unwrap()
        .contains("did not produce com.example:pack-fs[library]")
    );
  }
  assert_eq!(env.stored_entries(), 0);
}
