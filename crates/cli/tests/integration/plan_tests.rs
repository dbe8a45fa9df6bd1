//! Plan command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, step};

#[test]
fn plan_orders_steps_topologically() {
  let env = TestEnv::from_fixture("product.toml");

  let (ok, plan) = env.json(&["plan", "com.example:app"]);
  assert!(ok);

  let order: Vec<&str> = plan["steps"]
    .as_array()
    .unwrap()
    .iter()
    .map(|s| s["step"].as_str().unwrap())
    .collect();
  assert_eq!(
    order,
    vec![
      "com.example:pack-ui#compile",
      "com.example:pack-vg#compile",
      "com.example:port#generate",
      "com.example:port#compile",
      "com.example:app#compile",
      "com.example:app#package",
    ]
  );

  let package = step(&plan, "com.example:app#package");
  let inputs: Vec<&str> = package["inputs"]
    .as_array()
    .unwrap()
    .iter()
    .map(|i| i.as_str().unwrap())
    .collect();
  assert_eq!(
    inputs,
    vec![
      "com.example:app[library]",
      "com.example:pack-ui[library]",
      "com.example:pack-vg[library]",
      "com.example:port[library]",
    ]
  );
}

#[test]
fn plan_is_deterministic() {
  let env = TestEnv::from_fixture("product.toml");

  let (_, first) = env.json(&["plan", "com.example:app"]);
  let (_, second) = env.json(&["plan", "com.example:app"]);
  assert_eq!(first["plan"], second["plan"]);
  assert_eq!(first, second);
}

#[test]
fn plan_carries_skipped_checks_and_exclusions() {
  let env = TestEnv::from_fixture("suite.toml");

  let (ok, plan) = env.json(&[
    "plan",
    "com.example:port-tests",
    "--test-mode",
    "unit",
    "--skip-checks",
    "Changelog, readme",
  ]);
  assert!(ok);

  let run = step(&plan, "com.example:port-tests#run-tests");
  assert_eq!(run["skipped_checks"], serde_json::json!(["changelog", "readme"]));
  assert_eq!(run["test_exclusions"], serde_json::json!(["*AllTestClasses"]));
  assert_eq!(
    step(&plan, "com.example:port-tests#compile")["test_exclusions"],
    serde_json::json!([])
  );
}

#[cfg(unix)]
#[test]
fn plan_marks_cached_steps_after_build() {
  let env = TestEnv::from_fixture("product.toml");

  env
    .veebuild_cmd()
    .args(["plan", "com.example:app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("To run: 6"));

  env.veebuild_cmd().args(["build", "com.example:app"]).assert().success();

  env
    .veebuild_cmd()
    .args(["plan", "com.example:app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cached: 6"))
    .stdout(predicate::str::contains("To run: 0"));
}

#[test]
fn module_skip_list_is_checked_for_production_tests() {
  let env = TestEnv::from_toml(
    r#"
[[module]]
name = "com.example:fs-tests"
version = "1.0"
type = "validation-suite"
skipped-checks = "changelog,readme,license,nullanalysis"

[[module.dependency]]
target = "com.example:port"
scope = "vee"

[[module]]
name = "com.example:port"
version = "1.0"
type = "platform-port"
"#,
  );
  let prod = ["plan", "com.example:fs-tests", "--usage", "prod", "--test-mode", "unit"];

  env
    .veebuild_cmd()
    .args(prod)
    .assert()
    .failure()
    .stderr(predicate::str::contains("com.example:fs-tests skips checks this variant requires"));

  env
    .veebuild_cmd()
    .args(prod)
    .arg("--allow-skipped-mandatory")
    .assert()
    .success();

  env
    .veebuild_cmd()
    .args(["plan", "com.example:fs-tests", "--test-mode", "unit"])
    .assert()
    .success();
}
