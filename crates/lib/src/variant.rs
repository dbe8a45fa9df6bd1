//! Build-time variant selectors.
//!
//! A [`VariantContext`] is built once per invocation and threaded explicitly
//! through resolution, plan compilation and execution. It replaces any
//! ambient configuration: two runs with equal contexts over the same registry
//! resolve and plan identically.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::consts::MANDATORY_PROD_CHECKS;
use crate::util::hash::{HashError, Hashable, ObjectHash};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageProfile {
  #[default]
  Eval,
  Prod,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetEnvironment {
  #[default]
  Embedded,
  Simulated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestMode {
  #[default]
  None,
  Unit,
  Integration,
}

/// Name of a quality check (`changelog`, `readme`, `license`, ...). Stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CheckName(String);

impl CheckName {
  pub fn new(name: impl AsRef<str>) -> Self {
    Self(name.as_ref().trim().to_ascii_lowercase())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_mandatory_for_prod(&self) -> bool {
    MANDATORY_PROD_CHECKS.contains(&self.0.as_str())
  }
}

impl From<String> for CheckName {
  fn from(value: String) -> Self {
    Self::new(value)
  }
}

impl From<&str> for CheckName {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<CheckName> for String {
  fn from(value: CheckName) -> Self {
    value.0
  }
}

impl fmt::Display for CheckName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Parse a comma-separated check list such as `"changelog,readme,license"`.
pub fn parse_check_list(input: &str) -> BTreeSet<CheckName> {
  input
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(CheckName::new)
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
  #[error(
    "production build with tests enabled may not skip mandatory checks: {}",
    join_checks(.skipped)
  )]
  InvalidVariant { skipped: Vec<CheckName> },

  #[error("unknown usage profile '{0}' (expected eval or prod)")]
  UnknownUsage(String),

  #[error("unknown target environment '{0}' (expected embedded or simulated)")]
  UnknownTarget(String),

  #[error("unknown test mode '{0}' (expected none, unit or integration)")]
  UnknownTestMode(String),
}

fn join_checks(checks: &[CheckName]) -> String {
  checks.iter().map(CheckName::as_str).collect::<Vec<_>>().join(", ")
}

impl FromStr for UsageProfile {
  type Err = VariantError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "eval" | "evaluation" => Ok(UsageProfile::Eval),
      "prod" | "production" => Ok(UsageProfile::Prod),
      _ => Err(VariantError::UnknownUsage(s.to_string())),
    }
  }
}

impl FromStr for TargetEnvironment {
  type Err = VariantError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "embedded" | "emb" => Ok(TargetEnvironment::Embedded),
      "simulated" | "sim" => Ok(TargetEnvironment::Simulated),
      _ => Err(VariantError::UnknownTarget(s.to_string())),
    }
  }
}

impl FromStr for TestMode {
  type Err = VariantError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "none" => Ok(TestMode::None),
      "unit" | "junit" => Ok(TestMode::Unit),
      "integration" | "main" => Ok(TestMode::Integration),
      _ => Err(VariantError::UnknownTestMode(s.to_string())),
    }
  }
}

impl fmt::Display for UsageProfile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      UsageProfile::Eval => "eval",
      UsageProfile::Prod => "prod",
    })
  }
}

impl fmt::Display for TargetEnvironment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      TargetEnvironment::Embedded => "embedded",
      TargetEnvironment::Simulated => "simulated",
    })
  }
}

impl fmt::Display for TestMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      TestMode::None => "none",
      TestMode::Unit => "unit",
      TestMode::Integration => "integration",
    })
  }
}

/// Immutable record of the build-time selectors.
///
/// Construct through [`VariantContext::builder`]; the fields are private so a
/// context can only exist in a validated state. Deserialization goes through
/// the builder too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVariant")]
pub struct VariantContext {
  usage: UsageProfile,
  target: TargetEnvironment,
  test_mode: TestMode,
  skipped_checks: BTreeSet<CheckName>,
  allow_skipped_mandatory: bool,
}

impl Hashable for VariantContext {}

impl VariantContext {
  pub fn builder() -> VariantBuilder {
    VariantBuilder::default()
  }

  pub fn usage(&self) -> UsageProfile {
    self.usage
  }

  pub fn target(&self) -> TargetEnvironment {
    self.target
  }

  pub fn test_mode(&self) -> TestMode {
    self.test_mode
  }

  pub fn skipped_checks(&self) -> &BTreeSet<CheckName> {
    &self.skipped_checks
  }

  pub fn allows_skipped_mandatory(&self) -> bool {
    self.allow_skipped_mandatory
  }

  pub fn content_hash(&self) -> Result<ObjectHash, HashError> {
    self.compute_hash()
  }

  /// Check a skip list against the mandatory production checks.
  ///
  /// Applies to the context's own list and to any per-module list merged
  /// into it. A production build with tests only skips mandatory checks
  /// under the explicit override, which is logged each time.
  pub fn admit_skips(&self, checks: &BTreeSet<CheckName>) -> Result<(), VariantError> {
    if self.usage != UsageProfile::Prod || self.test_mode == TestMode::None {
      return Ok(());
    }
    let mandatory: Vec<CheckName> = checks.iter().filter(|c| c.is_mandatory_for_prod()).cloned().collect();
    if mandatory.is_empty() {
      return Ok(());
    }
    if !self.allow_skipped_mandatory {
      return Err(VariantError::InvalidVariant { skipped: mandatory });
    }
    warn!(
      checks = %join_checks(&mandatory),
      test_mode = %self.test_mode,
      "skipping mandatory checks for a production build by explicit override"
    );
    Ok(())
  }
}

/// Serialized form of a [`VariantContext`], validated on the way in.
#[derive(Deserialize)]
struct RawVariant {
  #[serde(default)]
  usage: UsageProfile,
  #[serde(default)]
  target: TargetEnvironment,
  #[serde(default)]
  test_mode: TestMode,
  #[serde(default)]
  skipped_checks: BTreeSet<CheckName>,
  #[serde(default)]
  allow_skipped_mandatory: bool,
}

impl TryFrom<RawVariant> for VariantContext {
  type Error = VariantError;

  fn try_from(raw: RawVariant) -> Result<Self, Self::Error> {
    VariantContext::builder()
      .usage(raw.usage)
      .target(raw.target)
      .test_mode(raw.test_mode)
      .skip_checks(raw.skipped_checks)
      .allow_skipped_mandatory_checks(raw.allow_skipped_mandatory)
      .build()
  }
}

impl fmt::Display for VariantContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "usage={} target={} tests={}", self.usage, self.target, self.test_mode)?;
    if !self.skipped_checks.is_empty() {
      let checks: Vec<&str> = self.skipped_checks.iter().map(CheckName::as_str).collect();
      write!(f, " skip={}", checks.join(","))?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default)]
pub struct VariantBuilder {
  usage: UsageProfile,
  target: TargetEnvironment,
  test_mode: TestMode,
  skipped_checks: BTreeSet<CheckName>,
  allow_skipped_mandatory: bool,
}

impl VariantBuilder {
  pub fn usage(mut self, usage: UsageProfile) -> Self {
    self.usage = usage;
    self
  }

  pub fn target(mut self, target: TargetEnvironment) -> Self {
    self.target = target;
    self
  }

  pub fn test_mode(mut self, test_mode: TestMode) -> Self {
    self.test_mode = test_mode;
    self
  }

  pub fn skip_check(mut self, check: impl Into<CheckName>) -> Self {
    self.skipped_checks.insert(check.into());
    self
  }

  pub fn skip_checks<C: Into<CheckName>>(mut self, checks: impl IntoIterator<Item = C>) -> Self {
    self.skipped_checks.extend(checks.into_iter().map(Into::into));
    self
  }

  /// Explicitly allow a production test build to skip mandatory checks.
  ///
  /// The override is logged every time a context is built with it in effect.
  pub fn allow_skipped_mandatory_checks(mut self, allow: bool) -> Self {
    self.allow_skipped_mandatory = allow;
    self
  }

  pub fn build(self) -> Result<VariantContext, VariantError> {
    let ctx = VariantContext {
      usage: self.usage,
      target: self.target,
      test_mode: self.test_mode,
      skipped_checks: self.skipped_checks,
      allow_skipped_mandatory: self.allow_skipped_mandatory,
    };
    ctx.admit_skips(&ctx.skipped_checks)?;
    Ok(ctx)
  }
}

#[cfg(test)]
mod tests {
  use tracing_test::traced_test;

  use super::*;

  #[test]
  fn default_context_is_eval_embedded_without_tests() {
    let ctx = VariantContext::default();
    assert_eq!(ctx.usage(), UsageProfile::Eval);
    assert_eq!(ctx.target(), TargetEnvironment::Embedded);
    assert_eq!(ctx.test_mode(), TestMode::None);
    assert!(ctx.skipped_checks().is_empty());
    assert_eq!(VariantContext::builder().build().unwrap(), ctx);
  }

  #[test]
  fn prod_tests_cannot_skip_mandatory_checks() {
    let err = VariantContext::builder()
      .usage(UsageProfile::Prod)
      .test_mode(TestMode::Unit)
      .skip_checks(parse_check_list("changelog,readme,license"))
      .build()
      .unwrap_err();

    assert_eq!(
      err,
      VariantError::InvalidVariant {
        skipped: vec![CheckName::new("license")]
      }
    );
  }

  #[test]
  fn prod_without_tests_may_skip_checks() {
    let ctx = VariantContext::builder()
      .usage(UsageProfile::Prod)
      .skip_checks(["license", "nullanalysis"])
      .build()
      .unwrap();
    assert_eq!(ctx.skipped_checks().len(), 2);
  }

  #[test]
  fn eval_tests_may_skip_checks() {
    let ctx = VariantContext::builder()
      .test_mode(TestMode::Integration)
      .skip_check("license")
      .build();
    assert!(ctx.is_ok());
  }

  #[test]
  fn optional_checks_are_always_skippable() {
    let ctx = VariantContext::builder()
      .usage(UsageProfile::Prod)
      .test_mode(TestMode::Unit)
      .skip_checks(["changelog", "readme"])
      .build();
    assert!(ctx.is_ok());
  }

  #[test]
  #[traced_test]
  fn explicit_override_is_logged() {
    let ctx = VariantContext::builder()
      .usage(UsageProfile::Prod)
      .test_mode(TestMode::Unit)
      .skip_check("nullanalysis")
      .allow_skipped_mandatory_checks(true)
      .build()
      .unwrap();

    assert!(ctx.allows_skipped_mandatory());
    assert!(logs_contain("skipping mandatory checks"));
  }

  #[test]
  fn deserialization_validates() {
    let invalid = serde_json::json!({
      "usage": "prod",
      "target": "embedded",
      "test_mode": "unit",
      "skipped_checks": ["license"],
      "allow_skipped_mandatory": false,
    });
    let err = serde_json::from_value::<VariantContext>(invalid).unwrap_err();
    assert!(err.to_string().contains("may not skip mandatory checks"));

    let ctx = VariantContext::builder()
      .usage(UsageProfile::Prod)
      .test_mode(TestMode::Integration)
      .skip_checks(["readme", "nullanalysis"])
      .allow_skipped_mandatory_checks(true)
      .build()
      .unwrap();
    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(serde_json::from_value::<VariantContext>(json).unwrap(), ctx);
  }

  #[test]
  fn module_skip_lists_follow_the_same_policy() {
    let prod = VariantContext::builder()
      .usage(UsageProfile::Prod)
      .test_mode(TestMode::Unit)
      .build()
      .unwrap();
    assert!(prod.admit_skips(&parse_check_list("changelog,readme")).is_ok());
    assert_eq!(
      prod.admit_skips(&parse_check_list("readme,license,nullanalysis")),
      Err(VariantError::InvalidVariant {
        skipped: vec![CheckName::new("license"), CheckName::new("nullanalysis")]
      })
    );
    assert!(
      VariantContext::default()
        .admit_skips(&parse_check_list("license"))
        .is_ok()
    );
  }

  #[test]
  fn parses_selectors() {
    assert_eq!("PROD".parse::<UsageProfile>().unwrap(), UsageProfile::Prod);
    assert_eq!("sim".parse::<TargetEnvironment>().unwrap(), TargetEnvironment::Simulated);
    assert_eq!("emb".parse::<TargetEnvironment>().unwrap(), TargetEnvironment::Embedded);
    assert_eq!("junit".parse::<TestMode>().unwrap(), TestMode::Unit);
    assert!(matches!(
      "weekly".parse::<TestMode>(),
      Err(VariantError::UnknownTestMode(_))
    ));
  }

  #[test]
  fn check_list_parsing_trims_and_dedups() {
    let checks = parse_check_list(" readme, License ,,readme");
    let names: Vec<&str> = checks.iter().map(CheckName::as_str).collect();
    assert_eq!(names, vec!["license", "readme"]);
  }

  #[test]
  fn content_hash_tracks_selectors() {
    let a = VariantContext::default().content_hash().unwrap();
    let b = VariantContext::default().content_hash().unwrap();
    let c = VariantContext::builder()
      .target(TargetEnvironment::Simulated)
      .build()
      .unwrap()
      .content_hash()
      .unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
  }
}
