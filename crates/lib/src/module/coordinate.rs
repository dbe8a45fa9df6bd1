//! Module coordinates (`namespace:name`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DEFAULT_NAMESPACE;

/// Identifies a module independently of its version.
///
/// Coordinates order by namespace, then name. They serialize as the
/// `namespace:name` string so they can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
  namespace: String,
  name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
  #[error("coordinate is empty")]
  Empty,

  #[error("invalid coordinate '{input}': {reason}")]
  Invalid { input: String, reason: &'static str },
}

impl Coordinate {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      namespace: namespace.into(),
      name: name.into(),
    }
  }

  /// A coordinate in the default namespace.
  pub fn local(name: impl Into<String>) -> Self {
    Self::new(DEFAULT_NAMESPACE, name)
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for Coordinate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.namespace, self.name)
  }
}

fn valid_part(part: &str) -> bool {
  !part.is_empty()
    && part
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl FromStr for Coordinate {
  type Err = CoordinateError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(CoordinateError::Empty);
    }

    let (namespace, name) = match s.split_once(':') {
      Some((ns, name)) => (ns, name),
      None => (DEFAULT_NAMESPACE, s),
    };

    if !valid_part(namespace) || !valid_part(name) {
      return Err(CoordinateError::Invalid {
        input: s.to_string(),
        reason: "expected `name` or `namespace:name` made of [A-Za-z0-9._-]",
      });
    }

    Ok(Self::new(namespace, name))
  }
}

impl TryFrom<String> for Coordinate {
  type Error = CoordinateError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Coordinate> for String {
  fn from(value: Coordinate) -> Self {
    value.to_string()
  }
}
