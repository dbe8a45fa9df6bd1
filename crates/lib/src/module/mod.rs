//! Module data model.
//!
//! A [`Module`] is one versioned, typed unit of the product line: an
//! application, the platform port it runs on, feature packs, the
//! architecture, simulation front-ends, generators and validation suites.
//! Modules reference each other through [`DependencyRef`]s.

mod coordinate;
mod types;

pub use coordinate::{Coordinate, CoordinateError};
pub use types::{
  ArtifactKind, Capability, DependencyRef, FrontEndKind, Module, ModuleType, Scope, StepCommands, parse_version,
};
