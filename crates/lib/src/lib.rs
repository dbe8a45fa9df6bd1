//! veebuild-lib: module composition and build-graph engine
//!
//! This crate provides the pieces of a veebuild:
//! - `Registry`: typed module descriptions, loaded from TOML
//! - `resolve`: the dependency closure of a root under a `VariantContext`
//! - `plan`: a deterministic DAG of build steps with idempotency keys
//! - `execute`: runs a plan on a bounded worker pool against a `Toolchain`
//!   and an `ArtifactStore`
//! - `Engine`: memoizing front door over all of the above

pub mod consts;
pub mod engine;
pub mod execute;
pub mod module;
pub mod plan;
pub mod registry;
pub mod resolve;
pub mod store;
pub mod util;
pub mod variant;

pub use engine::{Engine, EngineError};
