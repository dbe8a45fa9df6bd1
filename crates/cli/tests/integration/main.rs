//! Integration tests that build fixture registries with real shell commands.

mod common;

mod build_tests;
mod plan_tests;
