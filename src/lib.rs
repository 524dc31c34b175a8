//! Slipway - a declarative build tool for native and cross-compiled targets
//!
//! This crate provides the core library functionality for Slipway,
//! including target resolution, module loading, and build-graph execution.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod rules;
pub mod util;

/// Test utilities for Slipway unit tests.
///
/// This module is only available when running tests. It provides helpers
/// for laying out temporary build trees with descriptor files.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{address::TargetAddress, module::Module};

pub use crate::builder::command::{CommandRunner, CommandSpec, ProcessRunner, RecordingRunner};
pub use crate::builder::toolchain::{ToolchainConfig, ToolchainResolver};
pub use crate::resolver::{loader::ModuleLoader, GraphEvaluator};
pub use crate::rules::{ExecutionContext, Rule, RuleRegistry};
