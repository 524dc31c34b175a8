//! Build execution: toolchain selection and the external command boundary.

pub mod command;
pub mod toolchain;

pub use command::{CommandError, CommandRunner, CommandSpec, ProcessRunner, RecordingRunner};
pub use toolchain::{ToolchainConfig, ToolchainDiscoveryError, ToolchainResolver};
