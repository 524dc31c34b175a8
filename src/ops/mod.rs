//! High-level operations wired by the CLI.

pub mod build;
pub mod list;

pub use build::{build, BuildOptions, BuildOutcome, BuiltTarget};
pub use list::{list, ModuleListing, RuleListing};
