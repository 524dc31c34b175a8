//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Slipway - a declarative build tool for native and cross-compiled C targets
#[derive(Parser)]
#[command(name = "slipway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve targets and execute their build graph
    Build(BuildArgs),

    /// List the modules and rules under the build root
    List(ListArgs),

    /// Remove build outputs
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Targets to build: `/module/path`, `:rule`, `/module/path:rule`,
    /// or `/module/path:all`
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Build root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Define a variable for $(VAR) expansion in flags
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Print the commands that would run, as JSON, instead of executing
    #[arg(long)]
    pub plan: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Build root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Build root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
