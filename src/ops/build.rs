//! The build operation: wire one evaluator per invocation and run it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::command::{CommandRunner, CommandSpec, ProcessRunner, RecordingRunner};
use crate::builder::toolchain::ToolchainResolver;
use crate::resolver::{loader::ModuleLoader, GraphEvaluator};
use crate::rules::{ExecutionContext, RuleRegistry};

/// Options for one build invocation.
pub struct BuildOptions {
    /// Build root directory (modules are addressed relative to it).
    pub root: PathBuf,
    /// Requested target strings.
    pub targets: Vec<String>,
    /// Variables for `$(VAR)` expansion in flags.
    pub vars: HashMap<String, String>,
    /// Record commands instead of executing them.
    pub plan_only: bool,
}

/// One resolved and executed target.
pub struct BuiltTarget {
    pub address: String,
    pub outputs: Vec<PathBuf>,
}

/// Result of a build invocation.
pub struct BuildOutcome {
    /// Resolved targets in request order (wildcards expanded).
    pub built: Vec<BuiltTarget>,
    /// The recorded commands when `plan_only` was set.
    pub plan: Option<Vec<CommandSpec>>,
}

/// Resolve and execute the requested targets.
pub fn build(opts: &BuildOptions) -> Result<BuildOutcome> {
    let root = opts
        .root
        .canonicalize()
        .with_context(|| format!("build root not found: {}", opts.root.display()))?;

    let toolchains = ToolchainResolver::new();

    if opts.plan_only {
        let runner = RecordingRunner::new();
        let built = run(&root, &toolchains, &runner, opts)?;
        Ok(BuildOutcome {
            built,
            plan: Some(runner.commands()),
        })
    } else {
        let runner = ProcessRunner::new();
        let built = run(&root, &toolchains, &runner, opts)?;
        Ok(BuildOutcome { built, plan: None })
    }
}

fn run(
    root: &Path,
    toolchains: &ToolchainResolver,
    runner: &dyn CommandRunner,
    opts: &BuildOptions,
) -> Result<Vec<BuiltTarget>> {
    let loader = ModuleLoader::new(root, RuleRegistry::with_builtin_kinds());
    let ctx = ExecutionContext {
        build_root: root,
        toolchains,
        runner,
        vars: &opts.vars,
    };

    let evaluator = GraphEvaluator::new(loader, ctx);
    let rules = evaluator.resolve_and_execute(&opts.targets)?;

    Ok(rules
        .iter()
        .map(|rule| BuiltTarget {
            address: rule.address(),
            outputs: rule.outputs(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::BuildTree;

    #[test]
    fn test_plan_records_without_executing() {
        let tree = BuildTree::new();
        tree.module(
            "/fw",
            r#"
            [[avr_binary]]
            name = "blink"
            sources = ["blink.c"]
            mcu = "atmega328p"
            "#,
        );

        let opts = BuildOptions {
            root: tree.root().to_path_buf(),
            targets: vec!["/fw:blink".to_string()],
            vars: HashMap::new(),
            plan_only: true,
        };

        let outcome = build(&opts).unwrap();
        let plan = outcome.plan.unwrap();
        assert!(plan.iter().any(|c| c.program == "avr-gcc"));
        assert!(plan.iter().any(|c| c.program == "avr-objcopy"));

        assert_eq!(outcome.built.len(), 1);
        assert_eq!(outcome.built[0].address, "/fw:blink");

        // No artifacts were produced on disk.
        assert!(!tree.root().join("out/fw/blink/blink.elf").exists());
    }
}
