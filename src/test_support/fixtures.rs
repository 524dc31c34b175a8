//! Fixtures for common test scenarios: temporary build trees and a
//! one-call evaluation harness over a recording runner.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::builder::command::RecordingRunner;
use crate::builder::toolchain::ToolchainResolver;
use crate::core::descriptor::DESCRIPTOR_FILE;
use crate::resolver::{loader::ModuleLoader, GraphEvaluator};
use crate::rules::{ExecutionContext, Rule, RuleRegistry};
use crate::util::paths::module_to_fs_path;

/// Host ABI used by fixture evaluations (no probe).
pub const TEST_HOST_ABI: &str = "x86_64-linux-gnu";

/// A temporary build tree of module directories with descriptor files.
pub struct BuildTree {
    dir: TempDir,
}

impl BuildTree {
    pub fn new() -> Self {
        BuildTree {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a module's descriptor file.
    pub fn module(&self, module_path: &str, descriptor: &str) -> &Self {
        let dir = module_to_fs_path(self.root(), module_path);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), descriptor).unwrap();
        self
    }

    /// Write a source file below a module directory.
    pub fn source(&self, module_path: &str, file: &str, contents: &str) -> &Self {
        let path = module_to_fs_path(self.root(), module_path).join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        self
    }
}

impl Default for BuildTree {
    fn default() -> Self {
        BuildTree::new()
    }
}

/// Resolve and execute targets against a tree, recording commands into
/// `runner` instead of spawning tools.
pub fn evaluate_tree(
    tree: &BuildTree,
    targets: &[&str],
    vars: &[(&str, &str)],
    runner: &RecordingRunner,
) -> anyhow::Result<Vec<Arc<dyn Rule>>> {
    let toolchains = ToolchainResolver::with_host_abi(TEST_HOST_ABI);
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let loader = ModuleLoader::new(tree.root(), RuleRegistry::with_builtin_kinds());
    let ctx = ExecutionContext {
        build_root: tree.root(),
        toolchains: &toolchains,
        runner,
        vars: &vars,
    };

    let evaluator = GraphEvaluator::new(loader, ctx);
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    evaluator.resolve_and_execute(&targets)
}
