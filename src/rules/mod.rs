//! Build rules: the rule contract, the kind registry, and shared execution
//! machinery.
//!
//! A rule is one buildable unit. The resolution engine only sees the `Rule`
//! trait; concrete kinds (`library`, `binary`, and their AVR-configured
//! variants) are registered in a `RuleRegistry` so new build-action kinds
//! can be added without touching the loader or evaluator.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use thiserror::Error;

use crate::builder::command::{CommandRunner, CommandSpec};
use crate::builder::toolchain::{ToolchainConfig, ToolchainResolver};
use crate::util::expand::expand_flags;
use crate::util::fs::{ensure_dir, expand_sources};
use crate::util::paths::{display_relative, module_to_fs_path, replace_ext};

pub mod avr;
pub mod binary;
pub mod library;

pub use binary::{BinaryRule, PostLinkStep};
pub use library::LibraryRule;

/// Resolved dependencies, keyed by the raw dependency target string.
///
/// One raw string can resolve to several rules (wildcard expansion).
pub type ResolvedDeps = BTreeMap<String, Vec<Arc<dyn Rule>>>;

/// A link-style rule declared a dependency its linking logic cannot consume.
#[derive(Debug, Clone, Error)]
#[error("`{consumer}` cannot consume dependency `{dependency}` of kind `{kind}`")]
pub struct UnsupportedDependencyKindError {
    pub consumer: String,
    pub dependency: String,
    pub kind: String,
}

/// How a dependent rule links against this rule's artifacts.
#[derive(Debug, Clone)]
pub enum LinkArtifact {
    /// Archives passed to the linker as direct inputs.
    StaticArchives(Vec<PathBuf>),
    /// A `-L` search dir per distinct output directory plus `-l<name>`.
    SharedLibrary {
        name: String,
        search_dirs: Vec<PathBuf>,
    },
}

/// One buildable unit.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// The rule-kind identifier this rule was registered under.
    fn kind(&self) -> &'static str;

    /// The declared rule name.
    fn name(&self) -> &str;

    /// The absolute path of the owning module.
    fn module_path(&self) -> &str;

    /// Declared dependencies as raw target strings, in declaration order.
    fn declared_dependencies(&self) -> &[String];

    /// Record the rules a declared dependency resolved to.
    ///
    /// Called once per declared dependency by the evaluator, before
    /// `execute`. Later calls for the same raw string are ignored.
    fn record_resolved_dependency(&self, raw: &str, resolved: Vec<Arc<dyn Rule>>);

    /// Perform the build action.
    ///
    /// Idempotent at the engine level: the first call runs the action, any
    /// further call is a no-op, and concurrent callers block until the
    /// in-flight execution completes.
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<()>;

    /// Produced artifact paths. Only meaningful after `execute`.
    fn outputs(&self) -> Vec<PathBuf>;

    /// How a dependent links against this rule, or `None` if it is not a
    /// linkable kind.
    fn link_artifact(&self) -> Option<LinkArtifact>;

    /// `module:rule` display form.
    fn address(&self) -> String {
        format!("{}:{}", self.module_path(), self.name())
    }
}

/// Everything a rule needs at execution time, owned by the invocation.
pub struct ExecutionContext<'a> {
    pub build_root: &'a Path,
    pub toolchains: &'a ToolchainResolver,
    pub runner: &'a dyn CommandRunner,
    pub vars: &'a HashMap<String, String>,
}

impl<'a> ExecutionContext<'a> {
    /// The source directory of a module.
    pub fn src_dir(&self, module_path: &str) -> PathBuf {
        module_to_fs_path(self.build_root, module_path)
    }

    /// The output directory for one rule: `<root>/out/<module>/<rule>`.
    pub fn out_dir(&self, module_path: &str, rule_name: &str) -> PathBuf {
        module_to_fs_path(&self.build_root.join("out"), module_path).join(rule_name)
    }

    /// Root-relative display form of a path, for command echoes.
    pub fn rel(&self, path: &Path) -> String {
        display_relative(path, self.build_root)
    }
}

/// Constructor for one rule kind: `(modulePath, kwargs) -> Rule`.
pub type RuleConstructor = fn(&str, toml::Value) -> Result<Arc<dyn Rule>>;

/// Maps rule-kind identifiers to constructors.
///
/// Scoped to one build invocation; the loader looks kinds up here while
/// evaluating descriptor files.
pub struct RuleRegistry {
    constructors: HashMap<String, RuleConstructor>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        RuleRegistry {
            constructors: HashMap::new(),
        }
    }

    /// Create a registry with the builtin rule kinds.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = RuleRegistry::new();
        registry.register("library", library::construct);
        registry.register("binary", binary::construct);
        registry.register("avr_library", avr::construct_library);
        registry.register("avr_binary", avr::construct_binary);
        registry
    }

    /// Register a constructor for a rule kind.
    pub fn register(&mut self, kind: impl Into<String>, constructor: RuleConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    /// Registered kind identifiers, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Construct a rule of the given kind.
    pub fn construct(
        &self,
        kind: &str,
        module_path: &str,
        kwargs: toml::Value,
    ) -> Result<Arc<dyn Rule>> {
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            anyhow!(
                "unknown rule kind `{}` (registered kinds: {})",
                kind,
                self.kinds().join(", ")
            )
        })?;
        constructor(module_path, kwargs)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        RuleRegistry::with_builtin_kinds()
    }
}

/// State shared by every rule kind: identity, declared deps, and the
/// mutex-guarded executed/outputs/resolved-deps fields.
pub struct RuleCore {
    module_path: String,
    name: String,
    deps: Vec<String>,
    state: Mutex<RuleState>,
}

#[derive(Default)]
struct RuleState {
    executed: bool,
    outputs: Vec<PathBuf>,
    resolved: ResolvedDeps,
}

impl RuleCore {
    pub fn new(module_path: impl Into<String>, name: impl Into<String>, deps: Vec<String>) -> Self {
        RuleCore {
            module_path: module_path.into(),
            name: name.into(),
            deps,
            state: Mutex::new(RuleState::default()),
        }
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.module_path, self.name)
    }

    pub fn record_resolved(&self, raw: &str, resolved: Vec<Arc<dyn Rule>>) {
        let mut state = self.state.lock().unwrap();
        state.resolved.entry(raw.to_string()).or_insert(resolved);
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().outputs.clone()
    }

    /// Run the kind-specific action exactly once.
    ///
    /// The state lock is held for the whole action, so a concurrent caller
    /// blocks until the in-flight execution completes and then sees the
    /// executed flag.
    pub fn execute_once<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce(&ResolvedDeps) -> Result<Vec<PathBuf>>,
    {
        let mut state = self.state.lock().unwrap();
        if state.executed {
            return Ok(());
        }
        state.executed = true;

        tracing::info!("Building {}:{}", self.module_path, self.name);

        let outputs = action(&state.resolved)?;
        state.outputs = outputs;
        Ok(())
    }
}

/// Compile a rule's sources into object files, in parallel.
///
/// Returns the object paths in source order regardless of completion order.
pub(crate) fn compile_sources(
    ctx: &ExecutionContext<'_>,
    toolchain: &ToolchainConfig,
    src_dir: &Path,
    out_dir: &Path,
    sources: &[String],
    cflags: &[String],
    pic: bool,
) -> Result<Vec<PathBuf>> {
    let sources = expand_sources(src_dir, sources)?;
    let cflags = expand_flags(cflags, ctx.vars)?;

    let mut jobs = Vec::new();
    for rel in &sources {
        let src = src_dir.join(rel);
        let obj = out_dir.join(replace_ext(rel, "o"));
        if let Some(parent) = obj.parent() {
            ensure_dir(parent)?;
        }
        jobs.push((src, obj));
    }

    jobs.par_iter().try_for_each(|(src, obj)| -> Result<()> {
        let mut spec = CommandSpec::new(&toolchain.cc)
            .arg(format!("-I{}", ctx.build_root.display()))
            .args(toolchain.default_cflags.iter().cloned())
            .args(cflags.iter().cloned());
        if pic {
            spec = spec.arg("-fpic");
        }
        let spec = spec
            .arg("-c")
            .arg(src.display().to_string())
            .arg("-o")
            .arg(obj.display().to_string())
            .echo(format!("compile {}", ctx.rel(obj)));

        ctx.runner.run(&spec).context("compilation failed")?;
        Ok(())
    })?;

    Ok(jobs.into_iter().map(|(_, obj)| obj).collect())
}

/// One entry per distinct parent directory, in first-seen order.
pub(crate) fn dedup_parent_dirs(outputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for output in outputs {
        if let Some(dir) = output.parent() {
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
    }
    dirs
}
