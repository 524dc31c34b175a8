//! Library rules: compile sources, then archive (static) or link a shared
//! object.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::builder::command::CommandSpec;
use crate::util::fs::ensure_dir;

use super::{
    compile_sources, dedup_parent_dirs, ExecutionContext, LinkArtifact, ResolvedDeps, Rule,
    RuleCore, UnsupportedDependencyKindError,
};

/// Descriptor kwargs for a `library` rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub abi: Option<String>,
}

/// Registry constructor for the `library` kind.
pub fn construct(module_path: &str, kwargs: toml::Value) -> Result<Arc<dyn Rule>> {
    let config: LibraryConfig = kwargs
        .try_into()
        .with_context(|| format!("invalid library rule in module {}", module_path))?;
    Ok(Arc::new(LibraryRule::from_config(module_path, config)))
}

/// Compiles sources into objects and produces a static archive
/// (`<name>.a`) or a shared object (`lib<name>.so`).
///
/// Outputs of library dependencies are appended to this rule's outputs so
/// a dependent binary links the whole closure.
pub struct LibraryRule {
    core: RuleCore,
    sources: Vec<String>,
    is_static: bool,
    cflags: Vec<String>,
    abi: Option<String>,
}

impl LibraryRule {
    pub fn from_config(module_path: &str, config: LibraryConfig) -> Self {
        LibraryRule {
            core: RuleCore::new(module_path, config.name, config.deps),
            sources: config.sources,
            is_static: config.is_static,
            cflags: config.cflags,
            abi: config.abi,
        }
    }

    fn do_execute(
        &self,
        ctx: &ExecutionContext<'_>,
        resolved: &ResolvedDeps,
    ) -> Result<Vec<PathBuf>> {
        let toolchain = ctx.toolchains.resolve(self.abi.as_deref())?;
        let src_dir = ctx.src_dir(self.core.module_path());
        let out_dir = ctx.out_dir(self.core.module_path(), self.core.name());
        ensure_dir(&out_dir)?;

        let objects = compile_sources(
            ctx,
            &toolchain,
            &src_dir,
            &out_dir,
            &self.sources,
            &self.cflags,
            !self.is_static,
        )?;

        let mut outputs = Vec::new();

        if self.is_static {
            let libfile = out_dir.join(format!("{}.a", self.core.name()));
            let spec = CommandSpec::new(&toolchain.ar)
                .arg("rc")
                .arg(libfile.display().to_string())
                .args(objects.iter().map(|o| o.display().to_string()))
                .echo(format!("archive {}", ctx.rel(&libfile)));
            ctx.runner
                .run(&spec)
                .with_context(|| format!("archiving failed for {}", self.core.address()))?;
            outputs.push(libfile);
        } else {
            let libfile = out_dir.join(format!("lib{}.so", self.core.name()));
            let spec = CommandSpec::new(&toolchain.cc)
                .arg("-shared")
                .arg("-o")
                .arg(libfile.display().to_string())
                .args(objects.iter().map(|o| o.display().to_string()))
                .echo(format!("link {}", ctx.rel(&libfile)));
            ctx.runner
                .run(&spec)
                .with_context(|| format!("linking failed for {}", self.core.address()))?;
            outputs.push(libfile);
        }

        // A library's artifact set includes its library dependencies.
        // A raw dependency string contributes once even if repeated.
        let mut seen = HashSet::new();
        for dep in self.core.deps() {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            if let Some(rules) = resolved.get(dep) {
                for rule in rules {
                    if rule.link_artifact().is_none() {
                        return Err(UnsupportedDependencyKindError {
                            consumer: self.core.address(),
                            dependency: rule.address(),
                            kind: rule.kind().to_string(),
                        }
                        .into());
                    }
                    outputs.extend(rule.outputs());
                }
            }
        }

        Ok(outputs)
    }
}

impl std::fmt::Debug for LibraryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryRule")
            .field("address", &self.core.address())
            .field("is_static", &self.is_static)
            .finish()
    }
}

impl Rule for LibraryRule {
    fn kind(&self) -> &'static str {
        "library"
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn module_path(&self) -> &str {
        self.core.module_path()
    }

    fn declared_dependencies(&self) -> &[String] {
        self.core.deps()
    }

    fn record_resolved_dependency(&self, raw: &str, resolved: Vec<Arc<dyn Rule>>) {
        self.core.record_resolved(raw, resolved);
    }

    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<()> {
        self.core.execute_once(|resolved| self.do_execute(ctx, resolved))
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.core.outputs()
    }

    fn link_artifact(&self) -> Option<LinkArtifact> {
        let outputs = self.core.outputs();
        if self.is_static {
            Some(LinkArtifact::StaticArchives(outputs))
        } else {
            Some(LinkArtifact::SharedLibrary {
                name: self.core.name().to_string(),
                search_dirs: dedup_parent_dirs(&outputs),
            })
        }
    }
}
