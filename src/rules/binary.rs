//! Binary rules: compile sources, link against resolved library
//! dependencies, then run any configured post-link steps.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::builder::command::CommandSpec;
use crate::util::expand::expand_flags;
use crate::util::fs::ensure_dir;

use super::{
    compile_sources, ExecutionContext, LinkArtifact, ResolvedDeps, Rule, RuleCore,
    UnsupportedDependencyKindError,
};

/// Descriptor kwargs for a `binary` rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinaryConfig {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub ldflags: Vec<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub abi: Option<String>,
}

/// An external tool invocation chained after the link.
///
/// The tool name is cross-prefixed through the rule's toolchain
/// (`objcopy` becomes `avr-objcopy` for the `avr` ABI); `{input}` in the
/// args is the linked binary and `{output}` is `<name>.<output_extension>`,
/// which is appended to the rule's outputs.
#[derive(Debug, Clone)]
pub struct PostLinkStep {
    pub tool: String,
    pub args: Vec<String>,
    pub output_extension: Option<String>,
}

/// Registry constructor for the `binary` kind.
pub fn construct(module_path: &str, kwargs: toml::Value) -> Result<Arc<dyn Rule>> {
    let config: BinaryConfig = kwargs
        .try_into()
        .with_context(|| format!("invalid binary rule in module {}", module_path))?;
    Ok(Arc::new(BinaryRule::from_config(module_path, config)))
}

/// Compiles sources and links them into an executable, consuming the link
/// artifacts of every resolved library dependency.
pub struct BinaryRule {
    core: RuleCore,
    sources: Vec<String>,
    is_static: bool,
    cflags: Vec<String>,
    ldflags: Vec<String>,
    abi: Option<String>,
    link_extension: Option<String>,
    link_map: bool,
    post_link: Vec<PostLinkStep>,
}

impl BinaryRule {
    pub fn from_config(module_path: &str, config: BinaryConfig) -> Self {
        BinaryRule {
            core: RuleCore::new(module_path, config.name, config.deps),
            sources: config.sources,
            is_static: config.is_static,
            cflags: config.cflags,
            ldflags: config.ldflags,
            abi: config.abi,
            link_extension: None,
            link_map: false,
            post_link: Vec::new(),
        }
    }

    /// Give the linked binary a file extension (e.g. `elf`).
    pub fn with_link_extension(mut self, extension: impl Into<String>) -> Self {
        self.link_extension = Some(extension.into());
        self
    }

    /// Emit a linker map file next to the binary.
    pub fn with_link_map(mut self) -> Self {
        self.link_map = true;
        self
    }

    /// Chain a post-link step.
    pub fn with_post_link_step(mut self, step: PostLinkStep) -> Self {
        self.post_link.push(step);
        self
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

        let base = out_dir.join(self.core.name());
        let target = match self.link_extension {
            Some(ref ext) => out_dir.join(format!("{}.{}", self.core.name(), ext)),
            None => base.clone(),
        };

        let mut spec = CommandSpec::new(&toolchain.cc)
            .args(toolchain.default_ldflags.iter().cloned());
        if self.link_map {
            spec = spec.arg(format!("-Wl,-Map,{}.map", base.display()));
        }
        spec = spec
            .args(expand_flags(&self.ldflags, ctx.vars)?)
            .arg("-o")
            .arg(target.display().to_string())
            .args(objects.iter().map(|o| o.display().to_string()));

        // Link inputs from resolved dependencies, in declaration order.
        // A raw dependency string contributes once even if repeated.
        let mut seen = HashSet::new();
        for dep in self.core.deps() {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            if let Some(rules) = resolved.get(dep) {
                for rule in rules {
                    match rule.link_artifact() {
                        Some(LinkArtifact::StaticArchives(archives)) => {
                            spec = spec.args(archives.iter().map(|a| a.display().to_string()));
                        }
                        Some(LinkArtifact::SharedLibrary { name, search_dirs }) => {
                            for dir in &search_dirs {
                                spec = spec.arg(format!("-L{}", dir.display()));
                            }
                            spec = spec.arg(format!("-l{}", name));
                        }
                        None => {
                            return Err(UnsupportedDependencyKindError {
                                consumer: self.core.address(),
                                dependency: rule.address(),
                                kind: rule.kind().to_string(),
                            }
                            .into());
                        }
                    }
                }
            }
        }

        let spec = spec.echo(format!("link {}", ctx.rel(&target)));
        ctx.runner
            .run(&spec)
            .with_context(|| format!("linking failed for {}", self.core.address()))?;

        let mut outputs = vec![target.clone()];

        for step in &self.post_link {
            let output = step
                .output_extension
                .as_ref()
                .map(|ext| out_dir.join(format!("{}.{}", self.core.name(), ext)));

            let args: Vec<String> = step
                .args
                .iter()
                .map(|arg| {
                    let arg = arg.replace("{input}", &target.display().to_string());
                    match output {
                        Some(ref out) => arg.replace("{output}", &out.display().to_string()),
                        None => arg,
                    }
                })
                .collect();

            let echoed = output.as_deref().unwrap_or(&target);
            let spec = CommandSpec::new(toolchain.tool(&step.tool))
                .args(args)
                .echo(format!("{} {}", step.tool, ctx.rel(echoed)));

            ctx.runner.run(&spec).with_context(|| {
                format!("{} step failed for {}", step.tool, self.core.address())
            })?;

            if let Some(out) = output {
                outputs.push(out);
            }
        }

        Ok(outputs)
    }
}

impl std::fmt::Debug for BinaryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryRule")
            .field("address", &self.core.address())
            .field("is_static", &self.is_static)
            .finish()
    }
}

impl Rule for BinaryRule {
    fn kind(&self) -> &'static str {
        "binary"
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

    /// Binaries are not linkable dependencies.
    fn link_artifact(&self) -> Option<LinkArtifact> {
        None
    }
}
