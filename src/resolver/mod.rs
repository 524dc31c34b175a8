//! Target resolution and build-graph execution.
//!
//! The evaluator performs synchronous, depth-first recursive resolution:
//! parse the target, load its module, resolve the named rule (or expand the
//! wildcard), recurse into declared dependencies with the rule's own module
//! path as the base, then execute the rule. Execution is dependency-first
//! and memoized, so a diamond-shaped graph executes shared rules exactly
//! once; the active resolution stack is tracked so a dependency cycle fails
//! fast instead of recursing forever.

pub mod errors;
pub mod loader;

use std::sync::Arc;

use anyhow::Result;

use crate::core::address::TargetAddress;
use crate::rules::{ExecutionContext, Rule};
use crate::util::paths::module_basename;

use errors::EvalError;
use loader::ModuleLoader;

/// Resolves requested targets and executes their dependency closures.
///
/// All resolution state (the module cache, the toolchain probe, the
/// in-flight stack) is owned per invocation; nothing is process-global.
pub struct GraphEvaluator<'a> {
    loader: ModuleLoader,
    ctx: ExecutionContext<'a>,
}

impl<'a> GraphEvaluator<'a> {
    pub fn new(loader: ModuleLoader, ctx: ExecutionContext<'a>) -> Self {
        GraphEvaluator { loader, ctx }
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// Resolve each requested target and execute it dependency-first.
    ///
    /// Returns the resolved rules in request order (wildcards expanded).
    /// The first error aborts the whole invocation.
    pub fn resolve_and_execute(&self, targets: &[String]) -> Result<Vec<Arc<dyn Rule>>> {
        let mut resolved = Vec::new();
        let mut stack = Vec::new();

        for target in targets {
            resolved.extend(self.eval_target(target, "/", &mut stack)?);
        }

        Ok(resolved)
    }

    fn eval_target(
        &self,
        target: &str,
        base: &str,
        stack: &mut Vec<(String, String)>,
    ) -> Result<Vec<Arc<dyn Rule>>> {
        let addr = TargetAddress::parse(target)?.resolve_relative_to(base);
        let module_path = addr.module_path().unwrap_or(base).to_string();
        let module = self.loader.load(&module_path)?;

        if addr.is_wildcard() {
            let mut rules = Vec::new();
            for name in module.rule_names() {
                rules.extend(self.eval_target(&format!(":{}", name), &module_path, stack)?);
            }
            return Ok(rules);
        }

        let rule_name = match addr.rule_name() {
            Some(name) => name.to_string(),
            // A bare module path names the module's default rule.
            None => module_basename(&module_path).to_string(),
        };

        let rule = match module.rule(&rule_name) {
            Some(rule) => rule.clone(),
            None => {
                return Err(EvalError::UnresolvedTarget {
                    module: module_path,
                    rule: rule_name,
                    available: module.rule_names(),
                }
                .into())
            }
        };

        let key = (module_path.clone(), rule_name);
        if let Some(start) = stack.iter().position(|k| *k == key) {
            let mut cycle: Vec<String> = stack[start..]
                .iter()
                .map(|(module, rule)| format!("{}:{}", module, rule))
                .collect();
            cycle.push(format!("{}:{}", key.0, key.1));
            return Err(EvalError::CircularDependency { cycle }.into());
        }

        stack.push(key);
        let result = self.resolve_deps_and_execute(&rule, &module_path, stack);
        stack.pop();
        result?;

        Ok(vec![rule])
    }

    fn resolve_deps_and_execute(
        &self,
        rule: &Arc<dyn Rule>,
        module_path: &str,
        stack: &mut Vec<(String, String)>,
    ) -> Result<()> {
        // Dependency targets are relative to the dependent rule's module.
        for dep in rule.declared_dependencies() {
            let resolved = self.eval_target(dep, module_path, stack)?;
            rule.record_resolved_dependency(dep, resolved);
        }

        rule.execute(&self.ctx)
    }
}
