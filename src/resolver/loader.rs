//! Module loading and caching.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};

use crate::core::descriptor::{parse_descriptor, DESCRIPTOR_FILE};
use crate::core::module::Module;
use crate::resolver::errors::EvalError;
use crate::rules::{Rule, RuleRegistry};
use crate::util::fs::read_to_string;
use crate::util::paths::{module_to_fs_path, normalize_module_path};

/// Loads each module's descriptor file exactly once per build invocation.
///
/// Re-evaluating a descriptor would duplicate Rule instances and break the
/// identity-based deduplication the evaluator relies on, so lookups always
/// return the cached Module. Insertion is first-writer-wins: the cache lock
/// is held across a load, so concurrent lookups block until the in-flight
/// load completes.
pub struct ModuleLoader {
    build_root: PathBuf,
    registry: RuleRegistry,
    cache: Mutex<HashMap<String, Arc<Module>>>,
}

impl ModuleLoader {
    pub fn new(build_root: impl Into<PathBuf>, registry: RuleRegistry) -> Self {
        ModuleLoader {
            build_root: build_root.into(),
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Whether a module path is already cached.
    pub fn is_cached(&self, module_path: &str) -> bool {
        let path = normalize_module_path(module_path);
        self.cache.lock().unwrap().contains_key(&path)
    }

    /// Load (or fetch the cached) module at an absolute module path.
    pub fn load(&self, module_path: &str) -> Result<Arc<Module>> {
        let path = normalize_module_path(module_path);

        let mut cache = self.cache.lock().unwrap();
        if let Some(module) = cache.get(&path) {
            return Ok(module.clone());
        }

        let descriptor = module_to_fs_path(&self.build_root, &path).join(DESCRIPTOR_FILE);
        if !descriptor.is_file() {
            return Err(EvalError::ModuleNotFound {
                path,
                descriptor: descriptor.display().to_string(),
            }
            .into());
        }

        let text = read_to_string(&descriptor)?;
        let decls = parse_descriptor(&text, &descriptor)?;

        let mut rules: BTreeMap<String, Arc<dyn Rule>> = BTreeMap::new();
        for decl in decls {
            let rule = self
                .registry
                .construct(&decl.kind, &path, decl.kwargs)
                .with_context(|| format!("in {}", descriptor.display()))?;

            if rules.insert(decl.name.clone(), rule).is_some() {
                bail!(
                    "in {}: duplicate rule name `{}`",
                    descriptor.display(),
                    decl.name
                );
            }
        }

        let module = Arc::new(Module::new(path.clone(), descriptor, rules));
        cache.insert(path, module.clone());
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::BuildTree;

    fn loader_for(tree: &BuildTree) -> ModuleLoader {
        ModuleLoader::new(tree.root(), RuleRegistry::with_builtin_kinds())
    }

    #[test]
    fn test_load_caches_module_identity() {
        let tree = BuildTree::new();
        tree.module(
            "/lib",
            r#"
            [[library]]
            name = "common"
            sources = ["common.c"]
            static = true
            "#,
        );

        let loader = loader_for(&tree);
        let first = loader.load("/lib").unwrap();
        let second = loader.load("/lib").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.is_cached("/lib"));

        // Rule identity is stable across lookups.
        let a = first.rule("common").unwrap();
        let b = second.rule("common").unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_load_normalizes_path() {
        let tree = BuildTree::new();
        tree.module("/lib", "[[library]]\nname = \"x\"\n");

        let loader = loader_for(&tree);
        let a = loader.load("/lib").unwrap();
        let b = loader.load("lib/").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_missing_module_leaves_cache_unchanged() {
        let tree = BuildTree::new();
        let loader = loader_for(&tree);

        let err = loader.load("/missing").unwrap_err();
        let eval = err.downcast_ref::<EvalError>().unwrap();
        assert!(matches!(eval, EvalError::ModuleNotFound { .. }));
        assert!(!loader.is_cached("/missing"));
    }

    #[test]
    fn test_duplicate_rule_name_is_an_error() {
        let tree = BuildTree::new();
        tree.module(
            "/lib",
            r#"
            [[library]]
            name = "x"

            [[binary]]
            name = "x"
            "#,
        );

        let err = loader_for(&tree).load("/lib").unwrap_err();
        assert!(err.to_string().contains("duplicate rule name"));
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let tree = BuildTree::new();
        tree.module("/lib", "[[rust_library]]\nname = \"x\"\n");

        let err = loader_for(&tree).load("/lib").unwrap_err();
        assert!(format!("{:#}", err).contains("unknown rule kind"));
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let tree = BuildTree::new();
        tree.module("/lib", "[[library]]\nname = \"x\"\nsource = [\"a.c\"]\n");

        let err = loader_for(&tree).load("/lib").unwrap_err();
        assert!(format!("{:#}", err).contains("invalid library rule"));
    }
}
