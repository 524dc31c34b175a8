//! Module - one descriptor file's worth of declared rules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::rules::Rule;

/// The rules declared by one descriptor file, keyed by rule name.
///
/// A Module is created at most once per distinct module path for the
/// lifetime of one build invocation; the loader hands out the cached
/// instance so rule identity is stable across resolution paths.
pub struct Module {
    path: String,
    descriptor: PathBuf,
    rules: BTreeMap<String, Arc<dyn Rule>>,
}

impl Module {
    /// Create a module from its loaded rules.
    pub fn new(
        path: impl Into<String>,
        descriptor: impl Into<PathBuf>,
        rules: BTreeMap<String, Arc<dyn Rule>>,
    ) -> Self {
        Module {
            path: path.into(),
            descriptor: descriptor.into(),
            rules,
        }
    }

    /// The absolute module path (rooted at the build root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The on-disk descriptor file this module was loaded from.
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(name)
    }

    /// All rule names, in deterministic order.
    pub fn rule_names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    /// All rules, in deterministic order.
    pub fn rules(&self) -> &BTreeMap<String, Arc<dyn Rule>> {
        &self.rules
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("rules", &self.rule_names())
            .finish()
    }
}
