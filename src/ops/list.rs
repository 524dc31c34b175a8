//! The list operation: sweep the tree for descriptor files and load each
//! module for display.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::descriptor::DESCRIPTOR_FILE;
use crate::resolver::loader::ModuleLoader;
use crate::rules::RuleRegistry;
use crate::util::fs::find_descriptor_dirs;
use crate::util::paths::normalize_module_path;

/// One module and its declared rules.
pub struct ModuleListing {
    pub path: String,
    pub rules: Vec<RuleListing>,
}

/// One rule, as shown by `slipway list`.
pub struct RuleListing {
    pub name: String,
    pub kind: String,
    pub deps: Vec<String>,
}

/// Load every module below the build root.
pub fn list(root: &Path) -> Result<Vec<ModuleListing>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("build root not found: {}", root.display()))?;

    let loader = ModuleLoader::new(&root, RuleRegistry::with_builtin_kinds());
    let mut listings = Vec::new();

    for dir in find_descriptor_dirs(&root, DESCRIPTOR_FILE) {
        let rel: Vec<String> = dir
            .strip_prefix(&root)
            .unwrap_or(Path::new(""))
            .iter()
            .map(|c| c.to_string_lossy().into_owned())
            .collect();
        let module_path = normalize_module_path(&format!("/{}", rel.join("/")));

        let module = loader.load(&module_path)?;
        listings.push(ModuleListing {
            path: module_path,
            rules: module
                .rules()
                .iter()
                .map(|(name, rule)| RuleListing {
                    name: name.clone(),
                    kind: rule.kind().to_string(),
                    deps: rule.declared_dependencies().to_vec(),
                })
                .collect(),
        });
    }

    Ok(listings)
}
