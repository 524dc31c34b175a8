//! Descriptor file parsing and schema.
//!
//! Each module directory carries a `Slipway.toml` describing its rules as
//! plain data. Every top-level key is a rule kind and maps to an array of
//! tables, one per rule:
//!
//! ```toml
//! [[library]]
//! name = "common"
//! sources = ["common.c", "util.c"]
//! static = true
//!
//! [[binary]]
//! name = "server"
//! sources = ["server.c"]
//! deps = [":common"]
//! ```
//!
//! The parser is kind-agnostic: it only checks the declaration shape and
//! hands each `(kind, name, kwargs)` triple to the rule registry. Errors
//! here are authoring errors and abort the whole invocation.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// File name of a module's build descriptor.
pub const DESCRIPTOR_FILE: &str = "Slipway.toml";

/// One rule declaration from a descriptor file.
#[derive(Debug, Clone)]
pub struct RuleDecl {
    /// Rule kind identifier (`library`, `binary`, ...).
    pub kind: String,
    /// Declared rule name.
    pub name: String,
    /// The full declaration table, including `name`, for the constructor.
    pub kwargs: toml::Value,
}

/// Parse descriptor text into rule declarations.
///
/// `path` is only used for error messages.
pub fn parse_descriptor(text: &str, path: &Path) -> Result<Vec<RuleDecl>> {
    let table: toml::Table = text
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut decls = Vec::new();

    for (kind, value) in table {
        let entries = match value {
            toml::Value::Array(entries) => entries,
            _ => bail!(
                "in {}: `{}` must be an array of tables (use `[[{}]]`)",
                path.display(),
                kind,
                kind
            ),
        };

        for entry in entries {
            let decl_table = match &entry {
                toml::Value::Table(t) => t,
                _ => bail!("in {}: `[[{}]]` entries must be tables", path.display(), kind),
            };

            let name = match decl_table.get("name").and_then(|v| v.as_str()) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => bail!(
                    "in {}: every `[[{}]]` entry needs a non-empty `name`",
                    path.display(),
                    kind
                ),
            };

            decls.push(RuleDecl {
                kind: kind.clone(),
                name,
                kwargs: entry,
            });
        }
    }

    Ok(decls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(text: &str) -> Result<Vec<RuleDecl>> {
        parse_descriptor(text, &PathBuf::from("/test/Slipway.toml"))
    }

    #[test]
    fn test_parse_two_kinds() {
        let decls = parse(
            r#"
            [[library]]
            name = "common"
            sources = ["common.c"]
            static = true

            [[binary]]
            name = "server"
            sources = ["server.c"]
            deps = [":common"]
            "#,
        )
        .unwrap();

        assert_eq!(decls.len(), 2);
        let kinds: Vec<_> = decls.iter().map(|d| d.kind.as_str()).collect();
        assert!(kinds.contains(&"library"));
        assert!(kinds.contains(&"binary"));

        let lib = decls.iter().find(|d| d.kind == "library").unwrap();
        assert_eq!(lib.name, "common");
    }

    #[test]
    fn test_parse_multiple_of_one_kind() {
        let decls = parse(
            r#"
            [[library]]
            name = "a"

            [[library]]
            name = "b"
            "#,
        )
        .unwrap();
        assert_eq!(decls.len(), 2);
    }

    #[test]
    fn test_missing_name_is_an_error() {
        let err = parse("[[library]]\nsources = [\"a.c\"]\n").unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_non_array_kind_is_an_error() {
        let err = parse("[library]\nname = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("array of tables"));
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(parse("not toml [[").is_err());
    }
}
