//! Target addressing - WHICH buildable unit (module path + rule name).
//!
//! A target string names one rule (`/app:server`), a module's default rule
//! (`/app`), or every rule in a module (`/app:all`). Paths may be given
//! relative to an invoking module and are re-rooted during resolution;
//! after resolution the module path is always absolute.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::util::paths::{join_module_path, normalize_module_path};

/// The wildcard rule name: every rule declared by the module.
pub const WILDCARD_RULE: &str = "all";

static RE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/?[0-9A-Za-z_]+(?:/[0-9A-Za-z_]+)*)?(?::([0-9A-Za-z_]+))?$").unwrap()
});

/// A target string that names neither a module path nor a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed target `{text}`")]
pub struct MalformedTargetError {
    pub text: String,
}

/// A parsed target address.
///
/// The module path is `None` for the bare `:rule` form until the address is
/// resolved against a base path; the rule name is `None` when the target
/// names a module's default rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetAddress {
    module_path: Option<String>,
    rule_name: Option<String>,
}

impl TargetAddress {
    /// Parse a target string of the form `[/]path[/path...][:ruleName]`.
    pub fn parse(text: &str) -> Result<TargetAddress, MalformedTargetError> {
        let caps = RE_TARGET.captures(text).ok_or_else(|| MalformedTargetError {
            text: text.to_string(),
        })?;

        let module_path = caps.get(1).map(|m| m.as_str().to_string());
        let rule_name = caps.get(2).map(|m| m.as_str().to_string());

        if module_path.is_none() && rule_name.is_none() {
            return Err(MalformedTargetError {
                text: text.to_string(),
            });
        }

        Ok(TargetAddress {
            module_path,
            rule_name,
        })
    }

    /// The module path, if set.
    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    /// The rule name, if set.
    pub fn rule_name(&self) -> Option<&str> {
        self.rule_name.as_deref()
    }

    /// Whether this address names every rule in the module.
    pub fn is_wildcard(&self) -> bool {
        self.rule_name.as_deref() == Some(WILDCARD_RULE)
    }

    /// Resolve this address against an absolute base module path.
    ///
    /// A missing path inherits the base; a relative path is joined onto it;
    /// an absolute path is kept. The result always has an absolute,
    /// canonical module path.
    pub fn resolve_relative_to(&self, base: &str) -> TargetAddress {
        let path = match self.module_path.as_deref() {
            None => normalize_module_path(base),
            Some(p) if p.starts_with('/') => normalize_module_path(p),
            Some(p) => join_module_path(base, p),
        };

        TargetAddress {
            module_path: Some(path),
            rule_name: self.rule_name.clone(),
        }
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref path) = self.module_path {
            write!(f, "{}", path)?;
        }
        if let Some(ref rule) = self.rule_name {
            write!(f, ":{}", rule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        let addr = TargetAddress::parse("/app/net:server").unwrap();
        assert_eq!(addr.module_path(), Some("/app/net"));
        assert_eq!(addr.rule_name(), Some("server"));
    }

    #[test]
    fn test_parse_bare_path() {
        let addr = TargetAddress::parse("/app").unwrap();
        assert_eq!(addr.module_path(), Some("/app"));
        assert_eq!(addr.rule_name(), None);
    }

    #[test]
    fn test_parse_relative_path() {
        let addr = TargetAddress::parse("lib/net").unwrap();
        assert_eq!(addr.module_path(), Some("lib/net"));
    }

    #[test]
    fn test_parse_bare_rule() {
        let addr = TargetAddress::parse(":common").unwrap();
        assert_eq!(addr.module_path(), None);
        assert_eq!(addr.rule_name(), Some("common"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a//b", "/app:", ":", "a b", "/app:x:y", "a:b:c"] {
            assert!(TargetAddress::parse(bad).is_err(), "accepted `{}`", bad);
        }
    }

    #[test]
    fn test_wildcard() {
        let addr = TargetAddress::parse("/app:all").unwrap();
        assert!(addr.is_wildcard());
        assert!(!TargetAddress::parse("/app:allx").unwrap().is_wildcard());
    }

    #[test]
    fn test_resolve_inherits_base() {
        let addr = TargetAddress::parse(":common").unwrap();
        let resolved = addr.resolve_relative_to("/lib");
        assert_eq!(resolved.module_path(), Some("/lib"));
        assert_eq!(resolved.rule_name(), Some("common"));
    }

    #[test]
    fn test_resolve_joins_relative() {
        let addr = TargetAddress::parse("net:io").unwrap();
        let resolved = addr.resolve_relative_to("/lib");
        assert_eq!(resolved.module_path(), Some("/lib/net"));
    }

    #[test]
    fn test_resolve_keeps_absolute() {
        let addr = TargetAddress::parse("/third_party:zlib").unwrap();
        let resolved = addr.resolve_relative_to("/app");
        assert_eq!(resolved.module_path(), Some("/third_party"));
    }

    #[test]
    fn test_roundtrip_canonicalization() {
        // Re-serializing a parsed (or resolved) address re-parses to an
        // equal address.
        for text in ["/app:server", "/app", ":x", "lib/net:io", "/a/b/c:all"] {
            let addr = TargetAddress::parse(text).unwrap();
            let reparsed = TargetAddress::parse(&addr.to_string()).unwrap();
            assert_eq!(addr, reparsed);

            let resolved = addr.resolve_relative_to("/base");
            let re_resolved = TargetAddress::parse(&resolved.to_string())
                .unwrap()
                .resolve_relative_to("/base");
            assert_eq!(resolved, re_resolved);
        }
    }
}
