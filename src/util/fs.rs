//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read file: {}", path.display()))
}

/// Expand a rule's source entries against its module directory.
///
/// Entries containing glob metacharacters are expanded (and sorted for
/// deterministic command ordering); plain file names are used as-is, so a
/// descriptor can name a file that a generator will produce.
///
/// Returns module-relative source paths.
pub fn expand_sources(module_dir: &Path, entries: &[String]) -> Result<Vec<String>> {
    let mut results = Vec::new();

    for entry in entries {
        if !entry.contains(['*', '?', '[']) {
            results.push(entry.clone());
            continue;
        }

        let full_pattern = module_dir.join(entry);
        let pattern_str = full_pattern.to_string_lossy();

        let mut matched = Vec::new();
        for found in
            glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", entry))?
        {
            match found {
                Ok(path) => {
                    if path.is_file() {
                        if let Ok(rel) = path.strip_prefix(module_dir) {
                            matched.push(rel.to_string_lossy().into_owned());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                }
            }
        }

        matched.sort();
        results.extend(matched);
    }

    Ok(results)
}

/// Find all descriptor files below a root, returning their directories.
pub fn find_descriptor_dirs(root: &Path, descriptor_name: &str) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == descriptor_name)
        .filter_map(|e| e.path().parent().map(|p| p.to_path_buf()))
        .collect();

    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_sources_literal() {
        let tmp = TempDir::new().unwrap();
        // Literal entries pass through even when the file does not exist.
        let sources = expand_sources(
            tmp.path(),
            &["main.c".to_string(), "gen/parser.c".to_string()],
        )
        .unwrap();
        assert_eq!(sources, vec!["main.c", "gen/parser.c"]);
    }

    #[test]
    fn test_expand_sources_glob() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.c"), "").unwrap();
        fs::write(tmp.path().join("a.c"), "").unwrap();
        fs::write(tmp.path().join("a.h"), "").unwrap();

        let sources = expand_sources(tmp.path(), &["*.c".to_string()]).unwrap();
        assert_eq!(sources, vec!["a.c", "b.c"]);
    }

    #[test]
    fn test_find_descriptor_dirs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("app")).unwrap();
        fs::create_dir_all(tmp.path().join("lib/net")).unwrap();
        fs::write(tmp.path().join("app/Slipway.toml"), "").unwrap();
        fs::write(tmp.path().join("lib/net/Slipway.toml"), "").unwrap();

        let dirs = find_descriptor_dirs(tmp.path(), "Slipway.toml");
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("app"));
        assert!(dirs[1].ends_with("lib/net"));
    }
}
