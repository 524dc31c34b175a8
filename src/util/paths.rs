//! Module-path and file-name helpers.
//!
//! Module paths are virtual, slash-separated, and rooted at the build root
//! (`/app/net`). They are not OS paths; `module_to_fs_path` maps them onto
//! the filesystem.

use std::path::{Path, PathBuf};

/// Replace (or append) a file extension on a relative source path.
///
/// `sub/main.c` -> `sub/main.o`; a file with no extension gets one appended.
pub fn replace_ext(file: &str, ext: &str) -> String {
    match file.rfind('.') {
        Some(dot) if !file[dot + 1..].contains('/') => format!("{}.{}", &file[..dot], ext),
        _ => format!("{}.{}", file, ext),
    }
}

/// Canonicalize a module path: leading slash, single separators,
/// `.` segments dropped, `..` segments resolved.
pub fn normalize_module_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Join a module path onto an absolute base and canonicalize the result.
pub fn join_module_path(base: &str, rel: &str) -> String {
    normalize_module_path(&format!("{}/{}", base, rel))
}

/// The final path segment of a module path (the module's default rule name).
///
/// The root module has no base name.
pub fn module_basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Map a module path onto the filesystem under the build root.
pub fn module_to_fs_path(root: &Path, module_path: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in module_path.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    out
}

/// Display a path relative to a base directory when possible.
///
/// Keeps command echoes short; falls back to the absolute path when the
/// two share no prefix.
pub fn display_relative(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_ext() {
        assert_eq!(replace_ext("main.c", "o"), "main.o");
        assert_eq!(replace_ext("sub/dir/main.c", "o"), "sub/dir/main.o");
        assert_eq!(replace_ext("noext", "o"), "noext.o");
        assert_eq!(replace_ext("odd.dir/noext", "o"), "odd.dir/noext.o");
    }

    #[test]
    fn test_normalize_module_path() {
        assert_eq!(normalize_module_path("app"), "/app");
        assert_eq!(normalize_module_path("/app/net"), "/app/net");
        assert_eq!(normalize_module_path("//app//net/"), "/app/net");
        assert_eq!(normalize_module_path("/app/./net"), "/app/net");
        assert_eq!(normalize_module_path("/app/../lib"), "/lib");
        assert_eq!(normalize_module_path(""), "/");
        assert_eq!(normalize_module_path("/"), "/");
    }

    #[test]
    fn test_join_module_path() {
        assert_eq!(join_module_path("/app", "net"), "/app/net");
        assert_eq!(join_module_path("/", "lib"), "/lib");
        assert_eq!(join_module_path("/app", "../lib"), "/lib");
    }

    #[test]
    fn test_module_basename() {
        assert_eq!(module_basename("/app/net"), "net");
        assert_eq!(module_basename("/app"), "app");
        assert_eq!(module_basename("/"), "");
    }

    #[test]
    fn test_module_to_fs_path() {
        let root = Path::new("/build/root");
        assert_eq!(
            module_to_fs_path(root, "/app/net"),
            PathBuf::from("/build/root/app/net")
        );
        assert_eq!(module_to_fs_path(root, "/"), PathBuf::from("/build/root"));
    }
}
