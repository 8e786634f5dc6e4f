//! Import name and identifier conventions
//!
//! Lua modules live in a flat namespace rooted at the entry file's directory:
//! `require("lib.strings")` loads `<base>/lib/strings.lua`. The bundle refers
//! to each module through a generated wrapper function whose name is derived
//! from the import name.

use std::path::{Component, Path, PathBuf};

use cow_utils::CowUtils;

/// Default extension of Lua source files
pub const DEFAULT_EXTENSION: &str = "lua";

/// Lexically normalize a path
///
/// Drops `.` components and folds `..` into the preceding component. Unlike
/// `canonicalize` this works for files that do not exist, which is exactly
/// the case for modules that only live on the remote process.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Map a dotted import name to its file below `base_dir`
///
/// Every `.` becomes a path separator and `extension` is appended, so both
/// `lib.strings` and `lib/strings` land on `<base>/lib/strings.lua`. Empty
/// segments are dropped, which makes `./util` resolve to `<base>/util.lua`.
pub fn resolve_import(base_dir: &Path, import_name: &str, extension: &str) -> PathBuf {
    let relative = import_name.cow_replace(".", "/");
    let file_name = format!("{relative}.{extension}");

    let mut resolved = base_dir.to_path_buf();
    for segment in file_name.split('/').filter(|segment| !segment.is_empty()) {
        resolved.push(segment);
    }
    normalize_path(&resolved)
}

/// Turn an import name into a Lua identifier fragment
///
/// Characters outside `[A-Za-z0-9_]` become `_`, then a single leading `_`
/// is stripped. Distinct names may collide (`a.b` and `a_b`); the bundler
/// reports such collisions but does not rename.
pub fn sanitize_identifier(import_name: &str) -> String {
    let sanitized: String = import_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match sanitized.strip_prefix('_') {
        Some(rest) => rest.to_owned(),
        None => sanitized,
    }
}

/// Name used for the entry module, which is never required by name
pub fn entry_module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("./a/b/../c.lua")),
            PathBuf::from("a/c.lua")
        );
        assert_eq!(
            normalize_path(Path::new("../shared/x.lua")),
            PathBuf::from("../shared/x.lua")
        );
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("")), PathBuf::new());
    }

    #[test]
    fn test_resolve_dotted_import() {
        let base = Path::new("/project");
        assert_eq!(
            resolve_import(base, "lib.strings", "lua"),
            PathBuf::from("/project/lib/strings.lua")
        );
        assert_eq!(
            resolve_import(base, "util", "lua"),
            PathBuf::from("/project/util.lua")
        );
    }

    #[test]
    fn test_resolve_aliases_land_on_same_path() {
        let base = Path::new("/project");
        let dotted = resolve_import(base, "lib.strings", "lua");
        assert_eq!(resolve_import(base, "lib/strings", "lua"), dotted);
        assert_eq!(
            resolve_import(base, "./util", "lua"),
            resolve_import(base, "util", "lua")
        );
    }

    #[test]
    fn test_resolve_relative_base() {
        assert_eq!(
            resolve_import(Path::new(""), "util", "lua"),
            PathBuf::from("util.lua")
        );
        assert_eq!(
            resolve_import(Path::new("./src"), "a.b", "luau"),
            PathBuf::from("src/a/b.luau")
        );
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("util"), "util");
        assert_eq!(sanitize_identifier("lib.strings"), "lib_strings");
        assert_eq!(sanitize_identifier("my-mod"), "my_mod");
        assert_eq!(sanitize_identifier(".hidden"), "hidden");
        assert_eq!(sanitize_identifier("./util"), "_util");
        assert_eq!(sanitize_identifier("a b@c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_identifier_collision_is_not_fixed() {
        assert_eq!(sanitize_identifier("a.b"), sanitize_identifier("a_b"));
    }

    #[test]
    fn test_entry_module_name() {
        assert_eq!(entry_module_name(Path::new("/p/main.lua")), "main");
        assert_eq!(entry_module_name(Path::new("process")), "process");
    }
}
