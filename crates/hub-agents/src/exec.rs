//! Executable resolution for CLI backends: explicit env override, then
//! PATH, then a fixed fallback list.

use std::path::Path;

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    true
}

fn find_in_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable_file(&dir.join(name)))
}

/// Resolve `default_exec` honoring env overrides and PATH.
pub fn resolve_exec(default_exec: &str, env_keys: &[&str]) -> String {
    resolve_exec_with_fallback(default_exec, &[], env_keys)
}

/// Like [`resolve_exec`] but tries a fixed fallback path list before
/// giving up and returning the default name.
pub fn resolve_exec_with_fallback(
    default_exec: &str,
    fallback_paths: &[&str],
    env_keys: &[&str],
) -> String {
    for key in env_keys {
        if let Ok(value) = std::env::var(key) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    if find_in_path(default_exec) {
        return default_exec.to_string();
    }
    for path in fallback_paths {
        if path.is_empty() {
            continue;
        }
        if is_executable_file(Path::new(path)) {
            return path.to_string();
        }
    }
    default_exec.to_string()
}
