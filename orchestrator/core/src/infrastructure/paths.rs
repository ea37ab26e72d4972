// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Data Directory Resolution
//!
//! Locates the Loom data directory used for pattern templates and agent
//! configurations.
//!
//! Priority:
//! 1. `LOOM_DATA_DIR` environment variable (if set and non-empty)
//! 2. `~/.loom` (default)
//!
//! The returned path is always absolute: tilde is expanded to the user's
//! home directory and relative paths are resolved against the current
//! working directory.

use std::env;
use std::path::PathBuf;

/// Resolve the Loom data directory.
///
/// Reads the environment directly (not the config file) because this is
/// called during bootstrap to locate the config itself.
pub fn loom_data_dir() -> PathBuf {
    match env::var("LOOM_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => expand_path(&dir),
        _ => dirs::home_dir()
            .map(|home| home.join(".loom"))
            .unwrap_or_else(|| PathBuf::from(".loom")),
    }
}

/// Resolve a subdirectory within the Loom data directory.
///
/// Example: `loom_subdir("patterns")` returns `~/.loom/patterns`.
pub fn loom_subdir(subdir: &str) -> PathBuf {
    loom_data_dir().join(subdir)
}

/// Expand `~/` and resolve relative paths to absolute.
fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
        return PathBuf::from(path);
    }

    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        env::current_dir().map(|cwd| cwd.join(&p)).unwrap_or(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_pass_through() {
        assert_eq!(expand_path("/custom/loom"), PathBuf::from("/custom/loom"));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let expanded = expand_path("relative/path");
        assert!(expanded.is_absolute());
        assert!(expanded.ends_with("relative/path"));
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/my-loom"), home.join("my-loom"));
        }
    }

    #[test]
    fn env_var_overrides_default() {
        // Sequential set/unset inside one test to avoid cross-test env races.
        env::set_var("LOOM_DATA_DIR", "/custom/loom");
        assert_eq!(loom_data_dir(), PathBuf::from("/custom/loom"));

        env::remove_var("LOOM_DATA_DIR");
        let fallback = loom_data_dir();
        assert!(fallback.ends_with(".loom"));

        assert!(loom_subdir("patterns").ends_with(".loom/patterns"));
    }
}
