//! Test-only environment variables.
//!
//! Values already present in the process environment always win over `.env.test`,
//! so secrets injected by CI are never shadowed by a checked-in file.

use std::path::{Path, PathBuf};

pub const TEST_ENV_FILE: &str = ".env.test";

/// Loads `<project_root>/.env.test` if it exists, without overwriting variables that
/// are already set. Returns the file that was loaded.
pub fn setup_test_env(project_root: &Path) -> Option<PathBuf> {
    let path = project_root.join(TEST_ENV_FILE);
    match dotenvy::from_path(&path) {
        Ok(()) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Ignoring unreadable test env file.");
            None
        }
    }
}

/// The names in `required` that are unset or empty.
pub fn missing_vars<'a>(required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|name| std::env::var(name).map_or(true, |value| value.is_empty()))
        .collect()
}

/// Loads `.env.test` from the caller's project root.
#[macro_export]
macro_rules! setup_test_env {
    () => {
        $crate::env::setup_test_env(&$crate::paths::project_root(&$crate::caller_dir!()))
    };
}

/// Loads `.env.test`, then returns early from the calling test if any of the named
/// variables is still missing. The calling function must return `()`.
#[macro_export]
macro_rules! setup_test_env_or_skip {
    ($($var:expr),+ $(,)?) => {
        $crate::setup_test_env!();
        let missing = $crate::env::missing_vars(&[$($var),+]);
        if !missing.is_empty() {
            $crate::tracing::warn!(
                missing = %missing.join(", "),
                file = $crate::env::TEST_ENV_FILE,
                "Skipping test: required variables are not set."
            );
            return;
        }
    };
}
