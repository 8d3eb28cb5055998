//! `.env` loading.
//!
//! `.env` loads first, then (dev only) `.env.local` overrides it; the
//! process environment beats both. Missing files are fine; malformed
//! files log a warning and the process continues.

use std::path::Path;

use tracing::warn;

/// Load environment files from `base`. `include_local` is true for the
/// dev server.
pub fn load_env(base: &Path, include_local: bool) {
    // dotenvy never overrides variables that are already set, so loading
    // the override file first gives it precedence over `.env` while the
    // real environment still beats both.
    if include_local {
        load_one(&base.join(".env.local"));
    }
    load_one(&base.join(".env"));
}

fn load_one(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = dotenvy::from_path(path) {
        warn!(path = %path.display(), %err, "failed to load env file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn local_overrides_env() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "PEAQUE_TEST_LAYERED=base\n").unwrap();
        std::fs::write(dir.path().join(".env.local"), "PEAQUE_TEST_LAYERED=local\n").unwrap();
        std::env::remove_var("PEAQUE_TEST_LAYERED");

        load_env(dir.path(), true);
        assert_eq!(std::env::var("PEAQUE_TEST_LAYERED").unwrap(), "local");
        std::env::remove_var("PEAQUE_TEST_LAYERED");
    }

    #[test]
    fn process_env_beats_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "PEAQUE_TEST_PROCESS=file\n").unwrap();
        std::env::set_var("PEAQUE_TEST_PROCESS", "process");

        load_env(dir.path(), false);
        assert_eq!(std::env::var("PEAQUE_TEST_PROCESS").unwrap(), "process");
        std::env::remove_var("PEAQUE_TEST_PROCESS");
    }

    #[test]
    fn missing_files_are_fine() {
        let dir = TempDir::new().unwrap();
        load_env(dir.path(), true);
    }
}
