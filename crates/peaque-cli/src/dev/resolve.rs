//! `/@src/` path resolution.
//!
//! A module URL resolves to the first existing candidate: the path
//! itself, then with each recognized extension, then as a directory
//! index. Every candidate must stay under the project root after
//! normalization; an escaping candidate is a policy violation, not a
//! miss.

use std::path::{Path, PathBuf};

use peaque_fs::{join_normalized, FileSystem};

/// Outcome of resolving one `/@src/<path>` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Project-relative path of the file to serve.
    Found(PathBuf),
    /// No candidate names a regular file.
    NotFound,
    /// A candidate escaped the project root.
    Forbidden,
}

const CANDIDATE_SUFFIXES: [&str; 9] = [
    "",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/index.jsx",
];

/// Resolve `request_path` (the part after `/@src/`) against the project.
pub fn resolve_source(fs: &dyn FileSystem, project_root: &Path, request_path: &str) -> Resolution {
    let root = peaque_fs::normalize_path(project_root);
    let root_prefix = if root.is_empty() { String::new() } else { format!("{root}/") };

    for suffix in CANDIDATE_SUFFIXES {
        let candidate = join_normalized(project_root, &format!("{request_path}{suffix}"));
        let normalized = peaque_fs::normalize_path(&candidate);
        if normalized != root && !normalized.starts_with(&root_prefix) {
            return Resolution::Forbidden;
        }
        if fs.is_file(&candidate) {
            return Resolution::Found(candidate);
        }
    }
    Resolution::NotFound
}
