//! Public-asset reference rewriting.
//!
//! After bundling, any literal absolute path in the JS or CSS that names
//! a file present under `src/public/` is prefixed with the build's asset
//! prefix. CSS `url()` is rewritten in quoted and unquoted forms.

use std::collections::BTreeSet;
use std::path::Path;

use peaque_fs::FileSystem;

use crate::BuildResult;

/// The set of public paths, each with a leading slash
/// (`/logo.svg`, `/fonts/mono.woff2`).
pub fn collect_public_paths(
    fs: &dyn FileSystem,
    public_dir: &Path,
) -> BuildResult<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for file in peaque_fs::walk_files(fs, public_dir)? {
        let full = peaque_fs::normalize_path(&file);
        let base = peaque_fs::normalize_path(public_dir);
        if let Some(rel) = full.strip_prefix(&base) {
            out.insert(rel.to_string());
        }
    }
    Ok(out)
}

/// Rewrite public-asset references in bundled JS or CSS.
///
/// Longer paths are rewritten first so `/logo.svg` never clobbers
/// `/logo.svg.map`.
pub fn rewrite_asset_references(
    source: &str,
    public_paths: &BTreeSet<String>,
    asset_prefix: &str,
) -> String {
    let mut ordered: Vec<&String> = public_paths.iter().collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.len()));

    let mut out = source.to_string();
    for path in ordered {
        let prefixed = format!("{asset_prefix}{path}");
        // JS string literals in either quote style.
        out = out.replace(&format!("\"{path}\""), &format!("\"{prefixed}\""));
        out = out.replace(&format!("'{path}'"), &format!("'{prefixed}'"));
        // CSS url(): unquoted, double- and single-quoted.
        out = out.replace(&format!("url({path})"), &format!("url({prefixed})"));
        out = out.replace(&format!("url(\"{path}\")"), &format!("url(\"{prefixed}\")"));
        out = out.replace(&format!("url('{path}')"), &format!("url('{prefixed}')"));
    }
    out
}
