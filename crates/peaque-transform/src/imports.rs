//! Import-specifier rewriting.
//!
//! Every static `import ... from "X"` (and `export ... from "X"`) plus
//! every dynamic `import("X")` is redirected so the browser can fetch it
//! from the dev server: project sources become `/@src/<path>` and bare
//! package names become `/@deps/<name>`. Already-resolved specifiers pass
//! through, which makes the rewrite idempotent.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

use peaque_fs::normalize_path;

/// `tsconfig`-style path aliases, e.g. `@/*` → `src/*`.
#[derive(Debug, Default, Clone)]
pub struct AliasMap {
    /// `(prefix, target)` pairs with the trailing `*` stripped.
    wildcard: Vec<(String, String)>,
    exact: FxHashMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one alias. Patterns ending in `*` match prefixes; the
    /// first target of a `tsconfig` array is the one that counts.
    pub fn insert(&mut self, pattern: &str, target: &str) {
        let target = target.trim_start_matches("./").to_string();
        match pattern.strip_suffix('*') {
            Some(prefix) => {
                self.wildcard.push((prefix.to_string(), target.trim_end_matches('*').to_string()));
            }
            None => {
                self.exact.insert(pattern.to_string(), target);
            }
        }
    }

    fn resolve(&self, specifier: &str) -> Option<String> {
        if let Some(target) = self.exact.get(specifier) {
            return Some(target.clone());
        }
        self.wildcard
            .iter()
            .find(|(prefix, _)| specifier.starts_with(prefix.as_str()))
            .map(|(prefix, target)| format!("{target}{}", &specifier[prefix.len()..]))
    }
}

const SOURCE_EXTENSIONS: [&str; 4] = [".ts", ".tsx", ".js", ".jsx"];

fn from_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `import d from "x"`, `import {a} from "x"`, `export ... from "x"`.
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^(?P<head>\s*(?:import|export)\b[^'"\n]*?\bfrom\s*)(?P<quote>['"])(?P<spec>[^'"\n]+)['"]"#,
        )
        .expect("from-import pattern is valid")
    })
}

fn side_effect_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `import "x"` with no binding list.
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^(?P<head>\s*import\s*)(?P<quote>['"])(?P<spec>[^'"\n]+)['"]"#)
            .expect("side-effect import pattern is valid")
    })
}

fn dynamic_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bimport\(\s*(?P<quote>['"])(?P<spec>[^'"\n]+)['"]\s*\)"#)
            .expect("dynamic import pattern is valid")
    })
}

/// Rewrite one specifier.
///
/// `module_path` is the importing file's project-relative path; relative
/// specifiers resolve against its directory. Applying the rules to an
/// already-rewritten specifier is the identity.
pub fn rewrite_specifier(specifier: &str, module_path: &str, aliases: &AliasMap) -> String {
    if specifier.starts_with("/@deps/") || specifier.starts_with("/@src/") {
        return specifier.to_string();
    }
    if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = Path::new(module_path).parent().unwrap_or_else(|| Path::new(""));
        let resolved = normalize_path(&dir.join(specifier));
        return format!("/@src/{}", strip_extension(&resolved));
    }
    if let Some(target) = aliases.resolve(specifier) {
        return format!("/@src/{}", strip_extension(target.trim_start_matches('/')));
    }
    if let Some(project_path) = specifier.strip_prefix('/') {
        return format!("/@src/{}", strip_extension(project_path));
    }
    format!("/@deps/{specifier}")
}

/// Rewrite all import specifiers in `source`.
pub fn rewrite_imports(source: &str, module_path: &str, aliases: &AliasMap) -> String {
    let pass1 = from_import_re().replace_all(source, |caps: &Captures| {
        let rewritten = rewrite_specifier(&caps["spec"], module_path, aliases);
        format!("{}{q}{rewritten}{q}", &caps["head"], q = &caps["quote"])
    });
    let pass2 = side_effect_import_re().replace_all(&pass1, |caps: &Captures| {
        let rewritten = rewrite_specifier(&caps["spec"], module_path, aliases);
        format!("{}{q}{rewritten}{q}", &caps["head"], q = &caps["quote"])
    });
    dynamic_import_re()
        .replace_all(&pass2, |caps: &Captures| {
            let rewritten = rewrite_specifier(&caps["spec"], module_path, aliases);
            format!("import({q}{rewritten}{q})", q = &caps["quote"])
        })
        .into_owned()
}

fn strip_extension(path: &str) -> String {
    for ext in SOURCE_EXTENSIONS {
        if let Some(stem) = path.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    path.to_string()
}
