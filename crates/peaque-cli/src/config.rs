//! Project configuration.
//!
//! The only configuration the core reads is the `tsconfig.json`-style
//! `compilerOptions.paths` map feeding the import rewriter. Config
//! problems are never fatal in dev: log and continue with defaults.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use peaque_fs::FileSystem;
use peaque_transform::AliasMap;

#[derive(Debug, Default, Deserialize)]
struct TsConfig {
    #[serde(rename = "compilerOptions", default)]
    compiler_options: CompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
struct CompilerOptions {
    #[serde(default)]
    paths: std::collections::BTreeMap<String, Vec<String>>,
}

/// Load import aliases from `<base>/tsconfig.json`, tolerating absence
/// and malformation.
pub fn load_aliases(fs: &dyn FileSystem, base: &Path) -> AliasMap {
    let mut aliases = AliasMap::new();
    let path = base.join("tsconfig.json");
    let text = match fs.read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            if !err.is_not_found() {
                warn!(%err, "tsconfig.json unreadable, continuing without aliases");
            }
            return aliases;
        }
    };
    let config: TsConfig = match serde_json::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "tsconfig.json malformed, continuing without aliases");
            return aliases;
        }
    };
    for (pattern, targets) in &config.compiler_options.paths {
        if let Some(target) = targets.first() {
            aliases.insert(pattern, target);
        }
    }
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;
    use peaque_fs::MemoryFileSystem;
    use peaque_transform::rewrite_imports;

    #[test]
    fn loads_paths_map() {
        let fs = MemoryFileSystem::with_files([(
            "/app/tsconfig.json",
            r#"{ "compilerOptions": { "paths": { "@/*": ["./src/*"] } } }"#,
        )]);
        let aliases = load_aliases(&fs, Path::new("/app"));
        let out = rewrite_imports("import a from \"@/lib/a\";\n", "src/x.ts", &aliases);
        assert!(out.contains("/@src/src/lib/a"));
    }

    #[test]
    fn missing_tsconfig_is_fine() {
        let fs = MemoryFileSystem::new();
        let aliases = load_aliases(&fs, Path::new("/app"));
        let out = rewrite_imports("import a from \"@/lib/a\";\n", "src/x.ts", &aliases);
        // With no alias the specifier is a bare package name.
        assert!(out.contains("/@deps/@/lib/a"));
    }

    #[test]
    fn malformed_tsconfig_logs_and_defaults() {
        let fs = MemoryFileSystem::with_files([("/app/tsconfig.json", "{ nope")]);
        let _aliases = load_aliases(&fs, Path::new("/app"));
    }
}
