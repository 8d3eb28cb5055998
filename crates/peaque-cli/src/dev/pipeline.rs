//! On-demand module transformation.
//!
//! `/@src/` modules run transpile → import rewrite → fast-refresh wrap;
//! `'use server'` files short-circuit into a generated client stub.
//! `/@deps/` modules are bundled out of `node_modules` once per package
//! version. Both families persist through the transform cache keyed by
//! content hash.

use std::path::Path;

use tracing::warn;

use peaque_transform::{
    content_hash, error_module, generate_server_shim, is_server_module, rewrite_imports,
    wrap_with_fast_refresh, TransformError,
};

use crate::dev::state::DevState;
use crate::error::Result;

/// Transform and cache one project source module for the browser.
///
/// `rel_path` is project-relative. Source-kind failures produce a module
/// that throws the diagnostic so the failure surfaces in the browser.
pub async fn serve_source(state: &DevState, rel_path: &str, source: &str) -> Result<Vec<u8>> {
    let hash = content_hash(source.as_bytes());
    let produced = state
        .cache
        .get_or_produce(rel_path, &hash, || async {
            transform_module(state, rel_path, source).map(String::into_bytes)
        })
        .await;
    match produced {
        Ok(bytes) => Ok(bytes),
        Err(TransformError::Source(message)) => {
            warn!(module = rel_path, %message, "transform failed");
            Ok(error_module(&message).into_bytes())
        }
        Err(err) => Err(err.into()),
    }
}

fn transform_module(
    state: &DevState,
    rel_path: &str,
    source: &str,
) -> std::result::Result<String, TransformError> {
    if is_server_module(source) {
        return Ok(generate_server_shim(source, rel_path)?.shim_source);
    }
    let transpiled = state
        .bundler
        .transpile(rel_path, source)
        .map_err(|e| TransformError::Source(e.to_string()))?;
    let rewritten = rewrite_imports(&transpiled, rel_path, &state.aliases);
    if rel_path.ends_with(".tsx") || rel_path.ends_with(".jsx") {
        let key = rel_path
            .trim_end_matches(".tsx")
            .trim_end_matches(".jsx");
        Ok(wrap_with_fast_refresh(&rewritten, key))
    } else {
        Ok(rewritten)
    }
}

/// Bundle one `/@deps/<name>` module, cached per package version.
pub async fn serve_dependency(state: &DevState, name: &str) -> Result<Vec<u8>> {
    let version = dependency_version(state, name).unwrap_or_else(|| "unknown".to_string());
    let composed = format!("{name}@{version}");
    let hash = content_hash(composed.as_bytes());
    let key = format!("deps:{name}");
    let bundler = &state.bundler;
    let root = state.project_root.clone();
    let bytes = state
        .cache
        .get_or_produce(&key, &hash, || async {
            bundler
                .bundle_dependency(name, &root)
                .map_err(|e| TransformError::Source(e.to_string()))
        })
        .await?;
    Ok(bytes)
}

fn dependency_version(state: &DevState, name: &str) -> Option<String> {
    let manifest = state
        .project_root
        .join("node_modules")
        .join(name)
        .join("package.json");
    let text = state.fs.read_to_string(&manifest).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&text).ok()?;
    parsed.get("version")?.as_str().map(String::from)
}

/// Read and transform a file by project-relative path (watch-free entry
/// used by the server).
pub async fn serve_project_file(state: &DevState, abs_path: &Path) -> Result<Vec<u8>> {
    let source = state.fs.read_to_string(abs_path)?;
    let rel = state.project_relative(abs_path);
    serve_source(state, &rel, &source).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MemoryRuntime;
    use peaque_build::MemoryBundler;
    use peaque_fs::{FileSystem, MemoryFileSystem};
    use peaque_transform::{AliasMap, TransformCache};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn state_with(files: &[(&str, &str)]) -> DevState {
        let fs = Arc::new(MemoryFileSystem::with_files(
            files.iter().map(|(p, c)| (p.to_string(), c.to_string())),
        ));
        let cache = TransformCache::load(fs.clone(), "/app/.peaque-cache");
        DevState::new(
            fs,
            Arc::new(MemoryBundler::new().with_dependency("react", b"export default {};")),
            Arc::new(MemoryRuntime::new()),
            PathBuf::from("/app"),
            AliasMap::new(),
            cache,
        )
    }

    #[tokio::test]
    async fn component_gets_rewrite_and_refresh_wrapper() {
        let state = state_with(&[]);
        let source = "import React from \"react\";\nexport default () => null;\n";
        let out = serve_source(&state, "src/pages/home/page.tsx", source).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("/@deps/react"));
        assert!(text.starts_with("// @peaque-refresh src/pages/home/page\n"));
    }

    #[tokio::test]
    async fn plain_ts_module_is_only_rewritten() {
        let state = state_with(&[]);
        let out = serve_source(&state, "src/lib/api.ts", "import x from './x';\n").await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("/@src/src/lib/x"));
        assert!(!text.contains("@peaque-refresh"));
    }

    #[tokio::test]
    async fn use_server_module_becomes_a_stub() {
        let state = state_with(&[]);
        let source = "'use server'\nexport async function updateUser(u) { return u; }\n";
        let out = serve_source(&state, "src/actions/users.ts", source).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("__rpcCall"));
        assert!(!text.contains("return u;"));
    }

    #[tokio::test]
    async fn bad_server_module_throws_in_the_browser() {
        let state = state_with(&[]);
        let source = "'use server'\nexport function updateUser(u) {}\n";
        let out = serve_source(&state, "src/actions/users.ts", source).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("throw new Error("));
        assert!(text.contains("updateUser is not async"));
    }

    #[tokio::test]
    async fn transform_output_is_cached_by_content() {
        let state = state_with(&[]);
        let source = "export const x = 1;\n";
        let first = serve_source(&state, "src/a.ts", source).await.unwrap();
        let second = serve_source(&state, "src/a.ts", source).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(state.cache.len(), 1);
    }

    #[tokio::test]
    async fn dependency_bundles_are_cached_per_version() {
        let state = state_with(&[(
            "/app/node_modules/react/package.json",
            r#"{ "name": "react", "version": "19.0.0" }"#,
        )]);
        let out = serve_dependency(&state, "react").await.unwrap();
        assert_eq!(out, b"export default {};");
        assert_eq!(state.cache.len(), 1);

        // Cached: the bundler double would return the same, but the point
        // is the cache hit keyed on name@version.
        let again = serve_dependency(&state, "react").await.unwrap();
        assert_eq!(again, out);
    }

    #[tokio::test]
    async fn unknown_dependency_is_an_error() {
        let state = state_with(&[]);
        assert!(serve_dependency(&state, "left-pad").await.is_err());
    }

    #[tokio::test]
    async fn serve_project_file_reads_from_disk() {
        let state = state_with(&[("/app/src/lib/a.ts", "export const a = 1;\n")]);
        state.fs.write(std::path::Path::new("/app/src/lib/a.ts"), b"export const a = 2;\n").unwrap();
        let out = serve_project_file(&state, Path::new("/app/src/lib/a.ts")).await.unwrap();
        assert!(String::from_utf8(out).unwrap().contains("a = 2"));
    }
}
