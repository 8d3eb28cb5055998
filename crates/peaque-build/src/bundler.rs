//! The bundler collaborator contract.
//!
//! Parsing and bundling application code is external to the core; the
//! pipeline only needs this interface. [`MemoryBundler`] is the test
//! double every offline test uses.

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::{BuildError, BuildResult};

/// Output of a frontend bundle run.
#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    /// Concatenated JS.
    pub code: Vec<u8>,
    /// Input-byte metafile for size reporting: module path → input bytes.
    pub metafile: FxHashMap<String, u64>,
    /// Project-relative paths of `'use server'` modules encountered.
    pub server_modules: Vec<String>,
}

/// External bundler backend.
pub trait Bundler: Send + Sync {
    /// Bundle a generated entry module against the project root.
    fn bundle(
        &self,
        entry_source: &str,
        project_root: &Path,
        out_dir: &Path,
    ) -> BuildResult<BundleOutput>;

    /// Bundle one third-party dependency out of `node_modules` for
    /// `/@deps/<name>`.
    fn bundle_dependency(&self, name: &str, project_root: &Path) -> BuildResult<Vec<u8>>;

    /// Produce the project stylesheet.
    fn bundle_css(&self, project_root: &Path) -> BuildResult<Vec<u8>>;

    /// Transpile a single module (TS/TSX → JS) for dev serving.
    fn transpile(&self, module_path: &str, source: &str) -> BuildResult<String>;

    /// Bundle the generated backend entry into one CommonJS file.
    fn bundle_backend(
        &self,
        entry_source: &str,
        project_root: &Path,
        out_file: &Path,
    ) -> BuildResult<Vec<u8>>;
}

/// In-memory bundler double: identity transpile, canned dependencies,
/// deterministic bundles derived from the entry source.
#[derive(Debug, Default)]
pub struct MemoryBundler {
    dependencies: FxHashMap<String, Vec<u8>>,
    css: Vec<u8>,
    server_modules: Vec<String>,
}

impl MemoryBundler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(mut self, name: &str, code: &[u8]) -> Self {
        self.dependencies.insert(name.to_string(), code.to_vec());
        self
    }

    pub fn with_css(mut self, css: &[u8]) -> Self {
        self.css = css.to_vec();
        self
    }

    pub fn with_server_modules(mut self, modules: &[&str]) -> Self {
        self.server_modules = modules.iter().map(|m| m.to_string()).collect();
        self
    }
}

impl Bundler for MemoryBundler {
    fn bundle(
        &self,
        entry_source: &str,
        _project_root: &Path,
        _out_dir: &Path,
    ) -> BuildResult<BundleOutput> {
        let mut metafile = FxHashMap::default();
        metafile.insert("entry".to_string(), entry_source.len() as u64);
        Ok(BundleOutput {
            code: format!("// bundled\n{entry_source}").into_bytes(),
            metafile,
            server_modules: self.server_modules.clone(),
        })
    }

    fn bundle_dependency(&self, name: &str, _project_root: &Path) -> BuildResult<Vec<u8>> {
        self.dependencies
            .get(name)
            .cloned()
            .ok_or_else(|| BuildError::Bundler(format!("unknown dependency `{name}`")))
    }

    fn bundle_css(&self, _project_root: &Path) -> BuildResult<Vec<u8>> {
        Ok(self.css.clone())
    }

    fn transpile(&self, _module_path: &str, source: &str) -> BuildResult<String> {
        Ok(source.to_string())
    }

    fn bundle_backend(
        &self,
        entry_source: &str,
        _project_root: &Path,
        _out_file: &Path,
    ) -> BuildResult<Vec<u8>> {
        Ok(format!("\"use strict\";\n// bundled backend\n{entry_source}").into_bytes())
    }
}
