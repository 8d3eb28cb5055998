//! Module transformation and caching for the Peaque framework.
//!
//! Source modules are rewritten on their way to the browser: import
//! specifiers are redirected to `/@src/` and `/@deps/` URLs, components
//! get fast-refresh registration wrappers, and `'use server'` files are
//! replaced by client stubs that call the RPC endpoint. Expensive
//! transform outputs persist in a content-hash disk cache with a
//! version-gated index.

pub mod cache;
pub mod hash;
pub mod imports;
pub mod refresh;
pub mod scanner;
pub mod server_shim;
pub mod wire;

pub use cache::TransformCache;
pub use hash::{content_hash, short_hash};
pub use imports::{rewrite_imports, AliasMap};
pub use refresh::wrap_with_fast_refresh;
pub use scanner::{scan_exports, ExportKind, ModuleExport};
pub use server_shim::{generate_server_shim, is_server_module, ServerShim};
pub use wire::WireValue;

/// Errors from the transform layer.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A source-kind failure: surfaced to the browser as a module whose
    /// top level throws the diagnostic.
    #[error("{0}")]
    Source(String),

    #[error("cache io: {0}")]
    Cache(#[from] peaque_fs::FsError),

    #[error("wire format: {0}")]
    Wire(String),
}

pub type TransformResult<T> = Result<T, TransformError>;

/// Synthesize a module whose evaluation throws `message`, so transform
/// failures surface in the browser console instead of a silent 500.
pub fn error_module(message: &str) -> String {
    let escaped = message.replace('\\', "\\\\").replace('`', "\\`");
    format!("throw new Error(`{escaped}`);\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_module_escapes_backticks() {
        let module = error_module("`default` is not async");
        assert!(module.starts_with("throw new Error("));
        assert!(module.contains("\\`default\\`"));
    }
}
