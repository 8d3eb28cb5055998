//! Fast-refresh registration wrapper.
//!
//! Component modules get a preamble that installs a module-scoped
//! registration hook and a trailer that hands changed components to the
//! refresh runtime, keyed on the module's path. The first line is a
//! marker so the wrapper is idempotent.

const MARKER: &str = "// @peaque-refresh ";

/// Wrap `source` with fast-refresh registration for `module_path`.
/// Applying the wrapper to already-wrapped output returns it unchanged.
pub fn wrap_with_fast_refresh(source: &str, module_path: &str) -> String {
    if source.starts_with(MARKER) {
        return source.to_string();
    }
    let key = module_path.replace('\\', "/");
    format!(
        "{MARKER}{key}\n\
         import {{ __peaqueRefresh }} from \"/peaque-dev.js\";\n\
         const __prevRefreshReg = window.$RefreshReg$;\n\
         const __prevRefreshSig = window.$RefreshSig$;\n\
         window.$RefreshReg$ = (type, id) => __peaqueRefresh.register(type, \"{key} \" + id);\n\
         window.$RefreshSig$ = __peaqueRefresh.createSignatureFunctionForTransform;\n\
         {source}\n\
         window.$RefreshReg$ = __prevRefreshReg;\n\
         window.$RefreshSig$ = __prevRefreshSig;\n\
         __peaqueRefresh.performRefresh(\"{key}\");\n"
    )
}
