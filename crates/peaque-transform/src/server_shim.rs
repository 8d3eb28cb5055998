//! Client stubs for `'use server'` modules.
//!
//! When a module opens with the `'use server'` directive its transform is
//! replaced entirely: the browser receives a generated stub whose exports
//! POST to the RPC endpoint instead of shipping server code to the
//! client. Every locally declared export must be async; `export *` is
//! rejected outright.

use crate::scanner::{scan_exports, ExportKind, ModuleExport};
use crate::{TransformError, TransformResult};

/// A generated client stub.
#[derive(Debug, Clone)]
pub struct ServerShim {
    pub module_path: String,
    pub exported_functions: Vec<String>,
    pub shim_source: String,
}

/// True when the first non-whitespace content of `source` is the
/// `'use server'` directive, in either quote style.
pub fn is_server_module(source: &str) -> bool {
    let trimmed = source.trim_start();
    trimmed.starts_with("'use server'") || trimmed.starts_with("\"use server\"")
}

/// Generate the client stub for a `'use server'` module.
///
/// `module_path` is the project-relative path used in the RPC URL, e.g.
/// `src/actions/users.ts` yields calls to
/// `/api/__rpc/src/actions/users.ts/<name>`.
pub fn generate_server_shim(source: &str, module_path: &str) -> TransformResult<ServerShim> {
    let exports = scan_exports(source);

    if exports.iter().any(|e| e.kind == ExportKind::Star) {
        return Err(TransformError::Source(format!(
            "'use server' module {module_path} uses `export *`, which cannot be exposed as \
             server functions; export each function by name instead"
        )));
    }

    let mut names = Vec::new();
    for export in &exports {
        check_async(export, module_path)?;
        names.push(export.name.clone());
    }

    let mut out = String::new();
    out.push_str("// Generated client stub for a 'use server' module.\n");
    out.push_str("import { encodeWire, decodeWire } from \"/peaque-dev.js\";\n");
    out.push_str(&format!("const __modulePath = {};\n", js_string(module_path)));
    out.push_str(concat!(
        "async function __rpcCall(name, args) {\n",
        "  const response = await fetch(`/api/__rpc/${__modulePath}/${name}`, {\n",
        "    method: \"POST\",\n",
        "    headers: { \"content-type\": \"application/json\" },\n",
        "    body: encodeWire({ args }),\n",
        "  });\n",
        "  const text = await response.text();\n",
        "  if (!response.ok) {\n",
        "    throw new Error(text);\n",
        "  }\n",
        "  return decodeWire(text);\n",
        "}\n",
    ));
    for export in &exports {
        if export.name == "default" {
            out.push_str("export default (...args) => __rpcCall(\"default\", args);\n");
        } else {
            out.push_str(&format!(
                "export const {name} = (...args) => __rpcCall({quoted}, args);\n",
                name = export.name,
                quoted = js_string(&export.name),
            ));
        }
    }

    Ok(ServerShim {
        module_path: module_path.to_string(),
        exported_functions: names,
        shim_source: out,
    })
}

fn check_async(export: &ModuleExport, module_path: &str) -> TransformResult<()> {
    match export.kind {
        // The target module is verified when it is transformed itself.
        ExportKind::ReExport => Ok(()),
        _ if export.is_async => Ok(()),
        _ => Err(TransformError::Source(format!(
            "server function {name} is not async in {module_path}; every export of a \
             'use server' module must be an async function",
            name = export.name,
        ))),
    }
}

fn js_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
