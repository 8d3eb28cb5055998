//! Standalone backend entry generation.
//!
//! The production build emits one JavaScript module that re-materializes
//! the router offline: every API handler, server-action module and job is
//! imported statically, page routes serve their pre-rendered documents,
//! and assets are registered with their compressed variants. The file is
//! assembled through [`CodeBuilder`] so identical builds produce
//! identical bytes.

use crate::code_builder::{CodeBuilder, ImportCollection};

/// One API route registration.
#[derive(Debug, Clone)]
pub struct ApiRoute {
    /// Route pattern, e.g. `/api/users/:id`.
    pub pattern: String,
    /// Project-relative module path of `route.ts`.
    pub module_path: String,
    /// HTTP-method exports found on the module.
    pub methods: Vec<String>,
    /// Middleware module paths, outermost first.
    pub middleware: Vec<String>,
}

/// One `'use server'` module with its RPC index.
#[derive(Debug, Clone)]
pub struct RpcModule {
    pub index: usize,
    pub module_path: String,
    pub functions: Vec<String>,
}

/// One scheduled job module.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub module_path: String,
    /// Directory-relative name with the job suffix stripped.
    pub display_name: String,
}

/// One page registration: pattern plus head-stack key.
#[derive(Debug, Clone)]
pub struct PageRoute {
    pub pattern: String,
    pub stack_key: String,
}

/// Everything the generator needs to emit the entry.
#[derive(Debug, Default)]
pub struct BackendEntrySpec {
    pub api_routes: Vec<ApiRoute>,
    pub rpc_modules: Vec<RpcModule>,
    pub pages: Vec<PageRoute>,
    /// Stack key → full HTML document.
    pub documents: Vec<(String, String)>,
    /// Asset-relative paths under the asset directory.
    pub assets: Vec<String>,
    /// Public URL prefix, e.g. `/assets-0a1b2c3d`.
    pub asset_prefix: String,
    pub has_startup: bool,
    pub has_global_middleware: bool,
    pub jobs: Vec<JobEntry>,
    pub default_port: u16,
}

fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Generate the backend entry source.
pub fn generate_backend_entry(spec: &BackendEntrySpec) -> String {
    let mut imports = ImportCollection::new();
    imports.named_import("peaque/backend", "createBackend");
    imports.named_import("peaque/backend", "decodeWire");
    imports.named_import("peaque/backend", "encodeWire");
    imports.named_import("peaque/backend", "sameOriginAllowed");

    if spec.has_startup {
        imports.side_effect_import("./src/startup.ts");
    }
    if spec.has_global_middleware {
        imports.default_import("./src/middleware.ts", "globalMiddleware");
    }
    if !spec.jobs.is_empty() {
        imports.named_import("croner", "Cron");
    }

    let mut middleware_idents: Vec<(String, String)> = Vec::new();
    let mut middleware_seen = std::collections::BTreeMap::new();
    for route in &spec.api_routes {
        for path in &route.middleware {
            if !middleware_seen.contains_key(path) {
                let ident = format!("middleware{}", middleware_seen.len());
                middleware_seen.insert(path.clone(), ident.clone());
                middleware_idents.push((path.clone(), ident));
            }
        }
    }
    for (path, ident) in &middleware_idents {
        imports.default_import(&format!("./{path}"), ident);
    }
    for (index, route) in spec.api_routes.iter().enumerate() {
        imports.namespace_import(&format!("./{}", route.module_path), &format!("api{index}"));
    }
    for module in &spec.rpc_modules {
        imports.namespace_import(&format!("./{}", module.module_path), &format!("rpc{}", module.index));
    }
    for (index, job) in spec.jobs.iter().enumerate() {
        imports.namespace_import(&format!("./{}", job.module_path), &format!("job{index}"));
    }

    let mut out = CodeBuilder::new();
    out.line("// Generated by peaque build. Do not edit.");
    imports.emit(&mut out);
    out.blank();

    // Pre-rendered documents keyed by head-stack key.
    out.open("const documents = {");
    let mut documents = spec.documents.clone();
    documents.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, html) in &documents {
        out.line(format!("{}: {},", js_str(key), js_str(html)));
    }
    out.close("};");
    out.blank();

    out.line("const backend = createBackend();");
    if spec.has_global_middleware {
        out.line("backend.use(globalMiddleware);");
    }
    out.blank();

    // Server-action dispatch helper shared by every RPC registration.
    out.block("function rpcHandler(fn) {", "}", |out| {
        out.block("return async (req) => {", "};", |out| {
            out.block("if (!sameOriginAllowed(req)) {", "}", |out| {
                out.line("req.status(403);");
                out.line(
                    "req.send(JSON.stringify({ error: \"Forbidden: Cross-origin request rejected\" }));",
                );
                out.line("return;");
            });
            out.line("const { args } = decodeWire(req.rawBody());");
            out.block("try {", "}", |out| {
                out.line("const result = await req.withRequestContext(() => fn(...args));");
                out.line("req.header(\"content-type\", \"application/json\");");
                out.line("req.send(encodeWire(result));");
            });
            out.open("catch (error) {");
            out.line("req.status(500);");
            out.line("req.send(String(error && error.message ? error.message : error));");
            out.close("}");
        });
    });
    out.blank();

    // API routes.
    for (index, route) in spec.api_routes.iter().enumerate() {
        let chain = route
            .middleware
            .iter()
            .map(|path| middleware_seen[path].clone())
            .collect::<Vec<_>>()
            .join(", ");
        let mut methods = route.methods.clone();
        methods.sort();
        for method in &methods {
            out.line(format!(
                "backend.route({}, {}, api{index}.{method}, [{chain}]);",
                js_str(method),
                js_str(&route.pattern),
            ));
        }
    }
    if !spec.api_routes.is_empty() {
        out.blank();
    }

    // Server actions at /api/__rpc/<index>/<name>.
    for module in &spec.rpc_modules {
        let mut functions = module.functions.clone();
        functions.sort();
        for function in &functions {
            let access = if function == "default" {
                format!("rpc{}.default", module.index)
            } else {
                format!("rpc{}.{function}", module.index)
            };
            out.line(format!(
                "backend.route(\"POST\", {}, rpcHandler({access}), []);",
                js_str(&format!("/api/__rpc/{}/{}", module.index, function)),
            ));
        }
    }
    if !spec.rpc_modules.is_empty() {
        out.blank();
    }

    // Page routes serve their pre-rendered document.
    let mut pages = spec.pages.clone();
    pages.sort_by(|a, b| a.pattern.cmp(&b.pattern));
    for page in &pages {
        out.line(format!(
            "backend.page({}, documents[{}]);",
            js_str(&page.pattern),
            js_str(&page.stack_key),
        ));
    }
    if !pages.is_empty() {
        out.blank();
    }

    // Assets, served with the compressed variant the client accepts.
    let mut assets = spec.assets.clone();
    assets.sort();
    for asset in &assets {
        out.line(format!(
            "backend.asset({}, {});",
            js_str(&format!("{}/{asset}", spec.asset_prefix)),
            js_str(&format!(".{}/{asset}", spec.asset_prefix)),
        ));
    }
    if !assets.is_empty() {
        out.blank();
    }

    // Jobs: one cron subscription per schedule entry, overlap-protected.
    for (index, job) in spec.jobs.iter().enumerate() {
        let name = js_str(&job.display_name);
        out.block(
            format!("for (const expression of job{index}.schedule ?? []) {{"),
            "}",
            |out| {
                out.block(
                    "new Cron(expression, { protect: true }, async () => {",
                    "});",
                    |out| {
                        out.block("try {", "}", |out| {
                            out.line(format!("await job{index}.runJob();"));
                        });
                        out.open("catch (error) {");
                        out.line(format!("console.error(`[job ${{{name}}}]`, error);"));
                        out.close("}");
                    },
                );
            },
        );
    }
    if !spec.jobs.is_empty() {
        out.blank();
    }

    // Port parsing, startup and signal handling.
    let default_port = if spec.default_port == 0 { 3000 } else { spec.default_port };
    out.block("function parsePort(argv) {", "}", |out| {
        out.block("for (let i = 0; i < argv.length; i += 1) {", "}", |out| {
            out.block(
                "if (argv[i] === \"--port\" || argv[i] === \"-p\") {",
                "}",
                |out| {
                    out.line("const value = Number(argv[i + 1]);");
                    out.line("if (Number.isInteger(value) && value > 0) return value;");
                },
            );
        });
        out.line(format!("return {default_port};"));
    });
    out.blank();
    out.line("const port = parsePort(process.argv.slice(2));");
    out.line("const server = backend.listen(port);");
    out.line("console.log(`peaque backend listening on http://localhost:${port}`);");
    out.line(format!(
        "console.log(`serving {} pages, {} api routes, {} assets`);",
        pages.len(),
        spec.api_routes.len(),
        assets.len(),
    ));
    out.block("for (const signal of [\"SIGINT\", \"SIGTERM\"]) {", "}", |out| {
        out.block("process.on(signal, () => {", "});", |out| {
            out.line("server.stop();");
            out.line("process.exit(0);");
        });
    });

    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> BackendEntrySpec {
        BackendEntrySpec {
            api_routes: vec![ApiRoute {
                pattern: "/api/users/:id".into(),
                module_path: "src/api/users/[id]/route.ts".into(),
                methods: vec!["GET".into(), "DELETE".into()],
                middleware: vec!["src/api/middleware.ts".into()],
            }],
            rpc_modules: vec![RpcModule {
                index: 0,
                module_path: "src/actions/users.ts".into(),
                functions: vec!["updateUser".into(), "default".into()],
            }],
            pages: vec![PageRoute { pattern: "/users/:id".into(), stack_key: "abc123def456".into() }],
            documents: vec![("abc123def456".into(), "<!DOCTYPE html>...".into())],
            assets: vec!["peaque.js".into(), "logo.svg".into()],
            asset_prefix: "/assets-0a1b2c3d".into(),
            has_startup: true,
            has_global_middleware: true,
            jobs: vec![JobEntry {
                module_path: "src/jobs/cleanup/job.ts".into(),
                display_name: "cleanup".into(),
            }],
            default_port: 3000,
        }
    }

    #[test]
    fn imports_are_static_and_sorted() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains("import \"./src/startup.ts\";"));
        assert!(entry.contains("import globalMiddleware from \"./src/middleware.ts\";"));
        assert!(entry.contains("import * as api0 from \"./src/api/users/[id]/route.ts\";"));
        assert!(entry.contains("import * as rpc0 from \"./src/actions/users.ts\";"));
        assert!(entry.contains("import * as job0 from \"./src/jobs/cleanup/job.ts\";"));
        assert!(entry.contains("import { Cron } from \"croner\";"));
    }

    #[test]
    fn api_methods_map_to_registrations() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains(
            "backend.route(\"DELETE\", \"/api/users/:id\", api0.DELETE, [middleware0]);"
        ));
        assert!(entry
            .contains("backend.route(\"GET\", \"/api/users/:id\", api0.GET, [middleware0]);"));
    }

    #[test]
    fn rpc_routes_use_index_and_guard() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains(
            "backend.route(\"POST\", \"/api/__rpc/0/updateUser\", rpcHandler(rpc0.updateUser), []);"
        ));
        assert!(entry.contains(
            "backend.route(\"POST\", \"/api/__rpc/0/default\", rpcHandler(rpc0.default), []);"
        ));
        assert!(entry.contains("if (!sameOriginAllowed(req))"));
        assert!(entry.contains("Forbidden: Cross-origin request rejected"));
    }

    #[test]
    fn pages_serve_their_stack_document() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains("backend.page(\"/users/:id\", documents[\"abc123def456\"]);"));
        assert!(entry.contains("\"abc123def456\": \"<!DOCTYPE html>...\","));
    }

    #[test]
    fn assets_are_registered_under_the_prefix() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains(
            "backend.asset(\"/assets-0a1b2c3d/logo.svg\", \"./assets-0a1b2c3d/logo.svg\");"
        ));
    }

    #[test]
    fn jobs_schedule_with_overlap_protection() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains("for (const expression of job0.schedule ?? [])"));
        assert!(entry.contains("new Cron(expression, { protect: true }, async () => {"));
        assert!(entry.contains("await job0.runJob();"));
        assert!(entry.contains("console.error(`[job ${\"cleanup\"}]`, error);"));
    }

    #[test]
    fn port_parsing_defaults_to_3000() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains("argv[i] === \"--port\" || argv[i] === \"-p\""));
        assert!(entry.contains("return 3000;"));
    }

    #[test]
    fn signal_handlers_stop_the_listener() {
        let entry = generate_backend_entry(&sample_spec());
        assert!(entry.contains("for (const signal of [\"SIGINT\", \"SIGTERM\"])"));
        assert!(entry.contains("server.stop();"));
    }

    #[test]
    fn output_is_deterministic() {
        let a = generate_backend_entry(&sample_spec());
        let b = generate_backend_entry(&sample_spec());
        assert_eq!(a, b);
    }

    #[test]
    fn empty_spec_still_boots() {
        let entry = generate_backend_entry(&BackendEntrySpec::default());
        assert!(entry.contains("const backend = createBackend();"));
        assert!(entry.contains("backend.listen(port)"));
        assert!(!entry.contains("croner"));
    }
}
