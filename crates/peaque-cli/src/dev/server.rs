//! The dev HTTP listener.
//!
//! One axum app: a WebSocket route for HMR and a fallback that walks the
//! URL families in order (`/@deps/`, `/@src/`, RPC, API, framework
//! runtime assets, public files, SPA shell). First match wins.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use peaque_gen::{spa_shell, HeadDescriptor};
use peaque_router::middleware::{run_chain, ChainError, Handler, Middleware, Next};
use peaque_router::{
    assign_component_identifiers, match_route, HttpMethod, PeaqueRequest, RouteRole,
};

use crate::dev::state::SharedDevState;
use crate::dev::{pipeline, resolve, rpc};
use crate::error::{CliError, Result};
use crate::logger;
use crate::runtime::{LoadedModule, MiddlewareOutcome};
use crate::ui;

const HMR_CLIENT: &str = include_str!("../../assets/dev/peaque-dev.js");
const LOADER: &str = include_str!("../../assets/dev/peaque-loader.js");

/// The development server.
pub struct DevServer {
    state: SharedDevState,
    port: u16,
}

impl DevServer {
    pub fn new(state: SharedDevState, port: u16) -> Self {
        DevServer { state, port }
    }

    /// Bind and serve until the task is aborted. Bind failure is fatal.
    pub async fn start(self) -> Result<()> {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.port));
        let app = Router::new()
            .route("/hmr", get(handle_hmr_upgrade))
            .fallback(handle_request)
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::Server(format!("failed to bind to {addr}: {e}")))?;
        ui::success(&format!("dev server running at http://localhost:{}", self.port));

        axum::serve(listener, app)
            .await
            .map_err(|e| CliError::Server(format!("server error: {e}")))
    }
}

async fn handle_hmr_upgrade(
    State(state): State<SharedDevState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_hmr_socket(state, socket))
}

async fn handle_hmr_socket(state: SharedDevState, mut socket: WebSocket) {
    let mut rx = state.subscribe_hmr();
    info!(peers = state.hmr_peer_count(), "hmr peer connected");
    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Ok(frame) => {
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "hmr peer lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_request(
    State(state): State<SharedDevState>,
    request: axum::extract::Request,
) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();
    let response = dispatch(&state, request).await;
    if logger::perf_log_enabled() {
        let elapsed = started.elapsed().as_millis() as u64;
        if elapsed >= logger::perf_threshold_ms() {
            info!(%path, elapsed_ms = elapsed, "slow request");
        }
    }
    response
}

async fn dispatch(state: &SharedDevState, request: axum::extract::Request) -> Response {
    let path = request.uri().path().to_string();

    if let Some(name) = path.strip_prefix("/@deps/") {
        return match pipeline::serve_dependency(state, name).await {
            Ok(bytes) => js_response(bytes),
            Err(err) => text_response(StatusCode::NOT_FOUND, &err.to_string()),
        };
    }

    if let Some(module) = path.strip_prefix("/@src/") {
        return serve_src(state, module).await;
    }

    if path.starts_with(rpc::RPC_PREFIX) {
        let mut req = match to_peaque_request(request).await {
            Ok(req) => req,
            Err(response) => return response,
        };
        rpc::dispatch_rpc(state, &mut req).await;
        return from_peaque_request(req);
    }

    if path.starts_with("/api/") || path == "/api" {
        let mut req = match to_peaque_request(request).await {
            Ok(req) => req,
            Err(response) => return response,
        };
        dispatch_api(state, &mut req).await;
        return from_peaque_request(req);
    }

    match path.as_str() {
        "/peaque-dev.js" | "/peaque-loader.js" => {
            let source = if path == "/peaque-dev.js" { HMR_CLIENT } else { LOADER };
            return js_response(source.as_bytes().to_vec());
        }
        "/peaque.js" => return serve_router_module(state),
        "/peaque.css" => {
            return match state.bundler.bundle_css(&state.project_root) {
                Ok(css) => asset_response("text/css", css),
                Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
            };
        }
        "/favicon.ico" => {
            // Fall through only if the public folder has one.
        }
        _ => {}
    }

    // Public assets, then the SPA shell.
    let public = state.project_root.join("src/public").join(path.trim_start_matches('/'));
    if state.fs.is_file(&public) {
        return match state.fs.read(&public) {
            Ok(bytes) => asset_response(content_type_for(&path), bytes),
            Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        };
    }
    if path == "/favicon.ico" {
        return StatusCode::NO_CONTENT.into_response();
    }

    let head = peaque_gen::render_head(&HeadDescriptor::framework_default(), "");
    html_response(spa_shell(&head))
}

async fn serve_src(state: &SharedDevState, module: &str) -> Response {
    match resolve::resolve_source(state.fs.as_ref(), &state.project_root, module) {
        resolve::Resolution::Forbidden => {
            text_response(StatusCode::FORBIDDEN, "Forbidden: path escapes the project root")
        }
        resolve::Resolution::NotFound => {
            text_response(StatusCode::NOT_FOUND, &format!("No source module `{module}`"))
        }
        resolve::Resolution::Found(file) => match pipeline::serve_project_file(state, &file).await {
            Ok(bytes) => js_response(bytes),
            Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        },
    }
}

/// Generate `/peaque.js` from the current page router.
fn serve_router_module(state: &SharedDevState) -> Response {
    let mut tree = (*state.page_router()).clone();
    let imports = assign_component_identifiers(&mut tree);
    let entry = peaque_gen::generate_frontend_entry(&tree, &imports, "/peaque-dev.js", |path| {
        let rel = state.project_relative(std::path::Path::new(path));
        let stem = rel
            .trim_end_matches(".tsx")
            .trim_end_matches(".ts")
            .trim_end_matches(".jsx")
            .trim_end_matches(".js");
        format!("/@src/{stem}")
    });
    js_response(entry.into_bytes())
}

/// JS middleware adapter over a loaded module.
struct JsMiddleware {
    module: Arc<dyn LoadedModule>,
}

#[async_trait]
impl Middleware for JsMiddleware {
    async fn handle(&self, req: &mut PeaqueRequest, next: &mut Next<'_>) -> Result<(), ChainError> {
        match self.module.invoke_middleware(req).await {
            Ok(MiddlewareOutcome::Continue) => next.run(req).await,
            Ok(MiddlewareOutcome::Respond) => Ok(()),
            Err(err) => Err(ChainError::new(err.to_string())),
        }
    }
}

/// HTTP-method handler adapter over a loaded module.
struct JsHandler {
    module: Arc<dyn LoadedModule>,
    method: &'static str,
}

#[async_trait]
impl Handler for JsHandler {
    async fn handle(&self, req: &mut PeaqueRequest) -> Result<(), ChainError> {
        self.module
            .invoke_handler(self.method, req)
            .await
            .map_err(|err| ChainError::new(err.to_string()))
    }
}

/// Dispatch an `/api/...` request through the matched middleware chain.
pub async fn dispatch_api(state: &SharedDevState, req: &mut PeaqueRequest) {
    let router = state.api_router();
    let api_path = req.path().strip_prefix("/api").unwrap_or(req.path());
    let Some(matched) = match_route(&router, api_path) else {
        req.respond_text(404, "Not found");
        return;
    };
    let Some(handler_path) = matched.names.get(&RouteRole::Handler) else {
        req.respond_text(404, "Not found");
        return;
    };

    let module = match state.runtime.load(&state.project_relative_str(handler_path)).await {
        Ok(module) => module,
        Err(err) => {
            warn!(%handler_path, %err, "api handler failed to load");
            req.respond_text(500, "Handler failed to load");
            return;
        }
    };
    let method = req.method().as_str();
    if !module.has_export(method) {
        req.respond_text(404, &format!("No {method} handler"));
        return;
    }

    req.set_path_params(matched.params.clone());

    let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
    if let Some(global) = state.global_middleware_path() {
        match state.runtime.load(&global).await {
            Ok(module) => chain.push(Arc::new(JsMiddleware { module })),
            Err(err) => warn!(%err, "global middleware failed to load"),
        }
    }
    for middleware_path in matched.stacks.get(&RouteRole::Middleware).into_iter().flatten() {
        match state.runtime.load(&state.project_relative_str(middleware_path)).await {
            Ok(module) => chain.push(Arc::new(JsMiddleware { module })),
            Err(err) => warn!(%middleware_path, %err, "middleware failed to load"),
        }
    }

    let handler = JsHandler { module, method };
    if let Err(err) = run_chain(&chain, &handler, req).await {
        // Middleware errors become a 500 with the message in dev.
        req.respond_text(500, &err.to_string());
    }
}

// ---------------------------------------------------------------------------
// axum <-> PeaqueRequest conversion
// ---------------------------------------------------------------------------

async fn to_peaque_request(
    request: axum::extract::Request,
) -> std::result::Result<PeaqueRequest, Response> {
    let (parts, body) = request.into_parts();
    let Some(method) = HttpMethod::parse(parts.method.as_str()) else {
        return Err(text_response(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    };
    let mut req = PeaqueRequest::new(method, parts.uri.path());
    if let Some(query) = parts.uri.query() {
        let pairs = peaque_router::http::parse_query(query);
        req = req.with_query(pairs);
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            req = req.with_header(name.as_str(), value);
        }
    }
    let bytes = axum::body::to_bytes(body, 16 * 1024 * 1024)
        .await
        .map_err(|e| text_response(StatusCode::BAD_REQUEST, &format!("body read failed: {e}")))?;
    Ok(req.with_body(bytes.to_vec()))
}

fn from_peaque_request(req: PeaqueRequest) -> Response {
    let mut builder = Response::builder().status(req.response.status);
    for (name, value) in &req.response.headers {
        builder = builder.header(name, value);
    }
    for cookie in &req.response.cookies {
        let rendered = if cookie.attributes.is_empty() {
            format!("{}={}", cookie.name, cookie.value)
        } else {
            format!("{}={}; {}", cookie.name, cookie.value, cookie.attributes)
        };
        builder = builder.header(header::SET_COOKIE, rendered);
    }
    builder
        .body(Body::from(req.response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn js_response(bytes: Vec<u8>) -> Response {
    asset_response("application/javascript", bytes)
}

fn asset_response(content_type: &str, bytes: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn html_response(html: String) -> Response {
    asset_response("text/html; charset=utf-8", html.into_bytes())
}

fn text_response(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(message.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "html" => "text/html; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::state::DevState;
    use crate::runtime::{MemoryModule, MemoryRuntime};
    use peaque_build::MemoryBundler;
    use peaque_fs::{FileSystem, MemoryFileSystem};
    use peaque_transform::{AliasMap, TransformCache};
    use std::path::PathBuf;

    fn shared_state(files: &[(&str, &str)], runtime: MemoryRuntime) -> SharedDevState {
        let fs = Arc::new(MemoryFileSystem::with_files(
            files.iter().map(|(p, c)| (p.to_string(), c.to_string())),
        ));
        let cache = TransformCache::load(fs.clone(), "/app/.peaque-cache");
        let state = DevState::new(
            fs,
            Arc::new(MemoryBundler::new().with_css(b"body{}")),
            Arc::new(runtime),
            PathBuf::from("/app"),
            AliasMap::new(),
            cache,
        );
        state.rebuild_page_router().unwrap();
        state.rebuild_api_router().unwrap();
        Arc::new(state)
    }

    fn api_runtime() -> MemoryRuntime {
        let runtime = MemoryRuntime::new();
        runtime.register(
            "src/api/users/route.ts",
            MemoryModule::new().with_handler("GET", |req| {
                let id = req.path_param("id").unwrap_or("?").to_string();
                req.respond_json(200, &format!("{{\"id\":\"{id}\"}}"));
            }),
        );
        runtime
    }

    #[tokio::test]
    async fn api_dispatch_matches_method_and_params() {
        let state = shared_state(
            &[("/app/src/api/users/[id]/route.ts", "")],
            {
                let runtime = MemoryRuntime::new();
                runtime.register(
                    "src/api/users/[id]/route.ts",
                    MemoryModule::new().with_handler("GET", |req| {
                        let id = req.path_param("id").unwrap_or("?").to_string();
                        req.respond_json(200, &format!("{{\"id\":\"{id}\"}}"));
                    }),
                );
                runtime
            },
        );
        let mut req = PeaqueRequest::new(HttpMethod::Get, "/api/users/42");
        dispatch_api(&state, &mut req).await;
        assert_eq!(req.response.status, 200);
        assert_eq!(req.response.body, b"{\"id\":\"42\"}");
    }

    #[tokio::test]
    async fn missing_method_export_is_404() {
        let state = shared_state(&[("/app/src/api/users/route.ts", "")], api_runtime());
        let mut req = PeaqueRequest::new(HttpMethod::Delete, "/api/users");
        dispatch_api(&state, &mut req).await;
        assert_eq!(req.response.status, 404);
    }

    #[tokio::test]
    async fn unmatched_api_path_is_404() {
        let state = shared_state(&[("/app/src/api/users/route.ts", "")], api_runtime());
        let mut req = PeaqueRequest::new(HttpMethod::Get, "/api/unknown");
        dispatch_api(&state, &mut req).await;
        assert_eq!(req.response.status, 404);
    }

    #[tokio::test]
    async fn middleware_chain_runs_before_handler() {
        let runtime = MemoryRuntime::new();
        runtime.register(
            "src/api/users/route.ts",
            MemoryModule::new().with_handler("GET", |req| req.respond_text(200, "users")),
        );
        runtime.register(
            "src/api/middleware.ts",
            MemoryModule::new().with_middleware(|req| {
                if req.header("authorization").is_none() {
                    req.respond_text(401, "unauthorized");
                    MiddlewareOutcome::Respond
                } else {
                    MiddlewareOutcome::Continue
                }
            }),
        );
        let state = shared_state(
            &[
                ("/app/src/api/middleware.ts", ""),
                ("/app/src/api/users/route.ts", ""),
            ],
            runtime,
        );

        let mut denied = PeaqueRequest::new(HttpMethod::Get, "/api/users");
        dispatch_api(&state, &mut denied).await;
        assert_eq!(denied.response.status, 401);

        let mut allowed = PeaqueRequest::new(HttpMethod::Get, "/api/users")
            .with_header("authorization", "Bearer x");
        dispatch_api(&state, &mut allowed).await;
        assert_eq!(allowed.response.status, 200);
        assert_eq!(allowed.response.body, b"users");
    }

    #[tokio::test]
    async fn router_module_is_generated_from_current_tree() {
        let state = shared_state(
            &[("/app/src/pages/page.tsx", ""), ("/app/src/pages/about/page.tsx", "")],
            MemoryRuntime::new(),
        );
        let response = serve_router_module(&state);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("pattern: \"/\""));
        assert!(text.contains("pattern: \"/about\""));
        assert!(text.contains("/@src/src/pages/about/page"));
    }

    #[tokio::test]
    async fn router_module_reflects_swapped_tree() {
        let state = shared_state(&[("/app/src/pages/page.tsx", "")], MemoryRuntime::new());
        state
            .fs
            .write(std::path::Path::new("/app/src/pages/blog/page.tsx"), b"")
            .unwrap();
        state.rebuild_page_router().unwrap();

        let response = serve_router_module(&state);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("/blog"));
    }

    #[test]
    fn content_types_cover_common_assets() {
        assert_eq!(content_type_for("/peaque.js"), "application/javascript");
        assert_eq!(content_type_for("/logo.svg"), "image/svg+xml");
        assert_eq!(content_type_for("/font.woff2"), "font/woff2");
        assert_eq!(content_type_for("/blob.bin"), "application/octet-stream");
    }
}
