//! The application-module runtime collaborator.
//!
//! The core never executes application JavaScript itself. The dev server
//! reaches handlers, middleware, server actions, head modules and job
//! modules through [`ModuleRuntime`]; the shipped implementation drives
//! a node sidecar over JSON lines, and [`MemoryRuntime`] is the test
//! double the suites use.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use peaque_router::PeaqueRequest;
use peaque_transform::WireValue;

/// Errors crossing the runtime seam.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to load module {0}: {1}")]
    Load(String, String),

    #[error("module has no export `{0}`")]
    MissingExport(String),

    /// The invoked function threw; the message is what the application
    /// threw, and it goes into the 500 body on purpose.
    #[error("{0}")]
    Invoke(String),

    #[error("module runtime transport: {0}")]
    Transport(String),
}

/// What a middleware module asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareOutcome {
    /// Continue down the chain.
    Continue,
    /// The middleware wrote a response; stop here.
    Respond,
}

/// A loaded application module.
#[async_trait]
pub trait LoadedModule: Send + Sync {
    fn exports(&self) -> Vec<String>;

    fn has_export(&self, name: &str) -> bool {
        self.exports().iter().any(|e| e == name)
    }

    /// Read a data export (e.g. a job's `schedule` array).
    async fn data_export(&self, name: &str) -> Option<WireValue>;

    /// Invoke an exported function with wire-typed arguments.
    async fn invoke(&self, name: &str, args: Vec<WireValue>) -> Result<WireValue, RuntimeError>;

    /// Invoke an HTTP-method export, applying its response to `req`.
    async fn invoke_handler(&self, name: &str, req: &mut PeaqueRequest)
        -> Result<(), RuntimeError>;

    /// Invoke the module's default export as middleware.
    async fn invoke_middleware(
        &self,
        req: &mut PeaqueRequest,
    ) -> Result<MiddlewareOutcome, RuntimeError>;
}

/// Loads application modules by project-relative path.
#[async_trait]
pub trait ModuleRuntime: Send + Sync {
    async fn load(&self, module_path: &str) -> Result<Arc<dyn LoadedModule>, RuntimeError>;

    /// Drop a cached module so the next load sees fresh code.
    fn invalidate(&self, module_path: &str) {
        let _ = module_path;
    }
}

// ---------------------------------------------------------------------------
// In-memory test double
// ---------------------------------------------------------------------------

type SyncFn = Arc<dyn Fn(Vec<WireValue>) -> Result<WireValue, String> + Send + Sync>;
type HandlerFn = Arc<dyn Fn(&mut PeaqueRequest) + Send + Sync>;
type MiddlewareFn = Arc<dyn Fn(&mut PeaqueRequest) -> MiddlewareOutcome + Send + Sync>;

/// One scripted module inside [`MemoryRuntime`].
#[derive(Default, Clone)]
pub struct MemoryModule {
    data: FxHashMap<String, WireValue>,
    functions: FxHashMap<String, SyncFn>,
    handlers: FxHashMap<String, HandlerFn>,
    middleware: Option<MiddlewareFn>,
}

impl MemoryModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, name: &str, value: WireValue) -> Self {
        self.data.insert(name.to_string(), value);
        self
    }

    pub fn with_function(
        mut self,
        name: &str,
        function: impl Fn(Vec<WireValue>) -> Result<WireValue, String> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.to_string(), Arc::new(function));
        self
    }

    pub fn with_handler(
        mut self,
        method: &str,
        handler: impl Fn(&mut PeaqueRequest) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method.to_string(), Arc::new(handler));
        self
    }

    pub fn with_middleware(
        mut self,
        middleware: impl Fn(&mut PeaqueRequest) -> MiddlewareOutcome + Send + Sync + 'static,
    ) -> Self {
        self.middleware = Some(Arc::new(middleware));
        self
    }
}

#[async_trait]
impl LoadedModule for MemoryModule {
    fn exports(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .data
            .keys()
            .chain(self.functions.keys())
            .chain(self.handlers.keys())
            .cloned()
            .collect();
        if self.middleware.is_some() {
            out.push("default".to_string());
        }
        out.sort();
        out.dedup();
        out
    }

    async fn data_export(&self, name: &str) -> Option<WireValue> {
        self.data.get(name).cloned()
    }

    async fn invoke(&self, name: &str, args: Vec<WireValue>) -> Result<WireValue, RuntimeError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::MissingExport(name.to_string()))?;
        function(args).map_err(RuntimeError::Invoke)
    }

    async fn invoke_handler(
        &self,
        name: &str,
        req: &mut PeaqueRequest,
    ) -> Result<(), RuntimeError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| RuntimeError::MissingExport(name.to_string()))?;
        handler(req);
        Ok(())
    }

    async fn invoke_middleware(
        &self,
        req: &mut PeaqueRequest,
    ) -> Result<MiddlewareOutcome, RuntimeError> {
        let middleware = self
            .middleware
            .as_ref()
            .ok_or_else(|| RuntimeError::MissingExport("default".to_string()))?;
        Ok(middleware(req))
    }
}

/// Scripted [`ModuleRuntime`] for tests.
#[derive(Default)]
pub struct MemoryRuntime {
    modules: Mutex<FxHashMap<String, Arc<MemoryModule>>>,
    invalidated: Mutex<Vec<String>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module_path: &str, module: MemoryModule) {
        self.modules.lock().insert(module_path.to_string(), Arc::new(module));
    }

    pub fn invalidated_paths(&self) -> Vec<String> {
        self.invalidated.lock().clone()
    }
}

#[async_trait]
impl ModuleRuntime for MemoryRuntime {
    async fn load(&self, module_path: &str) -> Result<Arc<dyn LoadedModule>, RuntimeError> {
        self.modules
            .lock()
            .get(module_path)
            .cloned()
            .map(|m| m as Arc<dyn LoadedModule>)
            .ok_or_else(|| {
                RuntimeError::Load(module_path.to_string(), "module not registered".to_string())
            })
    }

    fn invalidate(&self, module_path: &str) {
        self.invalidated.lock().push(module_path.to_string());
    }
}

// ---------------------------------------------------------------------------
// Node sidecar
// ---------------------------------------------------------------------------

const RUNNER_SOURCE: &str = include_str!("../assets/runner.mjs");

/// Node-backed [`ModuleRuntime`]: one long-lived `node` child speaking
/// JSON lines on stdio, importing application modules in-process.
pub struct NodeRuntime {
    project_root: PathBuf,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Arc<Mutex<FxHashMap<u64, oneshot::Sender<Value>>>>,
    next_id: AtomicU64,
    _child: Child,
}

impl NodeRuntime {
    /// Spawn the sidecar. Fatal when `node` is unavailable.
    pub fn spawn(project_root: &std::path::Path) -> Result<Arc<Self>, RuntimeError> {
        let mut child = Command::new("node")
            .arg("--input-type=module")
            .arg("-e")
            .arg(RUNNER_SOURCE)
            .current_dir(project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Transport(format!("failed to spawn node: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::Transport("node stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Transport("node stdout unavailable".into()))?;

        let pending: Arc<Mutex<FxHashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(FxHashMap::default()));
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let value: Value = match serde_json::from_str(&line) {
                    Ok(value) => value,
                    Err(err) => {
                        debug!(%err, line, "ignoring non-protocol sidecar output");
                        continue;
                    }
                };
                let Some(id) = value.get("id").and_then(Value::as_u64) else {
                    continue;
                };
                if let Some(tx) = reader_pending.lock().remove(&id) {
                    let _ = tx.send(value);
                }
            }
            warn!("module runtime sidecar closed its stdout");
        });

        Ok(Arc::new(NodeRuntime {
            project_root: project_root.to_path_buf(),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            _child: child,
        }))
    }

    pub async fn request(&self, mut payload: Value) -> Result<Value, RuntimeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        payload["id"] = json!(id);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut line = payload.to_string();
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| RuntimeError::Transport(format!("sidecar write failed: {e}")))?;
        }

        let response = rx
            .await
            .map_err(|_| RuntimeError::Transport("sidecar exited mid-request".into()))?;
        if response.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(response)
        } else {
            let message = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown sidecar error")
                .to_string();
            Err(RuntimeError::Invoke(message))
        }
    }

    pub fn project_root(&self) -> &std::path::Path {
        &self.project_root
    }
}

/// Handle for one node-loaded module.
struct NodeModule {
    runtime: Arc<NodeRuntime>,
    module_path: String,
    export_names: Vec<String>,
}

#[async_trait]
impl ModuleRuntime for Arc<NodeRuntime> {
    async fn load(&self, module_path: &str) -> Result<Arc<dyn LoadedModule>, RuntimeError> {
        let response = self
            .request(json!({ "op": "load", "module": module_path }))
            .await
            .map_err(|e| RuntimeError::Load(module_path.to_string(), e.to_string()))?;
        let export_names = response
            .get("exports")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Arc::new(NodeModule {
            runtime: Arc::clone(self),
            module_path: module_path.to_string(),
            export_names,
        }))
    }

    fn invalidate(&self, module_path: &str) {
        let runtime = Arc::clone(self);
        let module = module_path.to_string();
        tokio::spawn(async move {
            let _ = runtime.request(json!({ "op": "invalidate", "module": module })).await;
        });
    }
}

fn request_snapshot(req: &PeaqueRequest) -> Value {
    use base64::Engine;
    json!({
        "method": req.method().as_str(),
        "path": req.path(),
        "params": req.path_params().iter().collect::<std::collections::BTreeMap<_, _>>(),
        "query": req.query().iter().collect::<std::collections::BTreeMap<_, _>>(),
        "headers": req.headers().iter().collect::<std::collections::BTreeMap<_, _>>(),
        "body": base64::engine::general_purpose::STANDARD.encode(req.body()),
    })
}

fn apply_response(req: &mut PeaqueRequest, response: &Value) {
    use base64::Engine;
    if let Some(status) = response.get("status").and_then(Value::as_u64) {
        req.set_status(status as u16);
    }
    if let Some(headers) = response.get("headers").and_then(Value::as_array) {
        for header in headers {
            if let (Some(name), Some(value)) = (
                header.get(0).and_then(Value::as_str),
                header.get(1).and_then(Value::as_str),
            ) {
                req.set_header(name, value);
            }
        }
    }
    if let Some(body) = response.get("body").and_then(Value::as_str) {
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(body) {
            req.set_body(bytes);
        }
    }
}

#[async_trait]
impl LoadedModule for NodeModule {
    fn exports(&self) -> Vec<String> {
        self.export_names.clone()
    }

    async fn data_export(&self, name: &str) -> Option<WireValue> {
        let response = self
            .runtime
            .request(json!({ "op": "data", "module": self.module_path, "name": name }))
            .await
            .ok()?;
        let wire = response.get("value")?.as_str()?;
        peaque_transform::wire::decode(wire).ok()
    }

    async fn invoke(&self, name: &str, args: Vec<WireValue>) -> Result<WireValue, RuntimeError> {
        let encoded_args =
            peaque_transform::wire::encode(&WireValue::Array(args));
        let response = self
            .runtime
            .request(json!({
                "op": "invoke",
                "module": self.module_path,
                "name": name,
                "args": encoded_args,
            }))
            .await?;
        let result = response
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("null");
        peaque_transform::wire::decode(result)
            .map_err(|e| RuntimeError::Transport(format!("bad wire result: {e}")))
    }

    async fn invoke_handler(
        &self,
        name: &str,
        req: &mut PeaqueRequest,
    ) -> Result<(), RuntimeError> {
        let response = self
            .runtime
            .request(json!({
                "op": "handler",
                "module": self.module_path,
                "name": name,
                "request": request_snapshot(req),
            }))
            .await?;
        apply_response(req, &response);
        Ok(())
    }

    async fn invoke_middleware(
        &self,
        req: &mut PeaqueRequest,
    ) -> Result<MiddlewareOutcome, RuntimeError> {
        let response = self
            .runtime
            .request(json!({
                "op": "middleware",
                "module": self.module_path,
                "request": request_snapshot(req),
            }))
            .await?;
        apply_response(req, &response);
        if response.get("next").and_then(Value::as_bool).unwrap_or(false) {
            Ok(MiddlewareOutcome::Continue)
        } else {
            Ok(MiddlewareOutcome::Respond)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peaque_router::HttpMethod;

    #[tokio::test]
    async fn memory_runtime_loads_registered_modules() {
        let runtime = MemoryRuntime::new();
        runtime.register(
            "src/actions/users.ts",
            MemoryModule::new().with_function("updateUser", |args| {
                Ok(args.into_iter().next().unwrap_or(WireValue::Null))
            }),
        );

        let module = runtime.load("src/actions/users.ts").await.unwrap();
        assert!(module.has_export("updateUser"));
        let result = module
            .invoke("updateUser", vec![WireValue::String("ada".into())])
            .await
            .unwrap();
        assert_eq!(result, WireValue::String("ada".into()));
    }

    #[tokio::test]
    async fn unknown_module_fails_to_load() {
        let runtime = MemoryRuntime::new();
        assert!(runtime.load("src/missing.ts").await.is_err());
    }

    #[tokio::test]
    async fn thrown_errors_surface_their_message() {
        let runtime = MemoryRuntime::new();
        runtime.register(
            "m.ts",
            MemoryModule::new().with_function("boom", |_| Err("user not found".to_string())),
        );
        let module = runtime.load("m.ts").await.unwrap();
        let err = module.invoke("boom", vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "user not found");
    }

    #[tokio::test]
    async fn handlers_mutate_the_request() {
        let runtime = MemoryRuntime::new();
        runtime.register(
            "src/api/users/route.ts",
            MemoryModule::new().with_handler("GET", |req| {
                req.respond_json(200, "[{\"id\":1}]");
            }),
        );
        let module = runtime.load("src/api/users/route.ts").await.unwrap();
        let mut req = PeaqueRequest::new(HttpMethod::Get, "/api/users");
        module.invoke_handler("GET", &mut req).await.unwrap();
        assert_eq!(req.response.status, 200);
        assert_eq!(req.response.body, b"[{\"id\":1}]");
    }

    #[tokio::test]
    async fn middleware_outcomes_propagate() {
        let runtime = MemoryRuntime::new();
        runtime.register(
            "src/middleware.ts",
            MemoryModule::new().with_middleware(|req| {
                if req.header("authorization").is_some() {
                    MiddlewareOutcome::Continue
                } else {
                    req.respond_text(401, "unauthorized");
                    MiddlewareOutcome::Respond
                }
            }),
        );
        let module = runtime.load("src/middleware.ts").await.unwrap();

        let mut open = PeaqueRequest::new(HttpMethod::Get, "/api/x");
        assert_eq!(module.invoke_middleware(&mut open).await.unwrap(), MiddlewareOutcome::Respond);
        assert_eq!(open.response.status, 401);

        let mut authed =
            PeaqueRequest::new(HttpMethod::Get, "/api/x").with_header("authorization", "Bearer t");
        assert_eq!(
            module.invoke_middleware(&mut authed).await.unwrap(),
            MiddlewareOutcome::Continue
        );
    }
}
