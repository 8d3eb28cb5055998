//! Server-action RPC dispatch.
//!
//! `POST /api/__rpc/<module-path>/<function-name>`: guard, load the
//! module through the runtime, look up the function, decode the typed
//! args, invoke inside a request-scoped context, encode the result.
//! Thrown errors become a 500 carrying the message; server actions rely
//! on throw/catch for control flow on the client.

use tracing::debug;

use peaque_router::context::RequestContext;
use peaque_router::{check_same_origin, GuardDecision, HttpMethod, PeaqueRequest};
use peaque_transform::wire;

use crate::dev::state::DevState;
use crate::runtime::RuntimeError;

pub const RPC_PREFIX: &str = "/api/__rpc/";

/// Split an RPC path into `(module_path, function_name)`. The function
/// name is the segment after the last slash.
pub fn parse_rpc_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(RPC_PREFIX)?;
    let (module, function) = rest.rsplit_once('/')?;
    if module.is_empty() || function.is_empty() {
        return None;
    }
    Some((module, function))
}

/// Run one RPC request, writing the outcome into `req`.
pub async fn dispatch_rpc(state: &DevState, req: &mut PeaqueRequest) {
    if req.method() != HttpMethod::Post {
        req.respond_text(404, "Not found");
        return;
    }

    // The guard runs before any other work.
    if check_same_origin(&state.guard, req) == GuardDecision::Deny {
        req.respond_json(403, r#"{"error":"Forbidden: Cross-origin request rejected"}"#);
        return;
    }

    let Some((module_path, function_name)) = parse_rpc_path(req.path()) else {
        req.respond_text(404, "Not found");
        return;
    };
    let module_path = module_path.to_string();
    let function_name = function_name.to_string();

    let module = match state.runtime.load(&module_path).await {
        Ok(module) => module,
        Err(err) => {
            debug!(%module_path, %err, "rpc module failed to load");
            req.respond_text(404, "Not found");
            return;
        }
    };
    if !module.has_export(&function_name) {
        req.respond_text(404, &format!("No server function `{function_name}`"));
        return;
    }

    let args = match wire::decode_args(req.body()) {
        Ok(args) => args,
        Err(err) => {
            req.respond_text(400, &err.to_string());
            return;
        }
    };

    let context = RequestContext::from_request(req);
    let invoke_ctx = context.clone();
    let result = context
        .scope(async move { module.invoke(&function_name, args).await })
        .await;

    for (name, value) in invoke_ctx.take_response_headers() {
        req.set_header(&name, value);
    }

    match result {
        Ok(value) => {
            req.respond_json(200, &wire::encode(&value));
        }
        Err(RuntimeError::MissingExport(name)) => {
            req.respond_text(404, &format!("No server function `{name}`"));
        }
        Err(err) => {
            // Deliberate: the thrown message is the response body.
            req.respond_text(500, &err.to_string());
        }
    }
}
