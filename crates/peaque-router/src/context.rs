//! Request-scoped context propagation.
//!
//! Server actions need the current request without it being threaded
//! through user code. The slot is a tokio task-local: set once when the
//! dispatcher enters the request task, readable from anywhere below it,
//! and absent outside a request task.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::http::{HttpMethod, PeaqueRequest};

tokio::task_local! {
    static CURRENT_REQUEST: RequestContext;
}

/// Immutable request facts plus a shared slot for response side-effects
/// (cookies, headers) set from inside a server action.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    method: HttpMethod,
    path: String,
    headers: FxHashMap<String, String>,
    path_params: FxHashMap<String, String>,
    outgoing: Mutex<Vec<(String, String)>>,
}

impl RequestContext {
    pub fn from_request(req: &PeaqueRequest) -> Self {
        let mut headers = FxHashMap::default();
        for name in ["host", "origin", "cookie", "user-agent", "accept-language"] {
            if let Some(value) = req.header(name) {
                headers.insert(name.to_string(), value.to_string());
            }
        }
        RequestContext {
            inner: Arc::new(ContextInner {
                method: req.method(),
                path: req.path().to_string(),
                headers,
                path_params: req.path_params().clone(),
                outgoing: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.inner.method
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.inner.path_params.get(name).map(String::as_str)
    }

    /// Queue a response header to be applied when the action returns.
    pub fn add_response_header(&self, name: &str, value: &str) {
        self.inner.outgoing.lock().push((name.to_string(), value.to_string()));
    }

    /// Drain queued response headers.
    pub fn take_response_headers(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.inner.outgoing.lock())
    }

    /// Run `future` with this context installed as the current request.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_REQUEST.scope(self, future).await
    }
}

/// Error returned by [`current`] outside a request task.
#[derive(Debug, thiserror::Error)]
#[error("no request context: called outside a request task")]
pub struct NoRequestContext;

/// The current request context, or an error outside a request task.
pub fn current() -> Result<RequestContext, NoRequestContext> {
    CURRENT_REQUEST.try_with(|ctx| ctx.clone()).map_err(|_| NoRequestContext)
}

/// The current request context, or `None` outside a request task.
pub fn try_current() -> Option<RequestContext> {
    CURRENT_REQUEST.try_with(|ctx| ctx.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PeaqueRequest {
        PeaqueRequest::new(HttpMethod::Post, "/api/__rpc/m/f")
            .with_header("host", "localhost:3000")
            .with_header("cookie", "session=abc")
    }

    #[tokio::test]
    async fn context_is_visible_inside_scope() {
        let ctx = RequestContext::from_request(&request());
        ctx.scope(async {
            let current = current().unwrap();
            assert_eq!(current.path(), "/api/__rpc/m/f");
            assert_eq!(current.header("cookie"), Some("session=abc"));
            assert!(try_current().is_some());
        })
        .await;
    }

    #[tokio::test]
    async fn context_is_absent_outside_scope() {
        assert!(current().is_err());
        assert!(try_current().is_none());
    }

    #[tokio::test]
    async fn nested_tasks_do_not_inherit() {
        let ctx = RequestContext::from_request(&request());
        ctx.scope(async {
            // A spawned task is a new task: the slot does not leak into it.
            let handle = tokio::spawn(async { try_current().is_none() });
            assert!(handle.await.unwrap());
        })
        .await;
    }

    #[tokio::test]
    async fn response_headers_accumulate_and_drain() {
        let ctx = RequestContext::from_request(&request());
        let inner = ctx.clone();
        ctx.scope(async move {
            let current = current().unwrap();
            current.add_response_header("set-cookie", "a=1");
        })
        .await;
        let drained = inner.take_response_headers();
        assert_eq!(drained, vec![("set-cookie".to_string(), "a=1".to_string())]);
        assert!(inner.take_response_headers().is_empty());
    }
}
