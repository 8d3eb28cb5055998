//! Middleware chain execution.
//!
//! The chain is an explicit index-threaded walk over the middleware
//! sequence, outermost first, ending at the handler. A middleware that
//! never calls `next` short-circuits the rest of the chain.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::http::PeaqueRequest;

/// Error type surfaced out of a chain run. Middleware and handler errors
/// are caught at the outermost adapter and turned into a 500.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ChainError(pub String);

impl ChainError {
    pub fn new(message: impl Into<String>) -> Self {
        ChainError(message.into())
    }
}

/// A middleware: observe/mutate the request, decide whether to continue.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        req: &mut PeaqueRequest,
        next: &mut Next<'_>,
    ) -> Result<(), ChainError>;
}

/// Innermost request handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: &mut PeaqueRequest) -> Result<(), ChainError>;
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&mut PeaqueRequest) -> Result<(), ChainError> + Send + Sync,
{
    async fn handle(&self, req: &mut PeaqueRequest) -> Result<(), ChainError> {
        self(req)
    }
}

/// Continuation handed to each middleware. Calling [`Next::run`] advances
/// to the next middleware in the chain, or to the handler once the chain
/// is exhausted.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    index: usize,
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn run<'s>(&'s mut self, req: &'s mut PeaqueRequest) -> BoxFuture<'s, Result<(), ChainError>> {
        Box::pin(async move {
            if self.index < self.chain.len() {
                let middleware = Arc::clone(&self.chain[self.index]);
                self.index += 1;
                middleware.handle(req, self).await
            } else {
                self.handler.handle(req).await
            }
        })
    }
}

/// Run `chain` (outermost first) around `handler` for one request.
pub async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    handler: &dyn Handler,
    req: &mut PeaqueRequest,
) -> Result<(), ChainError> {
    let mut next = Next { chain, index: 0, handler };
    next.run(req).await
}
