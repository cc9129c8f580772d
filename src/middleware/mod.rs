//! Onion-style middleware.
//!
//! A middleware receives the request context together with [`Next`], the rest
//! of the pipeline. It may touch the context and call `next.handle(ctx)`, skip
//! `next` entirely to answer on its own, or inspect and rewrite the response
//! that `next` produced. For a chain `[A, B]` around handler `H` the call order
//! is `A → B → H → B → A`.

mod auth;
mod cache;
mod compression;
mod cors;
mod logger;
mod metrics;
mod rate_limit;
mod recovery;
mod timeout;

pub use auth::{Auth, AUTH_TOKEN_KEY};
pub use cache::ResponseCaching;
pub use compression::{Compression, CompressionConfig};
pub use cors::{Cors, CorsConfig};
pub use logger::Logger;
pub use metrics::{Metrics, MetricsSnapshot, PerformanceMonitor};
pub use rate_limit::{RateLimitConfig, RateLimitStore, RateLimiter};
pub use recovery::Recovery;
pub(crate) use recovery::panic_message;
pub use timeout::Timeout;

use crate::context::Context;
use crate::handler::{BoxedHandler, Handler, HandlerFuture, HttpResponse};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub type MiddlewareResult = BoxFuture<'static, HttpResponse>;

pub trait Middleware: Send + Sync + 'static {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult;
}

impl<F, R> Middleware for F
where
    F: Fn(Context, Next) -> R + Send + Sync + 'static,
    R: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        Box::pin((self)(ctx, next))
    }
}

type MiddlewareList = Arc<[Arc<dyn Middleware>]>;

/// The remainder of the pipeline as seen from one middleware.
///
/// Walking the chain only moves an index forward, so running a request
/// through `n` middleware allocates nothing beyond the futures themselves.
#[derive(Clone)]
pub struct Next {
    chain: MiddlewareList,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(chain: MiddlewareList, endpoint: BoxedHandler) -> Self {
        Self {
            chain,
            index: 0,
            endpoint,
        }
    }

    /// A `Next` that goes straight to `handler`.
    pub fn handler<H: Handler>(handler: H) -> Self {
        Self::new(Arc::from(Vec::new()), Arc::new(handler))
    }

    pub fn handle(&self, ctx: Context) -> HandlerFuture {
        match self.chain.get(self.index) {
            Some(middleware) => {
                let next = Next {
                    chain: Arc::clone(&self.chain),
                    index: self.index + 1,
                    endpoint: Arc::clone(&self.endpoint),
                };
                middleware.call(ctx, next)
            }
            None => self.endpoint.call(ctx),
        }
    }
}

/// A handler wrapped in its own middleware, usable wherever a handler is.
///
/// ```ignore
/// router.handle(Method::GET, "/admin", Chain::new(admin_page).with(Auth::new(check)));
/// ```
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
    endpoint: BoxedHandler,
    next: Next,
}

impl Chain {
    pub fn new<H: Handler>(handler: H) -> Self {
        Self::from_parts(Vec::new(), Arc::new(handler))
    }

    /// Adds a layer inside the ones already present.
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        Self::from_parts(self.middlewares, self.endpoint)
    }

    fn from_parts(middlewares: Vec<Arc<dyn Middleware>>, endpoint: BoxedHandler) -> Self {
        let next = Next::new(Arc::from(middlewares.clone()), Arc::clone(&endpoint));
        Self {
            middlewares,
            endpoint,
            next,
        }
    }
}

impl Handler for Chain {
    fn call(&self, ctx: Context) -> HandlerFuture {
        self.next.handle(ctx)
    }
}

/// Ordered middleware attached to a router; the first added runs outermost.
#[derive(Clone)]
pub(crate) struct MiddlewareManager {
    middlewares: MiddlewareList,
}

impl MiddlewareManager {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::from(Vec::new()),
        }
    }

    pub fn add<M: Middleware>(&mut self, middleware: M) {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(Arc::new(middleware));
        self.middlewares = Arc::from(middlewares);
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Starts a pass through the chain that ends at `endpoint`.
    pub fn next(&self, endpoint: BoxedHandler) -> Next {
        Next::new(Arc::clone(&self.middlewares), endpoint)
    }

    /// Precomposes the chain around `endpoint` into a single handler.
    pub fn wrap(&self, endpoint: BoxedHandler) -> BoxedHandler {
        if self.is_empty() {
            return endpoint;
        }
        Arc::new(Chain::from_parts(self.middlewares.to_vec(), endpoint))
    }
}
