use crate::cache::ResponseCache;
use crate::context::Context;
use crate::http::Method;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use std::time::Duration;

/// Serves repeated GET requests from a [`ResponseCache`].
///
/// On a miss the rest of the chain runs once and its response is stored for
/// `ttl`, but only if it succeeded. Concurrent misses on one URL wait for the
/// first to finish and are then served its copy. Responses are stored per
/// value of the request headers they name in `Vary`, so place this before
/// middleware that negotiates on request headers. Other methods pass straight
/// through.
#[derive(Clone)]
pub struct ResponseCaching {
    cache: ResponseCache,
    ttl: Duration,
}

impl ResponseCaching {
    pub fn new(cache: ResponseCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }
}

impl Middleware for ResponseCaching {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let cache = self.cache.clone();
        let ttl = self.ttl;
        Box::pin(async move {
            if ctx.method() != Method::GET {
                return next.handle(ctx).await;
            }

            let url = ctx.url();
            if let Some(entry) = cache.lookup(&url, ctx.headers()).await {
                tracing::debug!(url = %url, "response cache hit");
                return Ok(entry.to_response());
            }

            let _fill = cache.fill_guard(&url).await;
            if let Some(entry) = cache.lookup(&url, ctx.headers()).await {
                tracing::debug!(url = %url, "response cache filled while waiting");
                return Ok(entry.to_response());
            }

            let headers = ctx.headers().clone();
            let response = next.handle(ctx).await?;
            if !cache.store(&url, &headers, &response, ttl).await {
                tracing::debug!(url = %url, "response varies on every request, not cached");
            }
            Ok(response)
        })
    }
}
