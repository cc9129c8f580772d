//! Fluent registration helpers layered over [`Router`].
//!
//! ```ignore
//! router.route(Method::GET, "/health").json(json!({ "ok": true }));
//! router.route(Method::GET, "/old").redirect("/new");
//! router.api("/api", |api| {
//!     api.with_auth(check_token).with_timeout(Duration::from_secs(5));
//!     api.get("/me", me);
//! });
//! ```

use super::Router;
use crate::cache::ResponseCache;
use crate::context::Context;
use crate::error::ServerError;
use crate::handler::Handler;
use crate::http::{Method, Response};
use crate::middleware::{
    Auth, Next, RateLimitConfig, RateLimitStore, RateLimiter, ResponseCaching, Timeout,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A pending route; finish it with a handler or one of the canned answers.
pub struct RouteBuilder<'r> {
    router: &'r mut Router,
    method: Method,
    pattern: String,
}

impl<'r> RouteBuilder<'r> {
    pub fn handle<H: Handler>(self, handler: H) -> &'r mut Router {
        self.router.handle(self.method, &self.pattern, handler)
    }

    /// Answers 200 with `value` as the JSON body.
    pub fn json(self, value: Value) -> &'r mut Router {
        let value = Arc::new(value);
        self.handle(move |_ctx: Context| {
            let value = Arc::clone(&value);
            async move { Response::ok(&*value) }
        })
    }

    pub fn text(self, body: impl Into<String>) -> &'r mut Router {
        let body: Arc<str> = Arc::from(body.into());
        self.handle(move |_ctx: Context| {
            let body = Arc::clone(&body);
            async move { Response::text(&*body) }
        })
    }

    /// Answers 302 pointing at `location`.
    pub fn redirect(self, location: impl Into<String>) -> &'r mut Router {
        let location: Arc<str> = Arc::from(location.into());
        self.handle(move |_ctx: Context| {
            let location = Arc::clone(&location);
            async move { Ok::<_, ServerError>(Response::redirect(&location)) }
        })
    }
}

impl Router {
    pub fn route(&mut self, method: Method, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder {
            router: self,
            method,
            pattern: pattern.to_string(),
        }
    }

    /// A group whose responses default to `Content-Type: application/json`.
    pub fn api<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        self.group(prefix, |api| {
            api.middleware(|ctx: Context, next: Next| async move {
                let mut response = next.handle(ctx).await?;
                if response.get_header("content-type").is_none() {
                    response.header("Content-Type", "application/json");
                }
                Ok::<_, ServerError>(response)
            });
            build(api);
        })
    }

    pub fn with_auth<F>(&mut self, validate: F) -> &mut Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.middleware(Auth::new(validate))
    }

    /// Limits each client to `max_requests` per `window`, with a store of
    /// its own.
    pub fn with_rate_limit(&mut self, max_requests: usize, window: Duration) -> &mut Self {
        let config = RateLimitConfig {
            max_requests,
            window_secs: window.as_secs().max(1),
            ..RateLimitConfig::default()
        };
        self.middleware(RateLimiter::new(RateLimitStore::new(), config))
    }

    /// Caches successful GET responses for `ttl` in a cache of its own.
    pub fn with_cache(&mut self, ttl: Duration) -> &mut Self {
        self.middleware(ResponseCaching::new(ResponseCache::default(), ttl))
    }

    pub fn with_timeout(&mut self, limit: Duration) -> &mut Self {
        self.middleware(Timeout::new(limit))
    }
}
