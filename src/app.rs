//! Application is the main entry point for routix.
//!
//! An [`Application`] owns the route table, the global middleware chain, the
//! context pool and an optional response cache, and turns one [`Request`]
//! into one [`Response`] through [`Application::dispatch`]. Accepting
//! connections and speaking HTTP on the wire is left to the host server.
//!
//! # Examples
//!
//! ```rust
//! use routix::app::Application;
//! use routix::ok_json;
//!
//! let mut app = Application::new();
//! app.get("/", |_ctx| async {
//!     ok_json!({ "message": "Hello!" })
//! });
//! ```

use crate::cache::ResponseCache;
use crate::context::{Context, ContextPool, PoolConfig, PoolStats};
use crate::error::{RouteError, ServerError};
use crate::handler::{BoxedHandler, Handler, HttpResponse};
use crate::http::{Method, Request, Response};
use crate::middleware::{Cors, Logger, Middleware, Recovery};
use crate::router::{Resolution, Resource, RouteBuilder, Router};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

type ErrorHandler = Arc<dyn Fn(ServerError) -> Response + Send + Sync>;

/// The dispatcher: everything needed to answer a request.
///
/// # Example
///
/// ```rust
/// use routix::app::Application;
/// use routix::http::{Request, Response};
///
/// let mut app = Application::new();
/// app.get("/greet/:name", |ctx| async move {
///     Response::text(format!("hello, {}", ctx.param("name").unwrap_or("stranger")))
/// });
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let response = runtime.block_on(app.dispatch(Request::get("/greet/Ada")));
/// assert_eq!(response.body_string(), "hello, Ada");
/// ```
pub struct Application {
    router: Router,
    pool: ContextPool,
    cache: Option<ResponseCache>,
    on_error: Option<ErrorHandler>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    /// Creates a new Application instance
    pub fn new() -> Self {
        Self::with_pool(PoolConfig::default())
    }

    pub fn with_pool(config: PoolConfig) -> Self {
        Self {
            router: Router::new(),
            pool: ContextPool::new(config),
            cache: None,
            on_error: None,
        }
    }

    /// An application preloaded with request logging, panic recovery and
    /// permissive CORS.
    pub fn quick() -> Self {
        let mut app = Self::new();
        app.middleware(Logger).middleware(Recovery).middleware(Cors::default());
        app
    }

    /// Enables whole-response caching for GET handlers that opt in with
    /// [`Response::cache_for`]. Hits skip routing and every middleware.
    pub fn cache(&mut self, cache: ResponseCache) -> &mut Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the default JSON error body.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ServerError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn get<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.get(path, handler);
        self
    }

    pub fn post<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.post(path, handler);
        self
    }

    pub fn put<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.put(path, handler);
        self
    }

    pub fn patch<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.patch(path, handler);
        self
    }

    pub fn delete<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.delete(path, handler);
        self
    }

    pub fn head<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.head(path, handler);
        self
    }

    pub fn options<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.router.options(path, handler);
        self
    }

    pub fn handle<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.router.handle(method, path, handler);
        self
    }

    pub fn try_handle<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> Result<(), RouteError> {
        self.router.try_handle(method, path, handler)
    }

    /// Adds a middleware that wraps every request, including 404 and 405
    /// answers. The first one added runs outermost.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.router.middleware(middleware);
        self
    }

    /// Mounts a router at a specific path
    pub fn mount(&mut self, path: &str, router: Router) -> &mut Self {
        self.router.mount(path, router);
        self
    }

    pub fn group<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        self.router.group(prefix, build);
        self
    }

    pub fn resource(&mut self, path: &str, resource: Resource) -> &mut Self {
        self.router.resource(path, resource);
        self
    }

    /// Serves the files under `dir` at `prefix/...`.
    pub fn static_dir(&mut self, prefix: &str, dir: impl Into<PathBuf>) -> &mut Self {
        self.router.static_dir(prefix, dir);
        self
    }

    pub fn not_found<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.router.not_found(handler);
        self
    }

    pub fn method_not_allowed<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.router.method_not_allowed(handler);
        self
    }

    /// Starts a fluent route definition; see [`RouteBuilder`].
    pub fn route(&mut self, method: Method, path: &str) -> RouteBuilder<'_> {
        self.router.route(method, path)
    }

    /// A group whose responses default to `Content-Type: application/json`.
    pub fn api<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        self.router.api(prefix, build);
        self
    }

    pub fn with_auth<F>(&mut self, validate: F) -> &mut Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.router.with_auth(validate);
        self
    }

    pub fn with_rate_limit(&mut self, max_requests: usize, window: Duration) -> &mut Self {
        self.router.with_rate_limit(max_requests, window);
        self
    }

    pub fn with_cache(&mut self, ttl: Duration) -> &mut Self {
        self.router.with_cache(ttl);
        self
    }

    pub fn with_timeout(&mut self, limit: Duration) -> &mut Self {
        self.router.with_timeout(limit);
        self
    }

    pub fn routes(&self) -> Vec<(Method, String)> {
        self.router.routes()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Runs `req` through cache, routing, middleware and the error boundary.
    ///
    /// Never fails: handler errors and panics come back as error responses.
    pub async fn dispatch(&self, req: Request) -> Response {
        let method = req.method;
        let result = AssertUnwindSafe(self.run(req))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = crate::middleware::panic_message(payload.as_ref());
                Err(ServerError::Panic(message))
            });

        let mut response = match result {
            Ok(response) => response,
            Err(err) => self.handle_error(err),
        };
        if method == Method::HEAD {
            response.body.clear();
        }
        response.cache_ttl = None;
        response
    }

    async fn run(&self, req: Request) -> HttpResponse {
        let cache = match (&self.cache, req.method) {
            (Some(cache), Method::GET) => Some(cache),
            _ => None,
        };
        let mut fill = None;
        let mut cache_key = None;
        if let Some(cache) = cache {
            let url = req.url();
            if let Some(entry) = cache.lookup(&url, &req.headers).await {
                tracing::debug!(url = %url, "served from response cache");
                return Ok(entry.to_response());
            }
            // only URLs whose handler opted in before are worth waiting on
            if cache.knows(&url).await {
                fill = Some(cache.fill_guard(&url).await);
                if let Some(entry) = cache.lookup(&url, &req.headers).await {
                    return Ok(entry.to_response());
                }
            }
            cache_key = Some((url, req.headers.clone()));
        }

        let mut ctx = self.pool.acquire(req);
        let (endpoint, allowed) = self.endpoint(&mut ctx);
        if let Some(allowed) = allowed {
            ctx.set_allowed_methods(allowed);
        }

        let response = self.router.middlewares.next(endpoint).handle(ctx).await?;

        if let (Some(cache), Some((url, headers)), Some(ttl)) = (cache, cache_key, response.cache_ttl) {
            cache.store(&url, &headers, &response, ttl).await;
        }
        drop(fill);
        Ok(response)
    }

    fn endpoint(&self, ctx: &mut Context) -> (BoxedHandler, Option<Vec<Method>>) {
        let method = ctx.method();
        let (path, params) = ctx.route_parts();
        match self.router.resolve(method, path, params) {
            Resolution::Found(handler) => (Arc::clone(handler), None),
            Resolution::MethodNotAllowed(allowed) => {
                tracing::debug!(method = %method, path, "method not allowed");
                (self.router.method_not_allowed_handler(path), Some(allowed))
            }
            Resolution::NotFound => {
                tracing::debug!(method = %method, path, "no route matched");
                (self.router.not_found_handler(path), None)
            }
        }
    }

    fn handle_error(&self, error: ServerError) -> Response {
        if !error.is_structured() {
            tracing::error!(error = %error, "request failed with an internal error");
        }
        match &self.on_error {
            Some(handler) => handler(error),
            None => Response::error(&error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use serde_json::Value;

    #[tokio::test]
    async fn head_requests_get_headers_without_a_body() {
        let mut app = Application::new();
        app.get("/doc", |_ctx| async { Response::text("full body") });

        let response = app.dispatch(Request::new(Method::HEAD, "/doc")).await;
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert_eq!(response.get_header("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[tokio::test]
    async fn unstructured_errors_hide_details() {
        let mut app = Application::new();
        app.get("/io", |_ctx| async {
            Err::<Response, _>(ServerError::from(std::io::Error::new(
                std::io::ErrorKind::Other,
                "secret path /etc/shadow",
            )))
        });

        let response = app.dispatch(Request::get("/io")).await;
        assert_eq!(response.status, 500);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, serde_json::json!({ "code": 500, "message": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn custom_error_boundary_is_used() {
        let mut app = Application::new();
        app.on_error(|err| {
            let mut response = Response::new(err.status_code());
            response.body(format!("oops: {}", err.status_code()));
            response
        });

        let response = app.dispatch(Request::get("/missing")).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body_string(), "oops: 404");
    }

    #[tokio::test]
    async fn router_level_cache_short_circuits_routing() {
        let mut app = Application::new();
        app.cache(ResponseCache::new(CacheConfig { max_entries: 16 }));
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        app.get("/news", move |_ctx| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                let mut response = Response::text(format!("edition {}", n))?;
                response.cache_for(Duration::from_secs(60));
                Ok(response)
            }
        });

        let first = app.dispatch(Request::get("/news")).await;
        let second = app.dispatch(Request::get("/news")).await;
        assert_eq!(first, second);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(app.pool_stats().created, 1);
    }

    #[tokio::test]
    async fn cached_cors_headers_follow_the_requesting_origin() {
        let mut app = Application::new();
        app.cache(ResponseCache::default()).middleware(Cors::default());
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        app.get("/feed", move |_ctx| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                let mut response = Response::text("items")?;
                response.cache_for(Duration::from_secs(60));
                Ok(response)
            }
        });

        let from = |origin: &str| Request::get("/feed").header("Origin", origin);
        let a = app.dispatch(from("https://a.example")).await;
        let b = app.dispatch(from("https://b.example")).await;
        let a_again = app.dispatch(from("https://a.example")).await;

        assert_eq!(a.get_header("Access-Control-Allow-Origin"), Some("https://a.example"));
        assert_eq!(b.get_header("Access-Control-Allow-Origin"), Some("https://b.example"));
        assert_eq!(a_again, a);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
