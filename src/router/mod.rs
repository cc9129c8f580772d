//! Route registration and resolution.
//!
//! A [`Router`] keeps one [`Trie`] per HTTP method. Middleware added to a
//! router that gets mounted (or built through [`Router::group`]) is composed
//! around that router's handlers at mount time, so it only ever sees its own
//! routes. Middleware on the top-level router wraps every request.

mod files;
mod params;
mod shortcuts;
pub mod trie;

pub use files::StaticFiles;
pub use params::{Params, WILDCARD};
pub use shortcuts::RouteBuilder;
pub use trie::Trie;

use crate::context::Context;
use crate::error::{RouteError, ServerError};
use crate::handler::{BoxedHandler, Handler, HttpResponse};
use crate::http::{Method, Response};
use crate::middleware::{Middleware, MiddlewareManager};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
struct RouteEntry {
    method: Method,
    pattern: String,
    handler: BoxedHandler,
}

/// 404/405 handlers of a mounted router, answering only below its prefix.
#[derive(Clone)]
struct ScopedFallback {
    prefix: String,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
}

impl ScopedFallback {
    fn covers(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        self.prefix == "/"
            || path == self.prefix
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Outcome of looking a request up.
pub(crate) enum Resolution<'a> {
    Found(&'a BoxedHandler),
    /// The path exists, but only under these methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// RESTful handler set for [`Router::resource`].
#[derive(Default)]
pub struct Resource {
    index: Option<BoxedHandler>,
    create: Option<BoxedHandler>,
    show: Option<BoxedHandler>,
    update: Option<BoxedHandler>,
    delete: Option<BoxedHandler>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `GET /path`
    pub fn index<H: Handler>(mut self, handler: H) -> Self {
        self.index = Some(Arc::new(handler));
        self
    }

    /// `POST /path`
    pub fn create<H: Handler>(mut self, handler: H) -> Self {
        self.create = Some(Arc::new(handler));
        self
    }

    /// `GET /path/:id`
    pub fn show<H: Handler>(mut self, handler: H) -> Self {
        self.show = Some(Arc::new(handler));
        self
    }

    /// `PUT /path/:id`
    pub fn update<H: Handler>(mut self, handler: H) -> Self {
        self.update = Some(Arc::new(handler));
        self
    }

    /// `DELETE /path/:id`
    pub fn delete<H: Handler>(mut self, handler: H) -> Self {
        self.delete = Some(Arc::new(handler));
        self
    }
}

pub struct Router {
    trees: HashMap<Method, Trie<BoxedHandler>>,
    entries: Vec<RouteEntry>,
    pub(crate) middlewares: MiddlewareManager,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
    fallbacks: Vec<ScopedFallback>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            entries: Vec::new(),
            middlewares: MiddlewareManager::new(),
            not_found: None,
            method_not_allowed: None,
            fallbacks: Vec::new(),
        }
    }

    pub fn get<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::GET, path, handler)
    }

    pub fn post<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::POST, path, handler)
    }

    pub fn put<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::PUT, path, handler)
    }

    pub fn patch<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::PATCH, path, handler)
    }

    pub fn delete<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::DELETE, path, handler)
    }

    pub fn head<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::HEAD, path, handler)
    }

    pub fn options<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = HttpResponse> + Send + 'static,
    {
        self.handle(Method::OPTIONS, path, handler)
    }

    /// Registers `handler` for `method` at `pattern`.
    ///
    /// # Panics
    ///
    /// When the pattern is rejected by [`Router::try_handle`]. Routes are
    /// registered once at startup, so a bad pattern is a programming error.
    pub fn handle<H: Handler>(&mut self, method: Method, pattern: &str, handler: H) -> &mut Self {
        if let Err(err) = self.try_handle(method, pattern, handler) {
            panic!("{}", err);
        }
        self
    }

    /// Registers a route, reporting malformed or conflicting patterns.
    pub fn try_handle<H: Handler>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<(), RouteError> {
        self.insert(method, &normalize(pattern), Arc::new(handler))
    }

    fn insert(&mut self, method: Method, pattern: &str, handler: BoxedHandler) -> Result<(), RouteError> {
        let previous = self
            .trees
            .entry(method)
            .or_default()
            .insert(method, pattern, Arc::clone(&handler))?;

        if previous.is_some() {
            tracing::warn!(method = %method, pattern, "route registered twice; the later handler wins");
            self.entries.retain(|e| !(e.method == method && e.pattern == pattern));
        } else {
            tracing::debug!(method = %method, pattern, "route registered");
        }
        self.entries.push(RouteEntry {
            method,
            pattern: pattern.to_string(),
            handler,
        });
        Ok(())
    }

    /// Adds middleware to this router. The first one added runs outermost.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.add(middleware);
        self
    }

    /// Moves every route of `router` under `prefix`, wrapped in `router`'s
    /// own middleware.
    ///
    /// Custom 404/405 handlers set on `router` keep answering for paths below
    /// `prefix`; elsewhere the handlers of this router apply.
    ///
    /// # Panics
    ///
    /// When a mounted route conflicts with one already registered here.
    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        let Router {
            entries,
            middlewares,
            not_found,
            method_not_allowed,
            fallbacks,
            ..
        } = router;
        for entry in entries {
            let pattern = join(prefix, &entry.pattern);
            let handler = middlewares.wrap(entry.handler);
            if let Err(err) = self.insert(entry.method, &pattern, handler) {
                panic!("{}", err);
            }
        }

        let nested = fallbacks.into_iter().map(|fallback| ScopedFallback {
            prefix: join(prefix, &fallback.prefix),
            ..fallback
        });
        let own = ScopedFallback {
            prefix: normalize(prefix),
            not_found,
            method_not_allowed,
        };
        for fallback in nested.chain(std::iter::once(own)) {
            if fallback.not_found.is_none() && fallback.method_not_allowed.is_none() {
                continue;
            }
            tracing::debug!(prefix = %fallback.prefix, "mounted router keeps its own fallbacks");
            self.fallbacks.push(ScopedFallback {
                not_found: fallback.not_found.map(|h| middlewares.wrap(h)),
                method_not_allowed: fallback.method_not_allowed.map(|h| middlewares.wrap(h)),
                prefix: fallback.prefix,
            });
        }
        self
    }

    /// Builds a sub-router under `prefix` and mounts it.
    ///
    /// ```ignore
    /// router.group("/api", |api| {
    ///     api.middleware(Auth::new(check_token));
    ///     api.get("/me", me);
    /// });
    /// ```
    pub fn group<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        let mut group = Router::new();
        build(&mut group);
        self.mount(prefix, group)
    }

    /// Registers the RESTful routes present in `resource`.
    pub fn resource(&mut self, path: &str, resource: Resource) -> &mut Self {
        let item = join(path, "/:id");
        let routes = [
            (Method::GET, path.to_string(), resource.index),
            (Method::POST, path.to_string(), resource.create),
            (Method::GET, item.clone(), resource.show),
            (Method::PUT, item.clone(), resource.update),
            (Method::DELETE, item, resource.delete),
        ];
        for (method, pattern, handler) in routes {
            if let Some(handler) = handler {
                if let Err(err) = self.insert(method, &normalize(&pattern), handler) {
                    panic!("{}", err);
                }
            }
        }
        self
    }

    /// Serves files below `dir` at `GET prefix/*`.
    pub fn static_dir(&mut self, prefix: &str, dir: impl Into<PathBuf>) -> &mut Self {
        let pattern = join(prefix, "/*");
        self.handle(Method::GET, &pattern, StaticFiles::new(dir))
    }

    /// Handler for paths no route matches. Defaults to a JSON 404.
    pub fn not_found<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Handler for paths registered only under other methods. Defaults to a
    /// JSON 405 with an `Allow` header; [`Context::allowed_methods`] lists
    /// the methods that would have matched.
    pub fn method_not_allowed<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.method_not_allowed = Some(Arc::new(handler));
        self
    }

    /// Registered `(method, pattern)` pairs in registration order.
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.entries
            .iter()
            .map(|e| (e.method, e.pattern.clone()))
            .collect()
    }

    pub(crate) fn resolve(&self, method: Method, path: &str, params: &mut Params) -> Resolution<'_> {
        if let Some(handler) = self.lookup(method, path, params) {
            return Resolution::Found(handler);
        }
        if method == Method::HEAD {
            if let Some(handler) = self.lookup(Method::GET, path, params) {
                return Resolution::Found(handler);
            }
        }

        let mut allowed: Vec<Method> = self
            .trees
            .iter()
            .filter(|(m, tree)| **m != method && tree.matches(**m, path))
            .map(|(m, _)| *m)
            .collect();
        if allowed.is_empty() {
            return Resolution::NotFound;
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort();
        Resolution::MethodNotAllowed(allowed)
    }

    fn lookup(&self, method: Method, path: &str, params: &mut Params) -> Option<&BoxedHandler> {
        self.trees.get(&method)?.resolve(method, path, params)
    }

    // The mounted fallback with the longest prefix covering `path` wins.
    fn scoped<'a>(
        &'a self,
        path: &str,
        pick: impl Fn(&'a ScopedFallback) -> Option<&'a BoxedHandler>,
    ) -> Option<&'a BoxedHandler> {
        self.fallbacks
            .iter()
            .filter(|fallback| fallback.covers(path))
            .filter_map(|fallback| pick(fallback).map(|handler| (fallback.prefix.len(), handler)))
            .max_by_key(|(len, _)| *len)
            .map(|(_, handler)| handler)
    }

    pub(crate) fn not_found_handler(&self, path: &str) -> BoxedHandler {
        let scoped = self.scoped(path, |f| f.not_found.as_ref());
        match scoped.or(self.not_found.as_ref()) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(|_ctx: Context| async { Err::<Response, _>(ServerError::NotFound) }),
        }
    }

    pub(crate) fn method_not_allowed_handler(&self, path: &str) -> BoxedHandler {
        let scoped = self.scoped(path, |f| f.method_not_allowed.as_ref());
        match scoped.or(self.method_not_allowed.as_ref()) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(|ctx: Context| async move {
                Ok::<_, ServerError>(Response::method_not_allowed(ctx.allowed_methods()))
            }),
        }
    }
}

// Route patterns are stored with a leading slash and no trailing one.
fn normalize(pattern: &str) -> String {
    let trimmed = pattern.trim_matches('/');
    format!("/{}", trimmed)
}

fn join(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let pattern = pattern.trim_matches('/');
    match (prefix.is_empty(), pattern.is_empty()) {
        (true, _) => format!("/{}", pattern),
        (false, true) => format!("/{}", prefix),
        (false, false) => format!("/{}/{}", prefix, pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    fn text(body: &'static str) -> impl Handler {
        move |_ctx: Context| async move { Response::text(body) }
    }

    async fn call(router: &Router, method: Method, path: &str) -> Option<String> {
        let mut params = Params::new();
        match router.resolve(method, path, &mut params) {
            Resolution::Found(handler) => {
                let ctx = Context::detached(Request::new(method, path));
                Some(handler.call(ctx).await.unwrap().body_string())
            }
            _ => None,
        }
    }

    #[test]
    fn joins_prefixes() {
        assert_eq!(join("/api/", "/users"), "/api/users");
        assert_eq!(join("", "users"), "/users");
        assert_eq!(join("/api", "/"), "/api");
        assert_eq!(normalize("users/:id/"), "/users/:id");
    }

    #[tokio::test]
    async fn other_methods_produce_method_not_allowed() {
        let mut router = Router::new();
        router.handle(Method::GET, "/users", text("list"));
        router.handle(Method::POST, "/users", text("create"));

        let mut params = Params::new();
        match router.resolve(Method::DELETE, "/users", &mut params) {
            Resolution::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![Method::GET, Method::POST, Method::HEAD]);
            }
            _ => panic!("expected 405"),
        }
        assert!(matches!(
            router.resolve(Method::GET, "/nobody", &mut params),
            Resolution::NotFound
        ));
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let mut router = Router::new();
        router.handle(Method::GET, "/ping", text("pong"));
        assert_eq!(call(&router, Method::HEAD, "/ping").await.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn groups_and_resources_register_prefixed_routes() {
        let mut router = Router::new();
        router.group("/api/v1", |api| {
            api.handle(Method::GET, "/status", text("ok"));
            api.resource(
                "/posts",
                Resource::new().index(text("index")).show(text("show")).delete(text("delete")),
            );
        });

        assert_eq!(
            router.routes(),
            vec![
                (Method::GET, "/api/v1/status".to_string()),
                (Method::GET, "/api/v1/posts".to_string()),
                (Method::GET, "/api/v1/posts/:id".to_string()),
                (Method::DELETE, "/api/v1/posts/:id".to_string()),
            ]
        );
        assert_eq!(call(&router, Method::GET, "/api/v1/posts/3").await.as_deref(), Some("show"));
        assert!(call(&router, Method::POST, "/api/v1/posts").await.is_none());
    }

    #[test]
    fn conflicting_parameters_are_reported() {
        let mut router = Router::new();
        router.try_handle(Method::GET, "/users/:id", text("a")).unwrap();
        assert!(router.try_handle(Method::GET, "/users/:name/posts", text("b")).is_err());
        // Each method has its own tree.
        assert!(router.try_handle(Method::PUT, "/users/:name", text("c")).is_ok());
    }

    #[tokio::test]
    async fn mounted_fallbacks_answer_below_their_prefix() {
        let mut admin = Router::new();
        admin.get("/dashboard", |_ctx| async { Response::text("dash") });
        admin.not_found(text("admin 404"));
        let mut reports = Router::new();
        reports.not_found(text("reports 404"));
        admin.mount("/reports", reports);

        let mut root = Router::new();
        root.not_found(text("site 404"));
        root.mount("/admin", admin);

        let answer = |path: &str| {
            let handler = root.not_found_handler(path);
            let ctx = Context::detached(Request::get(path));
            async move { handler.call(ctx).await.unwrap().body_string() }
        };
        assert_eq!(answer("/admin/nope").await, "admin 404");
        assert_eq!(answer("/admin").await, "admin 404");
        assert_eq!(answer("/admin/reports/x/y").await, "reports 404");
        assert_eq!(answer("/administrator").await, "site 404");
        assert_eq!(answer("/elsewhere").await, "site 404");

        let handler = root.method_not_allowed_handler("/admin/dashboard");
        let response = handler.call(Context::detached(Request::post("/admin/dashboard"))).await.unwrap();
        assert_eq!(response.status, 405);
    }

    #[tokio::test]
    async fn reregistering_replaces_the_handler() {
        let mut router = Router::new();
        router.handle(Method::GET, "/a", text("first"));
        router.handle(Method::GET, "/a/", text("second"));
        assert_eq!(router.routes().len(), 1);
        assert_eq!(call(&router, Method::GET, "/a").await.as_deref(), Some("second"));
    }
}
