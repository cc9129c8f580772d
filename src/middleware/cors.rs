use crate::context::Context;
use crate::http::{Method, Response};
use crate::middleware::{Middleware, MiddlewareResult, Next};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allow_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            allow_credentials: false,
            max_age: Some(86400),
        }
    }
}

impl CorsConfig {
    fn allows(&self, origin: &str) -> bool {
        self.allow_origins.iter().any(|o| o == "*" || o == origin)
    }

    fn decorate(&self, response: &mut Response, origin: Option<&str>) {
        // whether the origin is echoed depends on the request's Origin
        response.add_vary("Origin");
        if let Some(origin) = origin.filter(|o| self.allows(o)) {
            response.header("Access-Control-Allow-Origin", origin);
        }
        if self.allow_credentials {
            response.header("Access-Control-Allow-Credentials", "true");
        }
    }
}

/// Answers preflight `OPTIONS` requests itself and tags every other response
/// with the allowed origin.
#[derive(Clone)]
pub struct Cors {
    config: Arc<CorsConfig>,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(CorsConfig::default())
    }
}

impl Middleware for Cors {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let config = Arc::clone(&self.config);
        Box::pin(async move {
            let origin = ctx.header("origin").map(str::to_string);

            if ctx.method() == Method::OPTIONS {
                let mut response = Response::new(204);
                config.decorate(&mut response, origin.as_deref());
                response.header("Access-Control-Allow-Methods", config.allow_methods.join(", "));
                response.header("Access-Control-Allow-Headers", config.allow_headers.join(", "));
                if let Some(max_age) = config.max_age {
                    response.header("Access-Control-Max-Age", max_age.to_string());
                }
                return Ok(response);
            }

            let mut response = next.handle(ctx).await?;
            config.decorate(&mut response, origin.as_deref());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn preflight_is_answered_without_calling_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let next = Next::handler(move |_ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Response::text("handler") }
        });

        let req = Request::new(Method::OPTIONS, "/api").header("Origin", "https://app.example");
        let response = Cors::default().call(Context::detached(req), next).await.unwrap();

        assert_eq!(response.status, 204);
        assert_eq!(response.get_header("Access-Control-Allow-Origin"), Some("https://app.example"));
        assert!(response.get_header("Access-Control-Allow-Methods").unwrap().contains("PATCH"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_origins_are_not_echoed() {
        let cors = Cors::new(CorsConfig {
            allow_origins: vec!["https://trusted.example".into()],
            ..CorsConfig::default()
        });
        let req = Request::get("/api").header("Origin", "https://evil.example");
        let response = cors
            .call(
                Context::detached(req),
                Next::handler(|_ctx: Context| async { Response::text("ok") }),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.get_header("Access-Control-Allow-Origin").is_none());
        assert_eq!(response.get_header("Vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn existing_vary_is_extended() {
        let req = Request::get("/api").header("Origin", "https://app.example");
        let response = Cors::default()
            .call(
                Context::detached(req),
                Next::handler(|_ctx: Context| async {
                    let mut response = Response::text("ok")?;
                    response.header("Vary", "Accept-Language");
                    Ok(response)
                }),
            )
            .await
            .unwrap();
        assert_eq!(response.get_header("Vary"), Some("Accept-Language, Origin"));
    }
}
