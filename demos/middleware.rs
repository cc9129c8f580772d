//! Middleware example for routix
//!
//! This example demonstrates:
//! - A hand-written timing middleware
//! - Authentication on a mounted router
//! - Rate limiting and response caching shortcuts

use routix::middleware::{Cors, Logger, Middleware, MiddlewareResult, Next};
use routix::router::Router;
use routix::{ok_json, Application, Context, Request, Response};
use std::time::{Duration, Instant};

// Prints how long each request took
struct Timing;

impl Middleware for Timing {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        Box::pin(async move {
            let start = Instant::now();
            let label = format!("{} {}", ctx.method(), ctx.url());
            let result = next.handle(ctx).await;
            let status = match &result {
                Ok(response) => response.status,
                Err(err) => err.status_code(),
            };
            println!("[{}] {} - {}us", status, label, start.elapsed().as_micros());
            result
        })
    }
}

#[tokio::main]
async fn main() {
    let mut app = Application::new();
    app.middleware(Timing).middleware(Logger).middleware(Cors::default());

    app.get("/", |_ctx| async { Response::text("public") });

    let mut admin = Router::new();
    admin.with_auth(|token| token == "secret-token");
    admin.get("/stats", |ctx| async move {
        ok_json!({ "token": ctx.data("auth_token") })
    });
    app.mount("/admin", admin);

    app.group("/expensive", |expensive| {
        expensive
            .with_rate_limit(3, Duration::from_secs(60))
            .with_cache(Duration::from_secs(30));
        expensive.get("/report", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Response::text("expensive report")
        });
    });

    let requests = vec![
        Request::get("/"),
        Request::get("/admin/stats"),
        Request::get("/admin/stats").header("Authorization", "Bearer secret-token"),
        Request::get("/expensive/report"),
        Request::get("/expensive/report"),
        Request::get("/expensive/report"),
        Request::get("/expensive/report"),
    ];
    for request in requests {
        let response = app.dispatch(request).await;
        println!("  -> {}", response.body_string());
    }
}
