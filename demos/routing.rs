//! Routing example for routix
//!
//! Covers path parameters, wildcards, groups, RESTful resources, the fluent
//! route builder and the success/paginated response envelope.

use routix::router::Resource;
use routix::{json, ok_json, Application, Context, Method, Request, Response};

#[tokio::main]
async fn main() {
    let mut app = Application::new();

    app.get("/users/:id", |ctx| async move {
        let id: u64 = ctx.param_as("id")?;
        Response::success(&json!({ "id": id, "name": format!("user {}", id) }))
    });

    app.get("/files/*", |ctx| async move {
        Response::text(format!("file: {}", ctx.wildcard().unwrap_or_default()))
    });

    app.group("/api/v1", |v1| {
        v1.get("/status", |_ctx| async { ok_json!({ "status": "ok" }) });
        v1.get("/posts", |ctx| async move {
            let page: u32 = ctx.query_as("page").unwrap_or(1);
            Response::paginated(&vec![format!("post {}", page * 10)], page, 5)
        });
        v1.resource(
            "/comments",
            Resource::new()
                .index(|_ctx: Context| async { ok_json!([]) })
                .show(|ctx: Context| async move {
                    ok_json!({ "comment": ctx.param("id") })
                }),
        );
    });

    app.route(Method::GET, "/health")
        .json(json!({ "healthy": true }))
        .route(Method::GET, "/docs")
        .redirect("/api/v1/status");

    for (method, pattern) in app.routes() {
        println!("{:<7} {}", method, pattern);
    }
    println!();

    for target in [
        "/users/42",
        "/users/abc",
        "/files/css/site.css",
        "/api/v1/status",
        "/api/v1/posts?page=2",
        "/api/v1/comments/7",
        "/health",
        "/docs",
        "/nowhere",
    ] {
        let response = app.dispatch(Request::get(target)).await;
        println!("GET {} -> {} {}", target, response.status, response.body_string());
    }

    let response = app.dispatch(Request::new(Method::DELETE, "/health")).await;
    println!(
        "DELETE /health -> {} (Allow: {})",
        response.status,
        response.get_header("Allow").unwrap_or_default()
    );
}
