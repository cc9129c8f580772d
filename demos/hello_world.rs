//! A minimal "Hello, World!" application using routix
//!
//! routix does not own a socket, so this example feeds a request straight to
//! the dispatcher and prints what comes back.

use routix::{Application, Request, Response};

#[tokio::main]
async fn main() {
    let mut app = Application::new();

    // Add a route that handles GET requests to "/"
    app.get("/", |_ctx| async { Response::text("Hello, World!") });

    let response = app.dispatch(Request::get("/")).await;
    println!("{} {}", response.status, response.body_string());
}
