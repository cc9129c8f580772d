//! # routix
//!
//! The dispatch core of an HTTP toolkit: route matching, middleware, pooled
//! request contexts and response caching, with no transport attached.
//!
//! ## Features
//!
//! - Segment-trie routing with `:name` parameters and `*` wildcards
//! - Onion-style middleware (logging, recovery, CORS, auth, rate limiting,
//!   timeouts, caching, compression, metrics)
//! - Pooled per-request contexts, released on every exit path
//! - Whole-response caching for GET requests
//! - Structured JSON errors
//!
//! ## Quick Start
//!
//! ```rust
//! use routix::app::Application;
//! use routix::http::Request;
//! use routix::ok_json;
//!
//! let mut app = Application::quick();
//! app.get("/users/:id", |ctx| async move {
//!     let id: u64 = ctx.param_as("id")?;
//!     ok_json!({ "id": id })
//! });
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let response = runtime.block_on(app.dispatch(Request::get("/users/7")));
//! assert_eq!(response.body_string(), r#"{"id":7}"#);
//! ```
//!
//! ## Middleware Usage
//!
//! ```rust
//! use routix::app::Application;
//! use routix::middleware::{RateLimitConfig, RateLimitStore, RateLimiter};
//!
//! let mut app = Application::new();
//! let store = RateLimitStore::new();
//! app.middleware(RateLimiter::new(store, RateLimitConfig {
//!     max_requests: 5,
//!     ..RateLimitConfig::default()
//! }));
//! ```

pub mod app;
pub mod cache;
pub mod context;
pub mod error;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod router;
pub extern crate serde_json;

// Reexport serde_json
pub use serde_json::{json, Value};

pub use app::Application;
pub use context::Context;
pub use error::{ServerError, ServerResult};
pub use http::{Method, Request, Response};
