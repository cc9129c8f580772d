//! Per-request state threaded through middleware and handlers.
//!
//! A [`Context`] owns everything the pipeline knows about one request: the
//! request line and headers, captured path parameters, the decoded query
//! string, the body and a small data bag middleware can use to pass values
//! inward. Contexts normally come from a [`ContextPool`]; dropping one hands its
//! state back to the pool, so release happens exactly once on every exit path.

mod pool;

pub use pool::{ContextPool, PoolConfig, PoolStats};

use crate::error::{ServerError, ServerResult};
use crate::http::request::parse_urlencoded_into;
use crate::http::{Body, Method, Request};
use crate::router::Params;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

pub(crate) struct ContextState {
    method: Method,
    path: String,
    raw_query: String,
    headers: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    params: Params,
    query: HashMap<String, String>,
    body: Body,
    body_value: Option<Value>,
    data: HashMap<String, Value>,
    allowed: Vec<Method>,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: String::new(),
            raw_query: String::new(),
            headers: HashMap::new(),
            remote_addr: None,
            params: Params::new(),
            query: HashMap::new(),
            body: Body::new(),
            body_value: None,
            data: HashMap::new(),
            allowed: Vec::new(),
        }
    }
}

impl ContextState {
    // Every field is overwritten; nothing from a previous request survives.
    fn populate(&mut self, req: Request) {
        let Request {
            method,
            path,
            query,
            headers,
            body,
            remote_addr,
        } = req;

        self.method = method;
        self.path = path;
        self.raw_query = query;
        self.headers = headers;
        self.remote_addr = remote_addr;
        self.params.clear();
        self.query.clear();
        parse_urlencoded_into(&self.raw_query, &mut self.query);
        self.body_value = body.parse_value();
        self.body = body;
        self.data.clear();
        self.allowed.clear();
    }

    // Maps keep their capacity; request-owned buffers are dropped.
    fn reset(&mut self) {
        self.method = Method::GET;
        self.path = String::new();
        self.raw_query = String::new();
        self.headers.clear();
        self.remote_addr = None;
        self.params.clear();
        self.query.clear();
        self.body = Body::new();
        self.body_value = None;
        self.data.clear();
        self.allowed.clear();
    }
}

pub struct Context {
    state: ContextState,
    pool: Option<ContextPool>,
}

impl Context {
    /// A context that is not tied to any pool.
    pub fn detached(req: Request) -> Context {
        let mut state = ContextState::default();
        state.populate(req);
        Context { state, pool: None }
    }

    pub fn method(&self) -> Method {
        self.state.method
    }

    pub fn path(&self) -> &str {
        &self.state.path
    }

    pub fn raw_query(&self) -> &str {
        &self.state.raw_query
    }

    /// Path plus raw query string.
    pub fn url(&self) -> String {
        if self.state.raw_query.is_empty() {
            self.state.path.clone()
        } else {
            format!("{}?{}", self.state.path, self.state.raw_query)
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        match self.state.headers.get(name) {
            Some(v) => Some(v.as_str()),
            None => self.state.headers.get(&name.to_lowercase()).map(String::as_str),
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.state.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.remote_addr
    }

    pub fn params(&self) -> &Params {
        &self.state.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.state.params.get(name)
    }

    /// Parses a path parameter, answering 400 when it is missing or malformed.
    pub fn param_as<T: FromStr>(&self, name: &str) -> ServerResult<T> {
        let raw = self
            .param(name)
            .ok_or_else(|| ServerError::BadRequest(format!("missing path parameter `{}`", name)))?;
        raw.parse()
            .map_err(|_| ServerError::BadRequest(format!("invalid path parameter `{}`", name)))
    }

    pub fn wildcard(&self) -> Option<&str> {
        self.state.params.wildcard()
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.state.query.get(name).map(String::as_str)
    }

    pub fn query_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.query(name) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    pub fn query_as<T: FromStr>(&self, name: &str) -> ServerResult<T> {
        let raw = self
            .query(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServerError::BadRequest(format!("missing query parameter `{}`", name)))?;
        raw.parse()
            .map_err(|_| ServerError::BadRequest(format!("invalid query parameter `{}`", name)))
    }

    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.state.query
    }

    pub fn body(&self) -> &Body {
        &self.state.body
    }

    /// Decodes the JSON body into a concrete type.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ServerResult<T> {
        self.state.body.json()
    }

    pub fn form<T: serde::de::DeserializeOwned>(&self) -> ServerResult<T> {
        self.state.body.form()
    }

    /// The JSON body parsed at dispatch time, for untyped inspection.
    pub fn body_value(&self) -> Option<&Value> {
        self.state.body_value.as_ref()
    }

    pub fn is_json(&self) -> bool {
        self.state.body.is_json()
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    /// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the peer address.
    ///
    /// The headers are whatever the client sent unless a proxy in front
    /// rewrites them. Use [`Context::remote_addr`] for anything that must
    /// not be spoofable.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return Some(first.to_string());
            }
        }
        if let Some(real) = self.header("x-real-ip") {
            return Some(real.trim().to_string());
        }
        self.state.remote_addr.map(|addr| addr.ip().to_string())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.state.data.get(key)
    }

    pub fn set_data<T: serde::Serialize>(&mut self, key: &str, value: T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.state.data.insert(key.to_string(), value);
        }
    }

    pub fn typed_data<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .data
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    /// Methods registered for this path, set when dispatch answers 405.
    pub fn allowed_methods(&self) -> &[Method] {
        &self.state.allowed
    }

    pub(crate) fn set_allowed_methods(&mut self, allowed: Vec<Method>) {
        self.state.allowed = allowed;
    }

    /// Split borrow used by the router: the path to match and the map to fill.
    pub(crate) fn route_parts(&mut self) -> (&str, &mut Params) {
        (&self.state.path, &mut self.state.params)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.state));
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.state.method)
            .field("path", &self.state.path)
            .field("params", &self.state.params)
            .field("query", &self.state.query)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn query_helpers() {
        let ctx = Context::detached(Request::get("/items?page=3&sort=&q=red+shoes"));
        assert_eq!(ctx.query("q"), Some("red shoes"));
        assert_eq!(ctx.query_as::<u32>("page").unwrap(), 3);
        assert_eq!(ctx.query_or("sort", "name"), "name");
        assert!(matches!(ctx.query_as::<u32>("limit"), Err(ServerError::BadRequest(_))));
        assert_eq!(ctx.url(), "/items?page=3&sort=&q=red+shoes");
    }

    #[test]
    fn param_parsing_reports_bad_requests() {
        let mut ctx = Context::detached(Request::get("/users/abc"));
        ctx.route_parts().1.insert("id", "abc");
        assert!(matches!(ctx.param_as::<u64>("id"), Err(ServerError::BadRequest(_))));
        ctx.route_parts().1.insert("id", "12");
        assert_eq!(ctx.param_as::<u64>("id").unwrap(), 12);
    }

    #[test]
    fn client_ip_prefers_forwarding_headers() {
        let addr: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let ctx = Context::detached(
            Request::get("/")
                .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
                .remote_addr(addr),
        );
        assert_eq!(ctx.client_ip().as_deref(), Some("203.0.113.7"));

        let ctx = Context::detached(Request::get("/").remote_addr(addr));
        assert_eq!(ctx.client_ip().as_deref(), Some("10.0.0.9"));
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Note {
        title: String,
    }

    #[test]
    fn json_body_is_available_typed_and_untyped() {
        let ctx = Context::detached(
            Request::post("/notes").body("application/json", r#"{"title":"hi"}"#),
        );
        assert_eq!(ctx.json::<Note>().unwrap(), Note { title: "hi".into() });
        assert_eq!(ctx.body_value().unwrap()["title"], "hi");
    }

    #[test]
    fn data_bag_round_trips_typed_values() {
        let mut ctx = Context::detached(Request::get("/"));
        ctx.set_data("user_id", 7u64);
        assert_eq!(ctx.typed_data::<u64>("user_id"), Some(7));
        assert_eq!(ctx.data("user_id"), Some(&Value::from(7u64)));
    }
}
