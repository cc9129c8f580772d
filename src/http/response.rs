use crate::error::ServerError;
use crate::http::envelope::{Envelope, Page};
use crate::http::Method;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub(crate) cache_ttl: Option<Duration>,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            cache_ttl: None,
        }
    }

    // Chainable status setter
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn body<T: Into<Vec<u8>>>(&mut self, body: T) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        self.headers.insert(name.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ServerError> {
        let bytes = serde_json::to_vec(value)?;
        self.header("Content-Type", "application/json");
        self.body(bytes);
        Ok(self)
    }

    /// Marks a GET response as cacheable by the application's response cache.
    pub fn cache_for(&mut self, ttl: Duration) -> &mut Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_status<T: Serialize>(status: u16, data: &T) -> Result<Response, ServerError> {
        let mut response = Response::new(status);
        response.json(data)?;
        Ok(response)
    }

    pub fn ok<T: Serialize>(data: &T) -> Result<Response, ServerError> {
        Response::with_status(200, data)
    }

    pub fn created<T: Serialize>(data: &T) -> Result<Response, ServerError> {
        Response::with_status(201, data)
    }

    /// 200 with the payload wrapped as `{ status: "success", timestamp, data }`.
    pub fn success<T: Serialize>(data: &T) -> Result<Response, ServerError> {
        Response::ok(&Envelope::success(data))
    }

    /// Successful envelope whose `data` is `{ page, pageNumber, totalPages }`.
    pub fn paginated<T: Serialize>(
        items: &T,
        page_number: u32,
        total_pages: u32,
    ) -> Result<Response, ServerError> {
        Response::success(&Page {
            page: items,
            page_number,
            total_pages,
        })
    }

    /// Error envelope: `{ status: "error", timestamp, data: { message } }`.
    pub fn failure(status: u16, message: &str) -> Response {
        let mut response = Response::new(status);
        response.header("Content-Type", "application/json");
        response.body(serde_json::to_vec(&Envelope::error(message)).unwrap_or_default());
        response
    }

    pub fn no_content() -> Response {
        Response::new(204)
    }

    /// Structured error response: `{ "code": <status>, "message": <text> }`.
    pub fn error(err: &ServerError) -> Response {
        let body = err.to_body();
        let mut response = Response::new(body.code);
        response.header("Content-Type", "application/json");
        // ErrorBody holds a u16 and a String; encoding it cannot fail.
        response.body(serde_json::to_vec(&body).unwrap_or_default());
        response
    }

    pub fn method_not_allowed(allowed: &[Method]) -> Response {
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let mut response = Response::error(&ServerError::MethodNotAllowed);
        response.header("Allow", allow);
        response
    }

    pub fn text<T: Into<String>>(content: T) -> Result<Response, ServerError> {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(content.into());
        Ok(response)
    }

    pub fn html<T: Into<String>>(content: T) -> Result<Response, ServerError> {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "text/html; charset=utf-8")
            .body(content.into());
        Ok(response)
    }

    pub fn redirect(location: &str) -> Response {
        let mut response = Response::new(302);
        response.header("Location", location);
        response
    }

    pub fn permanent_redirect(location: &str) -> Response {
        let mut response = Response::new(301);
        response.header("Location", location);
        response
    }

    pub fn with_cache_control(&mut self, directive: &str) -> &mut Self {
        self.header("Cache-Control", directive)
    }

    pub fn no_cache(&mut self) -> &mut Self {
        self.with_cache_control("no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .header("Expires", "0")
    }

    pub fn vary(&mut self, headers: &[&str]) -> &mut Self {
        self.header("Vary", headers.join(", "))
    }

    /// Adds `name` to the `Vary` list, keeping whatever is already there.
    pub fn add_vary(&mut self, name: &str) -> &mut Self {
        let existing = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case("Vary"))
            .map(|(_, v)| v);
        match existing {
            Some(value) => {
                let listed = value
                    .split(',')
                    .any(|v| v.trim() == "*" || v.trim().eq_ignore_ascii_case(name));
                if !listed {
                    value.push_str(", ");
                    value.push_str(name);
                }
                self
            }
            None => self.header("Vary", name),
        }
    }

    /// Header names listed in `Vary`, lowercased.
    pub fn vary_names(&self) -> Vec<String> {
        self.get_header("Vary")
            .map(|value| {
                value
                    .split(',')
                    .map(|name| name.trim().to_ascii_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[macro_export]
macro_rules! ok_json {
    ($($json:tt)+) => {
        $crate::http::Response::ok(&$crate::json!($($json)+))
    };
}

#[macro_export]
macro_rules! created_json {
    ($($json:tt)+) => {
        $crate::http::Response::created(&$crate::json!($($json)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn error_response_has_code_and_message() {
        let response = Response::error(&ServerError::TooManyRequests);
        assert_eq!(response.status, 429);
        assert_eq!(response.get_header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, serde_json::json!({ "code": 429, "message": "Too many requests" }));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let response = Response::method_not_allowed(&[Method::GET, Method::POST]);
        assert_eq!(response.status, 405);
        assert_eq!(response.get_header("Allow"), Some("GET, POST"));
    }

    #[test]
    fn add_vary_appends_without_duplicates() {
        let mut response = Response::new(200);
        response.add_vary("Origin");
        let origin = response.headers.remove("Vary").unwrap();
        response.headers.insert("vary".into(), origin);
        response.add_vary("Accept-Encoding").add_vary("origin");
        assert_eq!(response.get_header("Vary"), Some("Origin, Accept-Encoding"));
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.vary_names(), vec!["origin", "accept-encoding"]);
    }

    #[test]
    fn envelope_helpers() {
        let response = Response::paginated(&vec![1, 2, 3], 2, 4).unwrap();
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"], serde_json::json!({ "page": [1, 2, 3], "pageNumber": 2, "totalPages": 4 }));
        assert!(body["timestamp"].is_string());

        let response = Response::failure(422, "name is required");
        assert_eq!(response.status, 422);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"]["message"], "name is required");
    }

    #[test]
    fn json_helpers_set_content_type() {
        let response = ok_json!({ "hello": "world" }).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_string(), r#"{"hello":"world"}"#);
    }
}
