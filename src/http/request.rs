use crate::error::{ServerError, ServerResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Eq, Hash, PartialEq, PartialOrd, Ord, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            other => Err(ServerError::BadRequest(format!("unknown method `{}`", other))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone)]
pub struct Body {
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

impl Body {
    pub fn new() -> Body {
        Body::default()
    }

    pub fn from_string(s: &str) -> Body {
        Body {
            content_type: "text/plain".to_string(),
            data: s.as_bytes().to_vec(),
        }
    }

    pub fn from_bytes(b: Vec<u8>) -> Body {
        Body {
            content_type: "application/octet-stream".to_string(),
            data: b,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .split(';')
            .next()
            .map(|ct| ct.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false)
    }

    /// Decodes a JSON body into `T`.
    pub fn json<T>(&self) -> ServerResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.is_json() {
            return Err(ServerError::BadRequest(
                "content-type must be application/json".to_string(),
            ));
        }
        serde_json::from_slice(&self.data)
            .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {}", e)))
    }

    /// Decodes an `application/x-www-form-urlencoded` body into `T`.
    pub fn form<T>(&self) -> ServerResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.content_type.starts_with("application/x-www-form-urlencoded") {
            return Err(ServerError::BadRequest(
                "content-type must be application/x-www-form-urlencoded".to_string(),
            ));
        }
        let fields = parse_urlencoded(&String::from_utf8_lossy(&self.data));
        let map: Map<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        serde_json::from_value(Value::Object(map))
            .map_err(|e| ServerError::BadRequest(format!("invalid form body: {}", e)))
    }

    /// Parses a JSON body into an untyped value, `None` for non-JSON or malformed bodies.
    pub(crate) fn parse_value(&self) -> Option<Value> {
        if self.is_json() && !self.data.is_empty() {
            serde_json::from_slice(&self.data).ok()
        } else {
            None
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Body {
        Body::from_bytes(b)
    }
}

/// Splits `a=1&b=two%20words` into decoded pairs. The first occurrence of a key wins.
pub(crate) fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    parse_urlencoded_into(input, &mut out);
    out
}

pub(crate) fn parse_urlencoded_into(input: &str, out: &mut HashMap<String, String>) {
    for pair in input.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        if key.is_empty() || out.contains_key(&key) {
            continue;
        }
        out.insert(key, decode_component(value));
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// An inbound request as handed over by the host HTTP server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Body,
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Builds a request from a method and a request target such as `/users?page=2`.
    pub fn new(method: Method, target: &str) -> Request {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let path = if path.is_empty() { "/" } else { path };
        Request {
            method,
            path: path.to_string(),
            query: query.to_string(),
            headers: HashMap::new(),
            body: Body::new(),
            remote_addr: None,
        }
    }

    pub fn get(target: &str) -> Request {
        Request::new(Method::GET, target)
    }

    pub fn post(target: &str) -> Request {
        Request::new(Method::POST, target)
    }

    /// Header names are stored lowercase.
    pub fn header(mut self, name: &str, value: &str) -> Request {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn body(mut self, content_type: &str, data: impl Into<Vec<u8>>) -> Request {
        self.headers
            .insert("content-type".to_string(), content_type.to_string());
        self.body = Body {
            content_type: content_type.to_string(),
            data: data.into(),
        };
        self
    }

    pub fn json<T: serde::Serialize>(self, value: &T) -> ServerResult<Request> {
        let data = serde_json::to_vec(value)?;
        Ok(self.body("application/json", data))
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Request {
        self.remote_addr = Some(addr);
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Path plus raw query string; the response cache key.
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn request_target_is_split_into_path_and_query() {
        let req = Request::get("/search?q=rust+lang&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query, "q=rust+lang&page=2");
        assert_eq!(req.url(), "/search?q=rust+lang&page=2");
        assert_eq!(Request::get("").path, "/");
    }

    #[test]
    fn urlencoded_pairs_are_decoded_and_first_wins() {
        let parsed = parse_urlencoded("q=rust+lang&name=Ada%20L&q=second&flag");
        assert_eq!(parsed["q"], "rust lang");
        assert_eq!(parsed["name"], "Ada L");
        assert_eq!(parsed["flag"], "");
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Login {
        user: String,
        pass: String,
    }

    #[test]
    fn typed_body_decoding() {
        let req = Request::post("/login")
            .body("application/json; charset=utf-8", r#"{"user":"ada","pass":"x"}"#);
        let login: Login = req.body.json().unwrap();
        assert_eq!(login.user, "ada");

        let req = Request::post("/login")
            .body("application/x-www-form-urlencoded", "user=ada&pass=p%26w");
        let login: Login = req.body.form().unwrap();
        assert_eq!(login, Login { user: "ada".into(), pass: "p&w".into() });

        let req = Request::post("/login").body("text/plain", "nope");
        assert!(matches!(req.body.json::<Login>(), Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn method_parsing_rejects_unknown_verbs() {
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::PATCH);
        assert!("BREW".parse::<Method>().is_err());
    }
}
