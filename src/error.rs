use serde::Serialize;
use std::io;
use thiserror::Error;

/// Errors a handler or middleware can return.
///
/// Variants that carry a client-facing status are *structured*: the error
/// boundary answers with that status and the variant's message. Everything
/// else is an internal failure and is reported as a bare 500 so details never
/// leak to the client.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request timed out")]
    Timeout,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Too many requests")]
    TooManyRequests,
    #[error("{message}")]
    Status { code: u16, message: String },
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Panic: {0}")]
    Panic(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ServerError {
    /// Builds a structured error with an arbitrary status code.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        ServerError::Status {
            code,
            message: message.into(),
        }
    }

    /// Wraps any foreign error as an unstructured failure.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ServerError::Other(Box::new(err))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound => 404,
            ServerError::MethodNotAllowed => 405,
            ServerError::Timeout => 408,
            ServerError::Conflict(_) => 409,
            ServerError::Validation(_) => 422,
            ServerError::TooManyRequests => 429,
            ServerError::Status { code, .. } => *code,
            ServerError::Internal(_)
            | ServerError::Panic(_)
            | ServerError::Io(_)
            | ServerError::Json(_)
            | ServerError::Other(_) => 500,
        }
    }

    /// True when the error carries its own status and client-safe message.
    pub fn is_structured(&self) -> bool {
        !matches!(
            self,
            ServerError::Internal(_)
                | ServerError::Panic(_)
                | ServerError::Io(_)
                | ServerError::Json(_)
                | ServerError::Other(_)
        )
    }

    /// The message shown to clients.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::BadRequest(msg)
            | ServerError::Unauthorized(msg)
            | ServerError::Forbidden(msg)
            | ServerError::Conflict(msg)
            | ServerError::Validation(msg) => msg.clone(),
            ServerError::NotFound => "Not Found".to_string(),
            ServerError::MethodNotAllowed => "Method Not Allowed".to_string(),
            ServerError::Timeout => "Request timed out".to_string(),
            ServerError::TooManyRequests => "Too many requests".to_string(),
            ServerError::Status { message, .. } => message.clone(),
            _ => "Internal Server Error".to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.status_code(),
            message: self.public_message(),
        }
    }
}

/// JSON shape of every error response: `{ "code": 404, "message": "Not Found" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Rejected route registrations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route `{pattern}` names parameter `:{new}` where `:{existing}` is already registered")]
    ConflictingParameter {
        pattern: String,
        existing: String,
        new: String,
    },
    #[error("route `{pattern}` has a wildcard that is not the last segment")]
    WildcardNotLast { pattern: String },
    #[error("route `{pattern}` has an empty parameter name")]
    EmptyParameter { pattern: String },
}

pub type ServerResult<T> = Result<T, ServerError>;
