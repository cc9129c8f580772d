//! Uniform JSON envelope for API responses.
//!
//! ```json
//! { "status": "success", "timestamp": "2024-05-01T12:00:00Z", "data": { .. } }
//! ```
//!
//! Paginated payloads nest the page inside `data` as
//! `{ "page": [..], "pageNumber": 2, "totalPages": 7 }`; failures carry
//! `{ "message": ".." }`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: ResponseStatus,
    pub timestamp: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self::new(ResponseStatus::Success, data)
    }

    fn new(status: ResponseStatus, data: T) -> Self {
        Envelope {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            data,
        }
    }
}

impl Envelope<ErrorMessage> {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            ResponseStatus::Error,
            ErrorMessage {
                message: message.into(),
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page: T,
    pub page_number: u32,
    pub total_pages: u32,
}
