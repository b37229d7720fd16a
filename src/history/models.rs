//! Data models for request history.
//!
//! A [`HistoryEntry`] is written once per send that reached the HTTP sender,
//! whether it came from a single `send` or from a flow step. Entries are
//! append-only; nothing rewrites an entry after it is stored.

use crate::models::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum response body size to store in history (1MB).
///
/// Responses larger than this threshold have their body dropped before storage.
pub const MAX_RESPONSE_BODY_SIZE: usize = 1_048_576;

/// Placeholder written in place of sensitive header values.
pub const REDACTED: &str = "[REDACTED]";

/// Sensitive header names whose values are redacted before storage.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
    "auth-token",
    "x-auth-token",
    "access-token",
    "x-access-token",
    "proxy-authorization",
];

/// A single entry in the request history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Name of the template that was sent.
    pub template: String,

    /// Flow the send belonged to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    /// When the request was handed to the sender.
    pub send_time: DateTime<Utc>,

    /// When the response finished arriving; absent for transport failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_time: Option<DateTime<Utc>>,

    /// The request as sent, after substitution and cookie attachment.
    pub request: HttpRequest,

    /// The response, if one was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponse>,

    /// Values captured from the response.
    #[serde(default)]
    pub captures: BTreeMap<String, String>,

    /// Transport or capture error text for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    /// Creates an entry for a request sent at `send_time`, with no outcome yet.
    pub fn new(template: impl Into<String>, request: HttpRequest, send_time: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            template: template.into(),
            flow: None,
            send_time,
            recv_time: None,
            request,
            response: None,
            captures: BTreeMap::new(),
            error: None,
        }
    }

    /// Tags the entry with the flow it ran in.
    pub fn in_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Records the received response.
    pub fn with_response(mut self, response: HttpResponse, recv_time: DateTime<Utc>) -> Self {
        self.response = Some(response);
        self.recv_time = Some(recv_time);
        self
    }

    /// Records captured values.
    pub fn with_captures(mut self, captures: BTreeMap<String, String>) -> Self {
        self.captures = captures;
        self
    }

    /// Records an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Checks if a response arrived and nothing failed afterwards.
    pub fn is_success(&self) -> bool {
        self.response.is_some() && self.error.is_none()
    }

    /// Checks if the response body exceeds the storage limit.
    pub fn has_large_response(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|r| r.body.len() > MAX_RESPONSE_BODY_SIZE)
    }

    /// Redacts the values of sensitive headers in the request and response.
    pub fn sanitize_headers(&self) -> Self {
        let mut sanitized = self.clone();
        redact(&mut sanitized.request.headers);
        if let Some(response) = sanitized.response.as_mut() {
            redact(&mut response.headers);
        }
        sanitized
    }

    /// Removes the response body if it exceeds the size limit.
    pub fn truncate_large_response(&self) -> Self {
        let mut truncated = self.clone();
        if self.has_large_response() {
            if let Some(response) = truncated.response.as_mut() {
                response.body = Vec::new();
            }
        }
        truncated
    }

    /// Prepares the entry for storage by sanitizing and truncating as needed.
    pub fn prepare_for_storage(&self, sanitize_sensitive: bool) -> Self {
        let entry = if sanitize_sensitive {
            self.sanitize_headers()
        } else {
            self.clone()
        };
        entry.truncate_large_response()
    }
}

fn redact(headers: &mut [(String, String)]) {
    for (name, value) in headers.iter_mut() {
        if SENSITIVE_HEADERS
            .iter()
            .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
        {
            *value = REDACTED.to_string();
        }
    }
}

/// Errors that can occur during history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// File I/O failed.
    #[error("History storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// An entry could not be serialized.
    #[error("History serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
