//! HTTP response data models.
//!
//! This module defines the response snapshot handed back by an [`HttpSender`]
//! and stored in history: status, ordered headers, raw body and total duration.
//!
//! [`HttpSender`]: crate::executor::HttpSender

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Represents an HTTP response received from a server.
///
/// Headers are an ordered list rather than a map so that repeated headers such as
/// `Set-Cookie` are all preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code (e.g., 200, 404, 500).
    pub status_code: u16,

    /// HTTP status text (e.g., "OK", "Not Found").
    pub status_text: String,

    /// Response headers as ordered name/value pairs.
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Response body as raw bytes.
    ///
    /// Kept as bytes so binary responses survive the trip into history.
    #[serde(default)]
    pub body: Vec<u8>,

    /// Total time from sending the request to receiving the full body.
    #[serde(default)]
    pub duration: Duration,
}

impl HttpResponse {
    /// Creates a new HttpResponse with the given status code and text.
    pub fn new(status_code: u16, status_text: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: Vec::new(),
            duration: Duration::from_secs(0),
        }
    }

    /// Checks if the response status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Checks if the response status indicates a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// Checks if the response status indicates a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    /// Checks if the response status indicates a redirection (3xx).
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// Gets the first value of a header, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets every value of a header, in the order received.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets the Content-Type header value if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Attempts to parse the response body as UTF-8 text.
    pub fn body_as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences.
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Appends a header to the response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Sets the response body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// Status line in the form `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {} {}", self.status_code, self.status_text)
    }
}
