//! HTTP request execution error types.
//!
//! These are transport failures: the request never produced a response. A
//! response with a 4xx or 5xx status is not an error at this layer.

/// Errors that can occur during HTTP request execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Network error occurred during request execution.
    ///
    /// This includes connection failures, DNS resolution errors,
    /// and other network-level issues.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out before completion.
    #[error("Request timed out")]
    Timeout,

    /// Invalid URL provided in the request.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// TLS/SSL error occurred during HTTPS connection.
    #[error("TLS/SSL error: {0}")]
    TlsError(String),

    /// Request building error.
    ///
    /// Errors that occur when constructing the HTTP request, such as a header
    /// value that is not valid on the wire.
    #[error("Request build error: {0}")]
    BuildError(String),

    /// A redirect chain ran past the configured limit.
    #[error("Too many redirects (limit {max})")]
    TooManyRedirects { max: u32 },

    /// Unsupported protocol.
    ///
    /// Only HTTP and HTTPS are supported.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}

/// Convert reqwest errors to RequestError.
#[cfg(feature = "native")]
impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        let text = err.to_string();
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_builder() {
            RequestError::BuildError(text)
        } else if text.contains("certificate") || text.contains("TLS") || text.contains("SSL") {
            RequestError::TlsError(text)
        } else {
            RequestError::NetworkError(text)
        }
    }
}

/// Convert URL parsing errors to RequestError.
impl From<url::ParseError> for RequestError {
    fn from(err: url::ParseError) -> Self {
        RequestError::InvalidUrl(err.to_string())
    }
}
