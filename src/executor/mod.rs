//! HTTP request executor.
//!
//! The core engine talks to the network only through the [`HttpSender`] trait.
//! [`ReqwestSender`] is the production implementation; tests substitute
//! scripted senders.
//!
//! A sender reports transport failures as [`RequestError`]. Any response that
//! arrives, whatever its status code, is a successful send.

pub mod config;
pub mod error;
pub mod redirect;

#[cfg(feature = "native")]
pub mod native;

pub use config::ExecutionConfig;
pub use error::RequestError;
pub use redirect::{send_with_session, Exchange, RedirectPolicy};

#[cfg(feature = "native")]
pub use native::ReqwestSender;

use crate::models::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};

/// A response together with the moments it was sent and received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// The received response.
    pub response: HttpResponse,
    /// When the request was handed to the transport.
    pub send_time: DateTime<Utc>,
    /// When the full response had arrived.
    pub recv_time: DateTime<Utc>,
}

/// Capability to send one rendered request.
///
/// Implementations enforce their own timeouts and report them as
/// [`RequestError::Timeout`]. A sender makes exactly one hop: it must not follow
/// redirects or keep cookies, since [`send_with_session`] does both.
pub trait HttpSender {
    /// Sends a request and waits for the complete response.
    fn send(&self, request: &HttpRequest) -> Result<SendOutcome, RequestError>;
}

impl<T: HttpSender + ?Sized> HttpSender for &T {
    fn send(&self, request: &HttpRequest) -> Result<SendOutcome, RequestError> {
        (**self).send(request)
    }
}

impl<T: HttpSender + ?Sized> HttpSender for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<SendOutcome, RequestError> {
        (**self).send(request)
    }
}
