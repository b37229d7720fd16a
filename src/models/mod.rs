//! Data models for HTTP requests and responses.
//!
//! These are the rendered, wire-level shapes shared by the sender, the capture
//! engine and history. Templates live in [`crate::project`].

pub mod request;
pub mod response;

pub use request::{HttpMethod, HttpRequest, UnknownMethod};
pub use response::HttpResponse;
