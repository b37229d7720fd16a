//! Request templates.

use crate::variables::CaptureSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, reusable definition of one HTTP request.
///
/// The URL, header values and body may contain variable tokens; they are
/// resolved at send time. The method is kept as text so a template can be saved
/// before it is complete; it is checked when the template is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    /// Unique (case-insensitive) template name.
    pub name: String,

    /// HTTP method, e.g. `GET`.
    #[serde(default)]
    pub method: String,

    /// Target URL, possibly with variable tokens.
    #[serde(default)]
    pub url: String,

    /// Headers in the order they are sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,

    /// Optional body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Captures keyed by variable name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, CaptureSpec>,
}

impl RequestTemplate {
    /// Creates a template with no headers, body or captures.
    pub fn new(name: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            captures: BTreeMap::new(),
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a capture, replacing any capture for the same variable.
    pub fn with_capture(mut self, spec: CaptureSpec) -> Self {
        self.add_capture(spec);
        self
    }

    /// Adds a capture, replacing any capture for the same variable.
    ///
    /// Returns the replaced spec, if any.
    pub fn add_capture(&mut self, spec: CaptureSpec) -> Option<CaptureSpec> {
        self.captures.insert(spec.var_name.clone(), spec)
    }

    /// Removes the capture for a variable.
    pub fn remove_capture(&mut self, var_name: &str) -> Option<CaptureSpec> {
        self.captures.remove(var_name)
    }
}
