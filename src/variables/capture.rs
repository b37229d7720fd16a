//! Capture engine: pulls values out of responses into the variable store.
//!
//! Each template carries a set of [`CaptureSpec`]s. After a response arrives,
//! [`apply_captures`] evaluates them in ascending order of variable name and
//! writes every hit into the flow-run scope of the [`VarStore`].
//!
//! # Expression syntax
//!
//! ```text
//! headers.X-Session-Id           whole value of a response header
//! headers.Location ~ /item/(\d+)  regex applied to a header value
//! $.user.id                      JSON path into the response body
//! "token":"([^"]+)"              regex applied to the response body
//! ```
//!
//! Regular expressions must contain exactly one capture group; the first match
//! wins.

use super::extract::{compile_single_group, extract_json_path, extract_regex, validate_jsonpath};
use super::store::{Scope, VarStore};
use crate::models::HttpResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix marking a header source in capture expressions.
const HEADER_PREFIX: &str = "headers.";

/// Separator between a header name and the regex applied to its value.
const HEADER_PATTERN_SEPARATOR: &str = " ~ ";

/// What happens when a capture finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnMissing {
    /// Fail the step with [`CaptureError::Missing`].
    #[default]
    Error,
    /// Leave any prior value untouched and carry on.
    Skip,
}

/// Expression evaluated against the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyExpr {
    /// Regular expression with exactly one capture group.
    Regex(String),
    /// JSON path such as `$.items[0].id`.
    JsonPath(String),
}

/// Where a captured value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "camelCase")]
pub enum CaptureSource {
    /// A response header, optionally narrowed by a single-group regex.
    Header {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// The response body.
    Body { expr: BodyExpr },
}

impl fmt::Display for CaptureSource {
    /// Formats the source in the same syntax [`CaptureSpec::parse`] accepts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Header { name, pattern: None } => write!(f, "{}{}", HEADER_PREFIX, name),
            CaptureSource::Header {
                name,
                pattern: Some(pattern),
            } => write!(f, "{}{}{}{}", HEADER_PREFIX, name, HEADER_PATTERN_SEPARATOR, pattern),
            CaptureSource::Body {
                expr: BodyExpr::Regex(re) | BodyExpr::JsonPath(re),
            } => f.write_str(re),
        }
    }
}

/// Errors raised by the capture engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The expression found nothing and the spec does not allow skipping.
    #[error("capture {var_name} found no value in {source_desc}")]
    Missing {
        var_name: String,
        source_desc: String,
    },

    /// The capture expression is malformed.
    #[error("invalid capture expression for {var_name}: {reason}")]
    InvalidExpression { var_name: String, reason: String },
}

/// Declares how one variable is captured from a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSpec {
    /// Variable written on success.
    pub var_name: String,
    /// Where to look.
    pub source: CaptureSource,
    /// Policy when nothing is found.
    #[serde(default)]
    pub on_missing: OnMissing,
}

impl CaptureSpec {
    /// Captures the whole value of a response header.
    pub fn header(var_name: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            source: CaptureSource::Header {
                name: header.into(),
                pattern: None,
            },
            on_missing: OnMissing::Error,
        }
    }

    /// Captures the first group of a regex matched against the body.
    pub fn body_regex(var_name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            source: CaptureSource::Body {
                expr: BodyExpr::Regex(pattern.into()),
            },
            on_missing: OnMissing::Error,
        }
    }

    /// Captures the value at a JSON path in the body.
    pub fn json_path(var_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            source: CaptureSource::Body {
                expr: BodyExpr::JsonPath(path.into()),
            },
            on_missing: OnMissing::Error,
        }
    }

    /// Switches the spec to skip silently when nothing is found.
    pub fn skip_if_missing(mut self) -> Self {
        self.on_missing = OnMissing::Skip;
        self
    }

    /// Parses a capture expression into a validated spec.
    ///
    /// # Arguments
    ///
    /// * `var_name` - Variable the value is stored under
    /// * `expr` - Expression in the syntax described in the module docs
    /// * `on_missing` - Policy when nothing is found
    pub fn parse(var_name: &str, expr: &str, on_missing: OnMissing) -> Result<Self, CaptureError> {
        let trimmed = expr.trim();

        let source = if let Some(rest) = trimmed.strip_prefix(HEADER_PREFIX) {
            match rest.split_once(HEADER_PATTERN_SEPARATOR) {
                Some((name, pattern)) => CaptureSource::Header {
                    name: name.trim().to_string(),
                    pattern: Some(pattern.trim().to_string()),
                },
                None => CaptureSource::Header {
                    name: rest.trim().to_string(),
                    pattern: None,
                },
            }
        } else if trimmed.starts_with('$') {
            CaptureSource::Body {
                expr: BodyExpr::JsonPath(trimmed.to_string()),
            }
        } else {
            CaptureSource::Body {
                expr: BodyExpr::Regex(trimmed.to_string()),
            }
        };

        let spec = Self {
            var_name: var_name.to_string(),
            source,
            on_missing,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks the variable name and expression without touching a response.
    pub fn validate(&self) -> Result<(), CaptureError> {
        let invalid = |reason: String| CaptureError::InvalidExpression {
            var_name: self.var_name.clone(),
            reason,
        };

        if self.var_name.is_empty()
            || !self
                .var_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid(format!(
                "variable name {:?} must be letters, digits and underscores",
                self.var_name
            )));
        }

        match &self.source {
            CaptureSource::Header { name, pattern } => {
                if !validate_header_name(name) {
                    return Err(invalid(format!("invalid header name {:?}", name)));
                }
                if let Some(pattern) = pattern {
                    compile_single_group(pattern).map_err(invalid)?;
                }
            }
            CaptureSource::Body {
                expr: BodyExpr::Regex(pattern),
            } => {
                compile_single_group(pattern).map_err(invalid)?;
            }
            CaptureSource::Body {
                expr: BodyExpr::JsonPath(path),
            } => {
                if !validate_jsonpath(path) {
                    return Err(invalid(format!("malformed JSON path {:?}", path)));
                }
            }
        }

        Ok(())
    }

    /// Evaluates the spec against a response.
    ///
    /// Returns `Ok(None)` when the expression is valid but finds nothing.
    pub fn extract(&self, response: &HttpResponse) -> Result<Option<String>, CaptureError> {
        self.validate()?;

        let value = match &self.source {
            CaptureSource::Header { name, pattern } => {
                let Some(value) = response.header(name) else {
                    return Ok(None);
                };
                match pattern {
                    None => Some(value.to_string()),
                    Some(pattern) => {
                        let re = self.compile(pattern)?;
                        extract_regex(&re, value)
                    }
                }
            }
            CaptureSource::Body {
                expr: BodyExpr::Regex(pattern),
            } => {
                let re = self.compile(pattern)?;
                extract_regex(&re, &response.body_lossy())
            }
            CaptureSource::Body {
                expr: BodyExpr::JsonPath(path),
            } => extract_json_path(&response.body_lossy(), path),
        };

        Ok(value)
    }

    fn compile(&self, pattern: &str) -> Result<regex::Regex, CaptureError> {
        compile_single_group(pattern).map_err(|reason| CaptureError::InvalidExpression {
            var_name: self.var_name.clone(),
            reason,
        })
    }
}

/// Validates a header name for extraction.
fn validate_header_name(header_name: &str) -> bool {
    if header_name.is_empty() {
        return false;
    }

    header_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Values produced by one capture pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Captured values keyed by variable name.
    pub captured: BTreeMap<String, String>,
    /// Variables whose spec found nothing and was allowed to skip.
    pub skipped: Vec<String>,
}

/// A capture pass that stopped early.
///
/// Values captured before the failing spec were already written to the store
/// and are listed in `partial`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct CaptureFailure {
    pub partial: CaptureReport,
    #[source]
    pub error: CaptureError,
}

/// Applies capture specs to a response, writing hits into the flow-run scope.
///
/// Specs run in ascending order of `var_name` regardless of the order given.
/// Writes happen one at a time, so a failure leaves earlier captures in place.
pub fn apply_captures<'a, I>(
    specs: I,
    response: &HttpResponse,
    vars: &mut VarStore,
) -> Result<CaptureReport, CaptureFailure>
where
    I: IntoIterator<Item = &'a CaptureSpec>,
{
    let mut ordered: Vec<&CaptureSpec> = specs.into_iter().collect();
    ordered.sort_by(|a, b| a.var_name.cmp(&b.var_name));

    let mut report = CaptureReport::default();

    for spec in ordered {
        let outcome = spec.extract(response);
        match outcome {
            Ok(Some(value)) => {
                log::debug!("captured {} from {}", spec.var_name, spec.source);
                vars.set(Scope::FlowRun, spec.var_name.clone(), value.clone());
                report.captured.insert(spec.var_name.clone(), value);
            }
            Ok(None) if spec.on_missing == OnMissing::Skip => {
                log::warn!(
                    "capture {} found no value in {}; skipping",
                    spec.var_name,
                    spec.source
                );
                report.skipped.push(spec.var_name.clone());
            }
            Ok(None) => {
                let error = CaptureError::Missing {
                    var_name: spec.var_name.clone(),
                    source_desc: spec.source.to_string(),
                };
                return Err(CaptureFailure {
                    partial: report,
                    error,
                });
            }
            Err(error) => {
                return Err(CaptureFailure {
                    partial: report,
                    error,
                })
            }
        }
    }

    Ok(report)
}
