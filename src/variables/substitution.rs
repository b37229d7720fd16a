//! Variable substitution engine.
//!
//! Replaces `$NAME` tokens in request text with values from a [`VarSnapshot`].
//! A name is a greedy run of ASCII letters, digits and underscores directly after
//! the prefix. A doubled prefix (`$$`) renders as one literal prefix and never
//! starts a token. Substituted values are inserted verbatim and are not scanned
//! again.
//!
//! The prefix is configurable per project; `$` is the default.

use super::store::VarSnapshot;
use crate::models::{HttpMethod, HttpRequest};
use crate::project::RequestTemplate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

/// Default symbol that starts a variable token.
pub const DEFAULT_VAR_PREFIX: &str = "$";

/// Cached token pattern for the default prefix.
static DEFAULT_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    build_token_regex(DEFAULT_VAR_PREFIX).expect("Failed to compile variable token regex")
});

/// Errors raised while substituting variables into a single piece of text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VarError {
    /// A token names a variable that no scope defines.
    #[error("unresolved variable: {0}")]
    UnresolvedVariable(String),

    /// The configured prefix is empty or would be part of a variable name.
    #[error("invalid variable prefix {0:?}")]
    InvalidPrefix(String),
}

/// What to do with a token whose variable is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Fail with [`VarError::UnresolvedVariable`].
    #[default]
    Error,
    /// Keep the token text as-is. Used for previews and dry runs.
    LeaveLiteral,
}

/// Options controlling one substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionOptions {
    /// Symbol that starts a variable token.
    pub prefix: String,
    /// Handling of tokens that do not resolve.
    pub unresolved: UnresolvedPolicy,
}

impl SubstitutionOptions {
    /// Creates options with the given prefix that fail on unresolved tokens.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            unresolved: UnresolvedPolicy::Error,
        }
    }

    /// Switches unresolved tokens to be left in the output literally.
    pub fn leave_unresolved(mut self) -> Self {
        self.unresolved = UnresolvedPolicy::LeaveLiteral;
        self
    }
}

impl Default for SubstitutionOptions {
    fn default() -> Self {
        Self::new(DEFAULT_VAR_PREFIX)
    }
}

/// Part of a request that was being rendered when substitution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    /// The request URL.
    Url,
    /// The value of the named header.
    Header(String),
    /// The request body.
    Body,
}

impl std::fmt::Display for RequestPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestPart::Url => write!(f, "URL"),
            RequestPart::Header(name) => write!(f, "header {:?}", name),
            RequestPart::Body => write!(f, "body"),
        }
    }
}

/// Errors raised while turning a template into a sendable request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The template lacks something required to send it.
    #[error("request template {template} {reason}")]
    Validation {
        /// Template name.
        template: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A variable used by the template is not set.
    #[error("unresolved variable {name} in {part}")]
    UnresolvedVariable {
        /// Variable name without the prefix.
        name: String,
        /// Where the token was found.
        part: RequestPart,
    },

    /// The configured prefix is unusable.
    #[error("invalid variable prefix {0:?}")]
    InvalidPrefix(String),
}

impl RenderError {
    fn from_var(err: VarError, part: RequestPart) -> Self {
        match err {
            VarError::UnresolvedVariable(name) => RenderError::UnresolvedVariable { name, part },
            VarError::InvalidPrefix(prefix) => RenderError::InvalidPrefix(prefix),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Checks that a prefix can delimit variable tokens.
pub fn validate_prefix(prefix: &str) -> Result<(), VarError> {
    if prefix.is_empty() || prefix.chars().any(is_name_char) || prefix.chars().any(char::is_whitespace)
    {
        return Err(VarError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

fn build_token_regex(prefix: &str) -> Result<Regex, VarError> {
    validate_prefix(prefix)?;
    let p = regex::escape(prefix);
    Regex::new(&format!("{p}{p}|{p}([A-Za-z0-9_]+)"))
        .map_err(|_| VarError::InvalidPrefix(prefix.to_string()))
}

fn token_regex(prefix: &str) -> Result<Cow<'static, Regex>, VarError> {
    if prefix == DEFAULT_VAR_PREFIX {
        Ok(Cow::Borrowed(&*DEFAULT_TOKEN_REGEX))
    } else {
        build_token_regex(prefix).map(Cow::Owned)
    }
}

/// Substitutes every variable token in `text`.
///
/// # Examples
///
/// ```
/// use reqflow::variables::{substitute, SubstitutionOptions, VarSnapshot};
///
/// let vars: VarSnapshot = [("NAME", "v")].into_iter().collect();
/// let opts = SubstitutionOptions::default();
///
/// assert_eq!(substitute("$NAME", &vars, &opts).unwrap(), "v");
/// assert_eq!(substitute("$$NAME", &vars, &opts).unwrap(), "$NAME");
/// ```
pub fn substitute(
    text: &str,
    vars: &VarSnapshot,
    opts: &SubstitutionOptions,
) -> Result<String, VarError> {
    let re = token_regex(&opts.prefix)?;

    if !text.contains(opts.prefix.as_str()) {
        return Ok(text.to_string());
    }

    let mut result = String::with_capacity(text.len() + text.len() / 4);
    let mut last_match_end = 0;

    for cap in re.captures_iter(text) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        result.push_str(&text[last_match_end..full_match.start()]);

        match cap.get(1) {
            // doubled prefix
            None => result.push_str(&opts.prefix),
            Some(name) => match (vars.get(name.as_str()), opts.unresolved) {
                (Some(value), _) => result.push_str(value),
                (None, UnresolvedPolicy::LeaveLiteral) => result.push_str(full_match.as_str()),
                (None, UnresolvedPolicy::Error) => {
                    return Err(VarError::UnresolvedVariable(name.as_str().to_string()));
                }
            },
        }

        last_match_end = full_match.end();
    }

    result.push_str(&text[last_match_end..]);
    Ok(result)
}

/// Lists the distinct variable names referenced in `text`, in order of first use.
pub fn referenced_variables(text: &str, prefix: &str) -> Result<Vec<String>, VarError> {
    let re = token_regex(prefix)?;
    let mut seen = HashSet::new();
    Ok(re
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect())
}

/// Checks that a template has what it needs to be sent and parses its method.
pub fn validate_template(template: &RequestTemplate) -> Result<HttpMethod, RenderError> {
    let invalid = |reason: &str| RenderError::Validation {
        template: template.name.clone(),
        reason: reason.to_string(),
    };

    if template.method.trim().is_empty() {
        return Err(invalid("has no method set"));
    }
    if template.url.trim().is_empty() {
        return Err(invalid("has no URL set"));
    }

    template
        .method
        .parse::<HttpMethod>()
        .map_err(|e| invalid(&format!("has an invalid method: {}", e)))
}

/// Renders a template into a concrete request.
///
/// The URL, each header value and the body are substituted independently; the
/// first failure aborts the whole render and names the variable and the part it
/// was found in.
pub fn render_request(
    template: &RequestTemplate,
    vars: &VarSnapshot,
    opts: &SubstitutionOptions,
) -> Result<HttpRequest, RenderError> {
    let method = validate_template(template)?;

    let url = substitute(&template.url, vars, opts)
        .map_err(|e| RenderError::from_var(e, RequestPart::Url))?;
    let mut request = HttpRequest::new(method, url);

    for (name, value) in &template.headers {
        let value = substitute(value, vars, opts)
            .map_err(|e| RenderError::from_var(e, RequestPart::Header(name.clone())))?;
        request.add_header(name.clone(), value);
    }

    if let Some(body) = &template.body {
        let body = substitute(body, vars, opts)
            .map_err(|e| RenderError::from_var(e, RequestPart::Body))?;
        request.set_body(body);
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> VarSnapshot {
        [
            ("NAME", "v"),
            ("BASE", "https://api.example.com"),
            ("ID", "42"),
            ("ID_2", "43"),
            ("EMPTY", ""),
        ]
        .into_iter()
        .collect()
    }

    fn render(text: &str) -> Result<String, VarError> {
        substitute(text, &vars(), &SubstitutionOptions::default())
    }

    #[test]
    fn test_simple_substitution() {
        assert_eq!(render("$NAME").unwrap(), "v");
        assert_eq!(render("$BASE/item/$ID").unwrap(), "https://api.example.com/item/42");
    }

    #[test]
    fn test_doubled_prefix_is_literal() {
        assert_eq!(render("$$NAME").unwrap(), "$NAME");
        assert_eq!(render("cost: $$5").unwrap(), "cost: $5");
        assert_eq!(render("$$$NAME").unwrap(), "$v");
    }

    #[test]
    fn test_names_are_greedy() {
        // $ID_2 is one token, not $ID followed by "_2"
        assert_eq!(render("$ID_2").unwrap(), "43");
        assert_eq!(render("$ID-2").unwrap(), "42-2");
    }

    #[test]
    fn test_lone_prefix_is_literal() {
        assert_eq!(render("price in $").unwrap(), "price in $");
        assert_eq!(render("$ {x}").unwrap(), "$ {x}");
    }

    #[test]
    fn test_empty_value_substitutes() {
        assert_eq!(render("[$EMPTY]").unwrap(), "[]");
    }

    #[test]
    fn test_unresolved_variable_fails() {
        assert_eq!(
            render("$BASE/$MISSING"),
            Err(VarError::UnresolvedVariable("MISSING".to_string()))
        );
    }

    #[test]
    fn test_unresolved_variable_left_literal() {
        let opts = SubstitutionOptions::default().leave_unresolved();
        let out = substitute("$BASE/$MISSING/$$X", &vars(), &opts).unwrap();
        assert_eq!(out, "https://api.example.com/$MISSING/$X");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars: VarSnapshot = [("A", "$B"), ("B", "nope")].into_iter().collect();
        let out = substitute("$A", &vars, &SubstitutionOptions::default()).unwrap();
        assert_eq!(out, "$B");
    }

    #[test]
    fn test_custom_prefix() {
        let opts = SubstitutionOptions::new("@@");
        assert_eq!(substitute("@@NAME and $NAME", &vars(), &opts).unwrap(), "v and $NAME");
        assert_eq!(substitute("@@@@NAME", &vars(), &opts).unwrap(), "@@NAME");
    }

    #[test]
    fn test_invalid_prefix() {
        let opts = SubstitutionOptions::new("");
        assert_eq!(
            substitute("x", &vars(), &opts),
            Err(VarError::InvalidPrefix(String::new()))
        );
        assert!(validate_prefix("v").is_err());
        assert!(validate_prefix("%").is_ok());
    }

    #[test]
    fn test_referenced_variables() {
        let names = referenced_variables("$A/$B?x=$A&y=$$C", "$").unwrap();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    fn template() -> RequestTemplate {
        let mut template = RequestTemplate::new("get-item", "GET", "$BASE/item/$ID");
        template.headers.push(("Authorization".to_string(), "Bearer $NAME".to_string()));
        template.body = Some(r#"{"id": "$ID"}"#.to_string());
        template
    }

    #[test]
    fn test_render_request() {
        let request = render_request(&template(), &vars(), &SubstitutionOptions::default()).unwrap();

        assert_eq!(request.method, HttpMethod::GET);
        assert_eq!(request.url, "https://api.example.com/item/42");
        assert_eq!(request.header("authorization"), Some("Bearer v"));
        assert_eq!(request.body.as_deref(), Some(r#"{"id": "42"}"#));
    }

    #[test]
    fn test_render_reports_failing_part() {
        let mut template = template();
        template.headers.push(("X-Trace".to_string(), "$TRACE".to_string()));

        let err = render_request(&template, &vars(), &SubstitutionOptions::default()).unwrap_err();
        assert_eq!(
            err,
            RenderError::UnresolvedVariable {
                name: "TRACE".to_string(),
                part: RequestPart::Header("X-Trace".to_string()),
            }
        );
    }

    #[test]
    fn test_render_validates_template() {
        let no_method = RequestTemplate::new("a", "", "http://x");
        assert!(matches!(
            render_request(&no_method, &vars(), &SubstitutionOptions::default()),
            Err(RenderError::Validation { .. })
        ));

        let no_url = RequestTemplate::new("b", "GET", " ");
        let err = validate_template(&no_url).unwrap_err();
        assert_eq!(err.to_string(), "request template b has no URL set");

        let bad_method = RequestTemplate::new("c", "FETCH", "http://x");
        assert!(validate_template(&bad_method).is_err());
    }
}
