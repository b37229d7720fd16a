//! Value extraction from response text.
//!
//! Two expression kinds are supported:
//!
//! - regular expressions with exactly one capture group; the first match wins
//! - a small JSONPath subset (`$.user.id`, `$.items[0].name`) evaluated against
//!   a JSON body

use regex::Regex;
use serde_json::Value as JsonValue;

/// Compiles a pattern and checks that it has exactly one capture group.
pub fn compile_single_group(pattern: &str) -> Result<Regex, String> {
    let re = Regex::new(pattern).map_err(|e| e.to_string())?;
    // captures_len counts the implicit whole-match group
    let groups = re.captures_len() - 1;
    if groups != 1 {
        return Err(format!(
            "pattern must have exactly one capture group, found {}",
            groups
        ));
    }
    Ok(re)
}

/// Applies a single-group regex to `text`, returning the first captured value.
///
/// A match whose group did not participate counts as no match.
pub fn extract_regex(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Checks the basic shape of a JSONPath expression.
///
/// The path must start with `$` and have balanced, properly ordered brackets.
pub fn validate_jsonpath(path: &str) -> bool {
    let path = path.trim();
    if !path.starts_with('$') {
        return false;
    }

    let mut depth = 0i32;
    for ch in path.chars() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0
}

/// Extracts a value from a JSON document by path.
///
/// Returns `None` when the body is not JSON or the path does not resolve.
pub fn extract_json_path(body: &str, path: &str) -> Option<String> {
    let json: JsonValue = serde_json::from_str(body).ok()?;
    let value = evaluate_jsonpath(&json, path)?;
    Some(json_value_to_string(value))
}

fn evaluate_jsonpath<'a>(json: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);

    let mut current = json;
    for segment in parse_jsonpath_segments(path) {
        current = match segment {
            PathSegment::Field(name) => current.get(name.as_str())?,
            PathSegment::ArrayIndex(index) => current.get(index)?,
        };
    }

    Some(current)
}

/// Represents a segment in a JSONPath expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    /// Object field access (e.g., "user", "name")
    Field(String),

    /// Array index access (e.g., [0], [5])
    ArrayIndex(usize),
}

/// Parses a JSONPath (without the leading `$`) into segments.
///
/// - "user.name" -> [Field("user"), Field("name")]
/// - "items[0].id" -> [Field("items"), ArrayIndex(0), Field("id")]
/// - `["odd.key"]` -> [Field("odd.key")]
fn parse_jsonpath_segments(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }

                let mut inner = String::new();
                for next_ch in chars.by_ref() {
                    if next_ch == ']' {
                        break;
                    }
                    inner.push(next_ch);
                }

                let inner = inner.trim();
                if let Ok(index) = inner.parse::<usize>() {
                    segments.push(PathSegment::ArrayIndex(index));
                } else {
                    let key = inner.trim_matches(|c| c == '"' || c == '\'');
                    segments.push(PathSegment::Field(key.to_string()));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Field(current));
    }

    segments
}

/// Converts a JSON value to its captured string form.
///
/// Strings lose their quotes; numbers, booleans and null use their JSON text;
/// objects and arrays are serialized compactly.
fn json_value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => "null".to_string(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}
