//! Configuration handling for reqflow projects.
//!
//! Settings are stored inside the project file and passed explicitly to the
//! pieces that need them; there is no process-wide configuration state.

pub mod schema;

pub use schema::ProjectSettings;

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Returns a copy of `settings` with one camelCase key replaced.
///
/// `raw` is read as JSON when it parses as JSON and as a plain string
/// otherwise, so `30`, `true` and `logs/history.jsonl` all work from a shell.
/// The result is validated before it is returned.
///
/// # Example
///
/// ```
/// use reqflow::config::{with_setting, ProjectSettings};
///
/// let settings = with_setting(&ProjectSettings::default(), "timeoutSecs", "60").unwrap();
/// assert_eq!(settings.timeout_secs, 60);
/// assert!(with_setting(&settings, "timeoutSecs", "0").is_err());
/// ```
pub fn with_setting(settings: &ProjectSettings, key: &str, raw: &str) -> Result<ProjectSettings, String> {
    let mut value = serde_json::to_value(settings).map_err(|e| e.to_string())?;
    let Value::Object(fields) = &mut value else {
        return Err("settings do not serialize to an object".to_string());
    };

    if !fields.contains_key(key) {
        let known: Vec<&str> = fields.keys().map(String::as_str).collect();
        return Err(format!("unknown setting {:?}; must be one of {}", key, known.join(", ")));
    }

    let parsed = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    fields.insert(key.to_string(), parsed);

    let updated: ProjectSettings =
        serde_json::from_value(value).map_err(|e| format!("invalid value for {}: {}", key, e))?;
    updated.validate()?;
    Ok(updated)
}

/// Resolves a settings path against the directory holding the project file.
///
/// Absolute paths are returned unchanged.
pub fn resolve_path(project_file: &Path, configured: &str) -> PathBuf {
    let configured = Path::new(configured);
    if configured.is_absolute() {
        return configured.to_path_buf();
    }

    project_file
        .parent()
        .map(|dir| dir.join(configured))
        .unwrap_or_else(|| configured.to_path_buf())
}
