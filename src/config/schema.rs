//! Settings schema for a reqflow project.
//!
//! Settings live in the project file under the `settings` key. Every field has a
//! default, so older project files and hand-written ones with only a few keys
//! load cleanly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::variables::{validate_prefix, DEFAULT_VAR_PREFIX};

/// Per-project settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    /// Whether sends and flow steps are appended to the history file.
    ///
    /// Defaults to false.
    #[serde(default)]
    pub record_history: bool,

    /// Maximum age of a session cookie in seconds, regardless of its own expiry.
    ///
    /// Defaults to 86400 (24 hours). Must be greater than 0.
    #[serde(default = "default_cookie_lifetime_secs")]
    pub cookie_lifetime_secs: u64,

    /// Symbol that starts a variable token in templates.
    ///
    /// Defaults to `$`. Must be non-empty and contain no letters, digits,
    /// underscores or whitespace.
    #[serde(default = "default_var_prefix")]
    pub var_prefix: String,

    /// History file path, relative to the project file's directory.
    #[serde(default = "default_history_file")]
    pub history_file: String,

    /// Session (cookie jar) file path, relative to the project file's directory.
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Request timeout in seconds.
    ///
    /// Defaults to 30. Must be greater than 0.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether to follow HTTP redirects automatically. Defaults to true.
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow. Defaults to 10.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Maximum number of entries kept in the history file.
    ///
    /// Older entries are dropped when the file is compacted. Defaults to 1000.
    /// Must be greater than 0.
    #[serde(default = "default_max_history_entries")]
    pub max_history_entries: usize,

    /// Headers added to every request that does not set them itself.
    #[serde(default = "default_headers")]
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            record_history: false,
            cookie_lifetime_secs: default_cookie_lifetime_secs(),
            var_prefix: default_var_prefix(),
            history_file: default_history_file(),
            session_file: default_session_file(),
            timeout_secs: default_timeout_secs(),
            follow_redirects: default_follow_redirects(),
            max_redirects: default_max_redirects(),
            max_history_entries: default_max_history_entries(),
            default_headers: default_headers(),
        }
    }
}

impl ProjectSettings {
    /// Validates the settings and returns a descriptive error for the first bad value.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeoutSecs must be greater than 0".to_string());
        }

        if self.cookie_lifetime_secs == 0 {
            return Err("cookieLifetimeSecs must be greater than 0".to_string());
        }

        if self.max_history_entries == 0 {
            return Err("maxHistoryEntries must be greater than 0".to_string());
        }

        if validate_prefix(&self.var_prefix).is_err() {
            return Err(format!(
                "varPrefix {:?} must be non-empty and contain no letters, digits, underscores or spaces",
                self.var_prefix
            ));
        }

        if self.history_file.trim().is_empty() {
            return Err("historyFile must not be empty".to_string());
        }

        if self.session_file.trim().is_empty() {
            return Err("sessionFile must not be empty".to_string());
        }

        Ok(())
    }

    /// Returns the request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the cookie lifetime as a `Duration`.
    pub fn cookie_lifetime(&self) -> Duration {
        Duration::from_secs(self.cookie_lifetime_secs)
    }
}

// Default value functions for serde

fn default_cookie_lifetime_secs() -> u64 {
    24 * 60 * 60
}

fn default_var_prefix() -> String {
    DEFAULT_VAR_PREFIX.to_string()
}

fn default_history_file() -> String {
    "history.jsonl".to_string()
}

fn default_session_file() -> String {
    "session.json".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_follow_redirects() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    10
}

fn default_max_history_entries() -> usize {
    1000
}

fn default_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(
        "User-Agent".to_string(),
        concat!("reqflow/", env!("CARGO_PKG_VERSION")).to_string(),
    );
    headers
}
