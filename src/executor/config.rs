//! HTTP request execution configuration.
//!
//! This module defines configuration options for HTTP request execution,
//! derived from a project's settings.

use crate::config::ProjectSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for HTTP request execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Request timeout in seconds.
    ///
    /// Maximum time to wait for a complete response (including connection,
    /// headers, and body download). Defaults to 30 seconds.
    pub timeout_secs: u64,

    /// Headers added to requests that do not already set them.
    pub default_headers: BTreeMap<String, String>,
}

impl ExecutionConfig {
    /// Creates a new ExecutionConfig with the given timeout and no default headers.
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            default_headers: BTreeMap::new(),
        }
    }

    /// Creates an ExecutionConfig from project settings.
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        Self {
            timeout_secs: settings.timeout_secs,
            default_headers: settings.default_headers.clone(),
        }
    }

    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from_settings(&ProjectSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_new() {
        let config = ExecutionConfig::new(60);
        assert_eq!(config.timeout_secs, 60);
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_execution_config_default() {
        let config = ExecutionConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.default_headers.contains_key("User-Agent"));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = ProjectSettings::default();
        settings.timeout_secs = 5;
        settings.default_headers.clear();

        let config = ExecutionConfig::from_settings(&settings);
        assert_eq!(config.timeout_duration(), std::time::Duration::from_secs(5));
        assert!(config.default_headers.is_empty());
    }
}
