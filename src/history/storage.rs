//! Persistent storage for request history.
//!
//! History is kept in a JSONL (JSON Lines) file: one entry per line, appended
//! in send order. A corrupted line only loses that entry; loading skips it with
//! a warning and carries on.

use super::models::{HistoryEntry, HistoryError};
use crate::config::ProjectSettings;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Configuration for history storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of entries to keep in history.
    pub max_entries: usize,

    /// Whether to redact sensitive headers before storage.
    pub sanitize_sensitive_headers: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::from_settings(&ProjectSettings::default())
    }
}

impl HistoryConfig {
    /// Creates a HistoryConfig from project settings.
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        Self {
            max_entries: settings.max_history_entries,
            sanitize_sensitive_headers: true,
        }
    }
}

/// Appends a history entry to the history file.
///
/// The entry is sanitized and truncated according to `config`, written as a
/// single JSON line and flushed. Parent directories are created as needed.
/// When the file grows past `config.max_entries`, the oldest entries are
/// dropped.
///
/// # Errors
///
/// Returns `HistoryError` if the file cannot be opened or written, or the
/// entry cannot be serialized.
pub fn append_entry(
    history_path: &Path,
    entry: &HistoryEntry,
    config: &HistoryConfig,
) -> Result<(), HistoryError> {
    if let Some(dir) = history_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let prepared_entry = entry.prepare_for_storage(config.sanitize_sensitive_headers);
    let json = serde_json::to_string(&prepared_entry)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(history_path)?;
    writeln!(file, "{}", json)?;
    file.flush()?;
    drop(file);

    maintain_history_limit(history_path, config.max_entries)?;
    Ok(())
}

/// Loads all history entries, oldest first.
///
/// A missing file is an empty history. Corrupted lines are skipped with a
/// warning.
pub fn load_entries(history_path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    if !history_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(history_path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut corrupted_lines = 0;

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = match line_result {
            Ok(line) => line,
            Err(e) => {
                corrupted_lines += 1;
                log::warn!("Error reading history line {}: {}", line_num + 1, e);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                corrupted_lines += 1;
                log::warn!(
                    "Skipping corrupted history entry at line {}: {}",
                    line_num + 1,
                    e
                );
            }
        }
    }

    if corrupted_lines > 0 && corrupted_lines > entries.len() {
        log::warn!(
            "History file has significant corruption ({} corrupted lines, {} valid entries)",
            corrupted_lines,
            entries.len()
        );
    }

    Ok(entries)
}

/// Counts newline-terminated lines without parsing them.
fn count_lines(history_path: &Path) -> Result<usize, HistoryError> {
    let mut reader = BufReader::new(File::open(history_path)?);
    let mut count = 0;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == b'\n').count();
        let len = buf.len();
        reader.consume(len);
    }
    Ok(count)
}

/// Drops the oldest entries so at most `max_entries` remain.
///
/// Entries are only parsed when the file has more lines than `max_entries`.
/// The file is then rewritten through a temporary file and renamed into
/// place, and corrupted lines do not survive the rewrite.
///
/// # Returns
///
/// The number of entries removed.
pub fn maintain_history_limit(history_path: &Path, max_entries: usize) -> Result<usize, HistoryError> {
    if !history_path.exists() {
        return Ok(0);
    }
    if count_lines(history_path)? <= max_entries {
        return Ok(0);
    }

    let entries = load_entries(history_path)?;
    let entries_to_remove = entries.len().saturating_sub(max_entries);
    let temp_path = history_path.with_extension("jsonl.tmp");
    let mut temp_file = File::create(&temp_path)?;

    for entry in entries.iter().skip(entries_to_remove) {
        let json = serde_json::to_string(entry)?;
        writeln!(temp_file, "{}", json)?;
    }

    temp_file.flush()?;
    drop(temp_file);

    fs::rename(&temp_path, history_path)?;

    log::debug!("dropped {} old history entries", entries_to_remove);
    Ok(entries_to_remove)
}

/// Deletes the history file, removing all stored entries.
pub fn clear_history(history_path: &Path) -> Result<(), HistoryError> {
    if history_path.exists() {
        fs::remove_file(history_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, HttpRequest, HttpResponse};
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(template: &str) -> HistoryEntry {
        let mut request = HttpRequest::new(HttpMethod::GET, "https://api.example.com/");
        request.add_header("Authorization", "Bearer secret");
        HistoryEntry::new(template, request, Utc::now())
            .with_response(HttpResponse::new(200, "OK"), Utc::now())
    }

    #[test]
    fn test_append_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let config = HistoryConfig::default();

        append_entry(&path, &entry("a"), &config).unwrap();
        append_entry(&path, &entry("b"), &config).unwrap();

        let entries = load_entries(&path).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.template.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            entries[0].request.header("authorization"),
            Some(crate::history::models::REDACTED)
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let entries = load_entries(&dir.path().join("none.jsonl")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_corrupted_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let config = HistoryConfig::default();

        append_entry(&path, &entry("a"), &config).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        drop(file);
        append_entry(&path, &entry("b"), &config).unwrap();

        let entries = load_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_history_limit_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let config = HistoryConfig {
            max_entries: 2,
            sanitize_sensitive_headers: false,
        };

        for name in ["a", "b", "c"] {
            append_entry(&path, &entry(name), &config).unwrap();
        }

        let entries = load_entries(&path).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.template.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(entries[0].request.header("authorization"), Some("Bearer secret"));
    }

    #[test]
    fn test_file_under_limit_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let config = HistoryConfig {
            max_entries: 3,
            sanitize_sensitive_headers: true,
        };

        append_entry(&path, &entry("a"), &config).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);
        append_entry(&path, &entry("b"), &config).unwrap();

        assert_eq!(count_lines(&path).unwrap(), 3);
        assert!(fs::read_to_string(&path).unwrap().contains("{not json"));

        // the fourth line pushes it over the limit; the rewrite drops the bad line
        append_entry(&path, &entry("c"), &config).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("{not json"));
        let names: Vec<String> = load_entries(&path).unwrap().into_iter().map(|e| e.template).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_clear_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        append_entry(&path, &entry("a"), &HistoryConfig::default()).unwrap();

        clear_history(&path).unwrap();
        assert!(!path.exists());
        clear_history(&path).unwrap();
    }
}
