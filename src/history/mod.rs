//! Request history tracking and persistence.
//!
//! Every send that reaches the HTTP sender can be recorded as a
//! [`HistoryEntry`], including the steps of a flow run. Recording is switched
//! on per project with the `recordHistory` setting.
//!
//! # Features
//!
//! - Append-only JSONL storage
//! - Corrupted lines skipped on load
//! - Automatic history limit enforcement
//! - Sensitive header redaction and large body truncation
//!
//! # Example
//!
//! ```ignore
//! use reqflow::history::{append_entry, load_entries, HistoryConfig, HistoryEntry};
//!
//! let entry = HistoryEntry::new("login", request, send_time);
//! append_entry(&path, &entry, &HistoryConfig::default())?;
//! let entries = load_entries(&path)?;
//! ```

pub mod models;
pub mod storage;

pub use models::{HistoryEntry, HistoryError};
pub use storage::{append_entry, clear_history, load_entries, maintain_history_limit, HistoryConfig};
