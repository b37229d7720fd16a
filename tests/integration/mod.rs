//! Integration tests module for reqflow
//!
//! Shared helpers for tests that drive a file-backed project against a local
//! mock server.

pub mod flow_run_test;
pub mod project_store_test;

use reqflow::executor::{ExecutionConfig, ReqwestSender};
use reqflow::project::{FileProjectStore, Project, ProjectStore};
use std::path::PathBuf;
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Creates a project file in a fresh temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn temp_project(configure: impl FnOnce(&mut Project)) -> (TempDir, PathBuf, FileProjectStore) {
    init_test_env();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(".reqflow").join("project.json");

    let (mut store, mut project) =
        FileProjectStore::init(&path, Some("integration")).expect("Failed to init project");
    configure(&mut project);
    store.save(&project).expect("Failed to save project");

    (dir, path, store)
}

/// A real HTTP sender with a short timeout.
pub fn sender() -> ReqwestSender {
    ReqwestSender::new(ExecutionConfig::new(5)).expect("Failed to build sender")
}
