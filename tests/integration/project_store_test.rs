//! Project file workflows
//!
//! These tests drive the command handlers against a project on disk and check
//! what a later invocation would load.

use super::temp_project;
use reqflow::commands::{self, CommandError, FlowsAction, ReqsAction, SettingsAction, VarsAction};
use reqflow::flow::StepEdit;
use reqflow::project::{FileProjectStore, Flow, ProjectError, ProjectStore, RequestTemplate};
use reqflow::variables::Scope;
use std::fs;
use tempfile::TempDir;

fn five_step_project() -> (TempDir, std::path::PathBuf, FileProjectStore) {
    temp_project(|project| {
        for name in ["A", "B", "C", "D", "E", "X"] {
            project
                .add_template(RequestTemplate::new(name, "GET", "http://localhost/"))
                .unwrap();
        }
        project
            .add_flow(Flow::new("five", ["A", "B", "C", "D", "E"]))
            .unwrap();
    })
}

fn reload_steps(path: &std::path::Path) -> Vec<String> {
    FileProjectStore::new(path)
        .load()
        .unwrap()
        .flow("five")
        .unwrap()
        .template_names()
        .into_iter()
        .map(String::from)
        .collect()
}

#[test]
fn test_init_command_refuses_existing_project() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.json");

    let mut out = Vec::new();
    commands::init(&path, Some("demo"), &mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().starts_with("Initialized project demo"));

    let err = commands::init(&path, None, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, CommandError::Project(ProjectError::AlreadyExists(_))));
}

#[test]
fn test_compound_edit_persists() {
    let (_dir, path, mut store) = five_step_project();
    let edit = StepEdit::new().remove(3).remove(1).insert(0, "X").move_step(2, 0);

    commands::flows(
        &mut store,
        FlowsAction::Edit {
            flow: "five".into(),
            sets: vec![],
            edit,
        },
        &mut Vec::new(),
    )
    .unwrap();

    assert_eq!(reload_steps(&path), vec!["C", "X", "A", "E"]);
}

#[test]
fn test_partial_edit_persists_applied_operations() {
    let (_dir, path, mut store) = five_step_project();
    let edit = StepEdit::new().remove(4).remove(0).append("X").move_step(0, 1).move_step(0, 10);

    let err = commands::flows(
        &mut store,
        FlowsAction::Edit {
            flow: "five".into(),
            sets: vec![],
            edit,
        },
        &mut Vec::new(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("4 earlier change(s) were saved"));
    // removals, then the append, then the first move
    assert_eq!(reload_steps(&path), vec!["C", "B", "D", "X"]);
}

#[test]
fn test_deleting_template_makes_flow_non_execable() {
    let (_dir, path, mut store) = five_step_project();

    let mut out = Vec::new();
    commands::reqs(&mut store, ReqsAction::Delete { name: "c".into() }, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("flow five is no longer execable"));

    let project = FileProjectStore::new(&path).load().unwrap();
    let flow = project.flow("five").unwrap();
    assert!(!project.is_execable(flow));
    assert_eq!(project.missing_templates(flow), vec!["C"]);
}

#[test]
fn test_variables_survive_reload_but_overrides_do_not() {
    let (_dir, path, mut store) = five_step_project();
    commands::vars(
        &mut store,
        VarsAction::Set {
            name: "HOST".into(),
            value: "staging".into(),
        },
        Some("staging"),
        &mut Vec::new(),
    )
    .unwrap();

    let mut project = FileProjectStore::new(&path).load().unwrap();
    project.vars.set(Scope::Override, "ONCE", "1");
    project.vars.use_environment("staging");
    assert_eq!(project.vars.get("HOST"), Some("staging"));

    let mut store = FileProjectStore::new(&path);
    store.save(&project).unwrap();
    let reloaded = store.load().unwrap();
    assert_eq!(reloaded.vars.get("ONCE"), None);
    assert_eq!(reloaded.vars.current_environment(), "STAGING");
}

#[test]
fn test_corrupt_history_lines_are_skipped() {
    let (_dir, path, store) = temp_project(|project| {
        project.settings.history_file = "logs/history.jsonl".to_string();
    });
    let mut store = store;
    store.load().unwrap();

    let history_path = path.parent().unwrap().join("logs").join("history.jsonl");
    assert_eq!(store.history_path(), history_path);
    fs::create_dir_all(history_path.parent().unwrap()).unwrap();
    fs::write(&history_path, "not json\n").unwrap();

    assert!(store.load_history().unwrap().is_empty());

    let mut out = Vec::new();
    commands::history(&mut store, false, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "(none)\n");

    commands::history(&mut store, true, &mut Vec::new()).unwrap();
    assert!(!history_path.exists());
}

#[test]
fn test_settings_command_persists_and_moves_history() {
    let (_dir, path, mut store) = five_step_project();
    commands::settings(
        &mut store,
        SettingsAction::Set {
            key: "historyFile".into(),
            value: "out/h.jsonl".into(),
        },
        &mut Vec::new(),
    )
    .unwrap();

    let mut reloaded = FileProjectStore::new(&path);
    assert_eq!(reloaded.load().unwrap().settings.history_file, "out/h.jsonl");
    assert_eq!(
        reloaded.history_path(),
        path.parent().unwrap().join("out").join("h.jsonl")
    );
}

#[test]
fn test_custom_variable_prefix() {
    let (_dir, _path, mut store) = temp_project(|project| {
        project.settings.var_prefix = "@".to_string();
        project.vars.set(Scope::Default, "HOST", "example.com");
        project
            .add_template(RequestTemplate::new("r", "GET", "http://@HOST/$literal"))
            .unwrap();
    });

    let mut out = Vec::new();
    commands::send(
        &mut store,
        &super::sender(),
        "r",
        &commands::SendOptions {
            dry_run: true,
            ..Default::default()
        },
        &mut out,
    )
    .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "GET http://example.com/$literal\n");
}
