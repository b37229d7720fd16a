//! Flow execution against a local mock server
//!
//! These tests run flows end to end through the file-backed store and the
//! reqwest sender: substitution, captures feeding later steps, cookies, abort
//! handling and history.

use super::{sender, temp_project};
use reqflow::commands::{self, CommandError, SendOptions};
use reqflow::flow::{FlowRunner, RunState, RunnerError, StepError};
use reqflow::project::{FileProjectStore, Flow, Project, ProjectStore, RequestTemplate};
use reqflow::variables::{CaptureSpec, Scope};
use std::collections::HashMap;

/// Project with `create` (captures X from the body) and `fetch` (uses $X).
fn item_project(base: &str) -> impl FnOnce(&mut Project) + '_ {
    move |project: &mut Project| {
        project.settings.record_history = true;
        project.vars.set(Scope::Default, "BASE", base);
        project
            .add_template(
                RequestTemplate::new("create", "POST", "$BASE/item")
                    .with_header("Content-Type", "application/json")
                    .with_body(r#"{"name":"$NAME"}"#)
                    .with_capture(CaptureSpec::json_path("X", "$.id")),
            )
            .unwrap();
        project
            .add_template(RequestTemplate::new("fetch", "GET", "$BASE/item/$X"))
            .unwrap();
        project
            .add_flow(Flow::new("item", ["create", "fetch"]))
            .unwrap();
    }
}

#[test]
fn test_captured_id_used_by_next_step() {
    let mut server = mockito::Server::new();
    let create = server
        .mock("POST", "/item")
        .match_body(r#"{"name":"widget"}"#)
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"42"}"#)
        .expect(1)
        .create();
    let fetch = server
        .mock("GET", "/item/42")
        .with_status(200)
        .with_body("found")
        .expect(1)
        .create();

    let url = server.url();
    let (_dir, path, mut store) = temp_project(item_project(&url));
    let mut project = store.load().unwrap();
    project
        .vars
        .set_overrides(HashMap::from([("NAME".to_string(), "widget".to_string())]));
    let mut session = store.load_session().unwrap();

    let sender = sender();
    let run = FlowRunner::new(&sender, &mut store)
        .run(&mut project, &mut session, "item")
        .unwrap();

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.steps[1].request.url, format!("{}/item/42", url));
    assert_eq!(run.steps[1].response.body_lossy(), "found");
    create.assert();
    fetch.assert();

    assert!(path.parent().unwrap().join("history.jsonl").exists());
    let entries = store.load_history().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].captures.get("X").map(String::as_str), Some("42"));
    assert_eq!(entries[1].flow.as_deref(), Some("item"));
}

#[test]
fn test_abort_at_deleted_template_keeps_earlier_history() {
    let mut server = mockito::Server::new();
    let create = server
        .mock("POST", "/item")
        .with_status(201)
        .with_body(r#"{"id":"7"}"#)
        .create();
    let fetch = server.mock("GET", "/item/7").expect(0).create();

    let url = server.url();
    let (_dir, _path, mut store) = temp_project(item_project(&url));
    let mut project = store.load().unwrap();
    project.vars.set(Scope::Default, "NAME", "n");
    project.remove_template("fetch").unwrap();
    store.save(&project).unwrap();

    let sender = sender();
    let run = FlowRunner::new(&sender, &mut store)
        .run(&mut project, &mut Default::default(), "item")
        .unwrap();

    assert_eq!(run.state, RunState::Aborted);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.index, 1);
    assert!(matches!(failure.error, StepError::UnresolvedStep(_)));

    let entries = store.load_history().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].template, "create");
    create.assert();
    fetch.assert();
}

#[test]
fn test_server_error_is_recorded_not_fatal() {
    let mut server = mockito::Server::new();
    let _create = server
        .mock("POST", "/item")
        .with_status(500)
        .with_body(r#"{"id":"1"}"#)
        .create();
    let _fetch = server.mock("GET", "/item/1").with_status(404).create();

    let url = server.url();
    let (_dir, _path, mut store) = temp_project(item_project(&url));
    let mut out = Vec::new();
    commands::exec(
        &mut store,
        &sender(),
        "item",
        HashMap::from([("NAME".to_string(), "x".to_string())]),
        &mut out,
    )
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("0: create HTTP/1.1 500 Internal Server Error"));
    assert!(text.contains("1: fetch HTTP/1.1 404 Not Found"));
}

#[test]
fn test_session_cookie_reaches_later_steps_and_persists() {
    let mut server = mockito::Server::new();
    let _login = server
        .mock("POST", "/login")
        .with_status(204)
        .with_header("set-cookie", "sid=abc; Path=/")
        .create();
    let me = server
        .mock("GET", "/me")
        .match_header("cookie", "sid=abc")
        .with_status(200)
        .expect(2)
        .create();

    let url = server.url();
    let (_dir, _path, mut store) = temp_project(|project| {
        project.vars.set(Scope::Default, "BASE", url.as_str());
        project
            .add_template(RequestTemplate::new("login", "POST", "$BASE/login"))
            .unwrap();
        project
            .add_template(RequestTemplate::new("me", "GET", "$BASE/me"))
            .unwrap();
        project
            .add_flow(Flow::new("auth", ["login", "me"]))
            .unwrap();
    });

    commands::exec(&mut store, &sender(), "auth", HashMap::new(), &mut Vec::new()).unwrap();
    assert_eq!(store.load_session().unwrap().len(), 1);

    // a later single send reuses the saved session
    commands::send(&mut store, &sender(), "me", &SendOptions::default(), &mut Vec::new()).unwrap();
    me.assert();
}

#[test]
fn test_cookie_set_on_redirect_is_kept() {
    let mut server = mockito::Server::new();
    let _login = server
        .mock("POST", "/login")
        .with_status(302)
        .with_header("location", "/home")
        .with_header("set-cookie", "sid=abc; Path=/")
        .create();
    let home = server
        .mock("GET", "/home")
        .match_header("cookie", "sid=abc")
        .with_status(200)
        .with_body("welcome")
        .expect(1)
        .create();

    let url = server.url();
    let (_dir, _path, mut store) = temp_project(|project| {
        project.vars.set(Scope::Default, "BASE", url.as_str());
        project
            .add_template(RequestTemplate::new("login", "POST", "$BASE/login"))
            .unwrap();
    });

    let mut out = Vec::new();
    commands::send(&mut store, &sender(), "login", &SendOptions::default(), &mut out).unwrap();

    assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.1 200 OK"));
    home.assert();
    let session = store.load_session().unwrap();
    assert_eq!(session.len(), 1);
    assert_eq!(session.cookies().next().unwrap().value, "abc");
}

#[test]
fn test_transport_failure_aborts_run() {
    let (_dir, _path, mut store) = temp_project(|project| {
        project.settings.record_history = true;
        project
            .add_template(RequestTemplate::new("dead", "GET", "http://127.0.0.1:1/"))
            .unwrap();
        project
            .add_template(RequestTemplate::new("never", "GET", "http://127.0.0.1:1/never"))
            .unwrap();
        project
            .add_flow(Flow::new("broken", ["dead", "never"]))
            .unwrap();
    });

    let err = commands::exec(&mut store, &sender(), "broken", HashMap::new(), &mut Vec::new())
        .unwrap_err();
    match err {
        CommandError::Run(RunnerError::Aborted { failure, .. }) => {
            assert_eq!(failure.index, 0);
            assert!(matches!(failure.error, StepError::Transport(_)));
        }
        other => panic!("unexpected error: {}", other),
    }

    let entries = store.load_history().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].error.is_some());
}

#[test]
fn test_send_promotes_capture_into_environment() {
    let mut server = mockito::Server::new();
    let _token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("x-token", "t-99")
        .create();

    let url = server.url();
    let (_dir, path, mut store) = temp_project(|project| {
        project.vars.use_environment("dev");
        project
            .add_template(
                RequestTemplate::new("token", "POST", "$BASE/token")
                    .with_capture(CaptureSpec::header("TOKEN", "X-Token")),
            )
            .unwrap();
    });

    let opts = SendOptions {
        overrides: commands::parse_var_overrides(&[format!("BASE:{}", url)]).unwrap(),
        dry_run: false,
    };
    commands::send(&mut store, &sender(), "token", &opts, &mut Vec::new()).unwrap();

    let project = FileProjectStore::new(&path).load().unwrap();
    assert_eq!(project.vars.get_in(Scope::Environment, "TOKEN"), Some("t-99"));
    assert_eq!(project.vars.get("BASE"), None);
}
