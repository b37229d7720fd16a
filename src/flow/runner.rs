//! Flow runner.
//!
//! Executes a flow's steps one after another. Each step renders its template
//! against the current variables, sends it through the session (cookies are
//! attached and absorbed on every redirect hop) and then applies the template's
//! captures so the next step can use them.

use crate::executor::{send_with_session, HttpSender, RedirectPolicy, RequestError};
use crate::history::HistoryEntry;
use crate::models::{HttpMethod, HttpRequest, HttpResponse};
use crate::project::{Project, ProjectError, ProjectStore, RequestTemplate};
use crate::session::Session;
use crate::variables::{apply_captures, render_request, CaptureFailure, CaptureReport, RenderError, Scope};
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle of one flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        f.write_str(state)
    }
}

/// Why a single step failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("no request template named {0:?}")]
    UnresolvedStep(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("transport error: {0}")]
    Transport(#[from] RequestError),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureFailure),

    #[error("could not record history: {0}")]
    History(#[from] ProjectError),
}

/// Result of one step that completed.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Template that was sent.
    pub template: String,
    /// The request as sent.
    pub request: HttpRequest,
    /// The response received.
    pub response: HttpResponse,
    /// Captures applied from the response.
    pub captures: CaptureReport,
    pub send_time: DateTime<Utc>,
    pub recv_time: DateTime<Utc>,
}

/// The step a run stopped at.
#[derive(Debug, thiserror::Error)]
#[error("step {index} ({template}): {error}")]
pub struct StepFailure {
    /// 0-based step index.
    pub index: usize,
    /// Template the step referenced.
    pub template: String,
    #[source]
    pub error: StepError,
}

/// Errors that prevent or end a flow run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("no flow named {0:?}")]
    FlowNotFound(String),

    #[error("flow {flow} aborted at {failure}")]
    Aborted {
        flow: String,
        #[source]
        failure: StepFailure,
    },
}

/// Record of one flow execution.
#[derive(Debug)]
pub struct FlowRun {
    /// Name of the flow that ran.
    pub flow: String,
    /// Final state.
    pub state: RunState,
    /// Completed steps, in order.
    pub steps: Vec<StepReport>,
    /// The failing step of an aborted run.
    pub failure: Option<StepFailure>,
}

impl FlowRun {
    fn new(flow: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            state: RunState::Pending,
            steps: Vec::new(),
            failure: None,
        }
    }

    fn abort(&mut self, index: usize, template: &str, error: StepError) {
        log::warn!("flow {} aborted at step {}: {}", self.flow, index, error);
        self.state = RunState::Aborted;
        self.failure = Some(StepFailure {
            index,
            template: template.to_string(),
            error,
        });
    }

    /// Checks if every step completed.
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Turns an aborted run into an error.
    pub fn into_result(self) -> Result<Self, RunnerError> {
        match self.failure {
            Some(failure) => Err(RunnerError::Aborted {
                flow: self.flow,
                failure,
            }),
            None => Ok(self),
        }
    }
}

/// Sends one template and applies its captures.
///
/// Used by the flow runner for each step and by single sends. Cookies returned
/// by the server are absorbed into `session` whether or not the captures
/// succeed. When the project records history, exactly one entry is appended per
/// call, failed or not. A template that does not render is recorded with its
/// unrendered text as the request.
///
/// # Arguments
///
/// * `template` - The template to send
/// * `flow` - Name of the flow the step belongs to, if any
/// * `project` - Supplies variables and settings; captures are written to its flow-run scope
/// * `session` - Cookie jar read before and updated after the send
/// * `sender` - Transport
/// * `store` - Receives the history entry
pub fn execute_step(
    template: &RequestTemplate,
    flow: Option<&str>,
    project: &mut Project,
    session: &mut Session,
    sender: &dyn HttpSender,
    store: &mut dyn ProjectStore,
) -> Result<StepReport, StepError> {
    let snapshot = project.vars.snapshot();
    let rendered = match render_request(template, &snapshot, &project.substitution_options()) {
        Ok(rendered) => rendered,
        Err(error) => {
            let entry = HistoryEntry::new(template.name.clone(), unrendered(template), Utc::now())
                .with_error(error.to_string());
            record(project, store, entry, flow, true);
            return Err(StepError::Render(error));
        }
    };

    // the first hop as it goes out, for the report and history
    let mut request = rendered.clone();
    session.attach(&mut request);

    log::debug!("sending {} {} ({})", request.method, request.url, template.name);
    let attempted_at = Utc::now();
    let policy = RedirectPolicy::from_settings(&project.settings);

    let outcome = match send_with_session(sender, &rendered, session, policy) {
        Ok(exchange) => {
            if exchange.redirects > 0 {
                log::debug!("{} ended at {} after {} redirect(s)", template.name, exchange.final_url, exchange.redirects);
            }
            exchange.outcome
        }
        Err(error) => {
            let entry = HistoryEntry::new(template.name.clone(), request, attempted_at)
                .with_error(error.to_string());
            record(project, store, entry, flow, true);
            return Err(StepError::Transport(error));
        }
    };

    let captures = apply_captures(template.captures.values(), &outcome.response, &mut project.vars);

    let entry = HistoryEntry::new(template.name.clone(), request.clone(), outcome.send_time)
        .with_response(outcome.response.clone(), outcome.recv_time);

    match captures {
        Ok(captures) => {
            let entry = entry.with_captures(captures.captured.clone());
            if let Some(err) = record(project, store, entry, flow, false) {
                return Err(StepError::History(err));
            }
            Ok(StepReport {
                template: template.name.clone(),
                request,
                response: outcome.response,
                captures,
                send_time: outcome.send_time,
                recv_time: outcome.recv_time,
            })
        }
        Err(failure) => {
            let entry = entry
                .with_captures(failure.partial.captured.clone())
                .with_error(failure.to_string());
            record(project, store, entry, flow, true);
            Err(StepError::Capture(failure))
        }
    }
}

/// The template as written, for history entries of steps that did not render.
fn unrendered(template: &RequestTemplate) -> HttpRequest {
    let method = template.method.parse().unwrap_or(HttpMethod::GET);
    let mut request = HttpRequest::new(method, template.url.clone());
    request.headers = template.headers.clone();
    request.body = template.body.clone();
    request
}

/// Appends a history entry when the project records history.
///
/// Returns the storage error unless the step already failed, in which case the
/// step's own error wins and the storage error is only logged.
fn record(
    project: &Project,
    store: &mut dyn ProjectStore,
    entry: HistoryEntry,
    flow: Option<&str>,
    step_failed: bool,
) -> Option<ProjectError> {
    if !project.settings.record_history {
        return None;
    }

    let entry = match flow {
        Some(flow) => entry.in_flow(flow),
        None => entry,
    };

    match store.append_history(&entry) {
        Ok(()) => None,
        Err(err) if step_failed => {
            log::warn!("could not record history for {}: {}", entry.template, err);
            None
        }
        Err(err) => Some(err),
    }
}

/// Runs flows against a sender, recording history in a store.
pub struct FlowRunner<'a> {
    sender: &'a dyn HttpSender,
    store: &'a mut dyn ProjectStore,
}

impl<'a> FlowRunner<'a> {
    pub fn new(sender: &'a dyn HttpSender, store: &'a mut dyn ProjectStore) -> Self {
        Self { sender, store }
    }

    /// Runs the named flow to completion or to its first failing step.
    ///
    /// The flow-run scope is cleared first, so captures never carry over from an
    /// earlier run. One-time overrides already set on `project.vars` apply to
    /// every step.
    ///
    /// # Returns
    ///
    /// The run record, `Completed` or `Aborted`. Only a missing flow is an
    /// error here; use [`FlowRun::into_result`] to treat an abort as one.
    pub fn run(
        &mut self,
        project: &mut Project,
        session: &mut Session,
        flow_name: &str,
    ) -> Result<FlowRun, RunnerError> {
        let flow = project
            .flow(flow_name)
            .cloned()
            .ok_or_else(|| RunnerError::FlowNotFound(flow_name.to_string()))?;

        let mut run = FlowRun::new(flow.name.clone());
        project.vars.clear(Scope::FlowRun);
        run.state = RunState::Running;
        log::info!("running flow {} ({} steps)", flow.name, flow.len());

        for (index, step) in flow.steps.iter().enumerate() {
            // cloned so captures can write into project.vars while the template is in use
            let template = match project.template(&step.template) {
                Some(template) => template.clone(),
                None => {
                    run.abort(index, &step.template, StepError::UnresolvedStep(step.template.clone()));
                    return Ok(run);
                }
            };

            match execute_step(&template, Some(&flow.name), project, session, self.sender, &mut *self.store) {
                Ok(report) => {
                    log::debug!("step {} ({}): {}", index, template.name, report.response.status_line());
                    run.steps.push(report);
                }
                Err(error) => {
                    run.abort(index, &template.name, error);
                    return Ok(run);
                }
            }
        }

        run.state = RunState::Completed;
        log::info!("flow {} completed", flow.name);
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SendOutcome;
    use crate::project::{Flow, MemoryProjectStore};
    use crate::variables::{CaptureSpec, OnMissing};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned responses and records the requests it was given.
    struct ScriptedSender {
        replies: RefCell<VecDeque<Result<HttpResponse, RequestError>>>,
        sent: RefCell<Vec<HttpRequest>>,
    }

    impl ScriptedSender {
        fn new(replies: Vec<Result<HttpResponse, RequestError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn urls(&self) -> Vec<String> {
            self.sent.borrow().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl HttpSender for ScriptedSender {
        fn send(&self, request: &HttpRequest) -> Result<SendOutcome, RequestError> {
            self.sent.borrow_mut().push(request.clone());
            let reply = self
                .replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(RequestError::NetworkError("no scripted reply".into())));
            let now = Utc::now();
            reply.map(|response| SendOutcome {
                response,
                send_time: now,
                recv_time: now,
            })
        }
    }

    fn json(status: u16, body: &str) -> HttpResponse {
        let mut response = HttpResponse::new(status, "");
        response.add_header("Content-Type", "application/json");
        response.set_body(body);
        response
    }

    fn project() -> Project {
        let mut project = Project::new("test");
        project.settings.record_history = true;
        project.vars.set(Scope::Default, "BASE", "http://api.test");
        project
            .add_template(
                RequestTemplate::new("create", "POST", "$BASE/item")
                    .with_capture(CaptureSpec::json_path("X", "$.id")),
            )
            .unwrap();
        project
            .add_template(RequestTemplate::new("fetch", "GET", "$BASE/item/$X"))
            .unwrap();
        project
            .add_flow(Flow::new("round-trip", ["create", "fetch"]))
            .unwrap();
        project
    }

    #[test]
    fn test_captured_value_feeds_next_step() {
        let mut project = project();
        let sender = ScriptedSender::new(vec![Ok(json(201, r#"{"id":"42"}"#)), Ok(json(200, "{}"))]);
        let mut store = MemoryProjectStore::default();
        let mut session = Session::new();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut session, "ROUND-TRIP")
            .unwrap();

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.steps.len(), 2);
        assert_eq!(sender.urls(), vec!["http://api.test/item", "http://api.test/item/42"]);
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.history()[0].captures.get("X").map(String::as_str), Some("42"));
        assert_eq!(store.history()[1].flow.as_deref(), Some("round-trip"));
    }

    #[test]
    fn test_missing_template_aborts_before_sending() {
        let mut project = project();
        project.remove_template("fetch").unwrap();
        let sender = ScriptedSender::new(vec![Ok(json(201, r#"{"id":"1"}"#))]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        assert_eq!(run.state, RunState::Aborted);
        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.index, 1);
        assert!(matches!(failure.error, StepError::UnresolvedStep(ref name) if name == "fetch"));
        assert_eq!(sender.urls().len(), 1);
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn test_error_status_is_not_a_failure() {
        let mut project = project();
        project.template_mut("create").unwrap().captures.clear();
        project.vars.set(Scope::Default, "X", "7");
        let sender = ScriptedSender::new(vec![Ok(json(500, "")), Ok(json(404, ""))]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        assert!(run.is_completed());
        assert_eq!(run.steps[1].response.status_code, 404);
    }

    #[test]
    fn test_transport_error_aborts_and_is_recorded() {
        let mut project = project();
        let sender = ScriptedSender::new(vec![Err(RequestError::NetworkError("refused".into()))]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.index, 0);
        assert!(matches!(failure.error, StepError::Transport(_)));
        assert_eq!(store.history().len(), 1);
        assert!(store.history()[0].response.is_none());
        assert!(store.history()[0].error.is_some());
    }

    #[test]
    fn test_missing_capture_aborts() {
        let mut project = project();
        let sender = ScriptedSender::new(vec![Ok(json(200, r#"{"other":1}"#))]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        assert_eq!(run.state, RunState::Aborted);
        assert!(matches!(run.failure.as_ref().unwrap().error, StepError::Capture(_)));
        assert_eq!(sender.urls().len(), 1);
    }

    #[test]
    fn test_skipped_capture_keeps_prior_value() {
        let mut project = project();
        project
            .template_mut("create")
            .unwrap()
            .add_capture(CaptureSpec::parse("X", "$.id", OnMissing::Skip).unwrap());
        project.vars.set(Scope::Default, "X", "old");
        let sender = ScriptedSender::new(vec![Ok(json(200, "{}")), Ok(json(200, "{}"))]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        assert!(run.is_completed());
        assert_eq!(run.steps[0].captures.skipped, vec!["X".to_string()]);
        assert_eq!(sender.urls()[1], "http://api.test/item/old");
    }

    #[test]
    fn test_unresolved_variable_aborts_and_is_recorded() {
        let mut project = project();
        project.template_mut("create").unwrap().captures.clear();
        let sender = ScriptedSender::new(vec![Ok(json(200, "{}"))]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.index, 1);
        assert!(matches!(
            failure.error,
            StepError::Render(RenderError::UnresolvedVariable { ref name, .. }) if name == "X"
        ));
        assert_eq!(sender.urls(), vec!["http://api.test/item"]);

        let history = store.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].template, "fetch");
        assert_eq!(history[1].request.url, "$BASE/item/$X");
        assert!(history[1].response.is_none());
        assert!(history[1].error.as_deref().unwrap().contains("unresolved variable X"));
    }

    #[test]
    fn test_invalid_method_is_recorded() {
        let mut project = project();
        project.template_mut("create").unwrap().method = "FETCH".to_string();
        let sender = ScriptedSender::new(vec![]);
        let mut store = MemoryProjectStore::default();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();

        assert!(matches!(
            run.failure.as_ref().unwrap().error,
            StepError::Render(RenderError::Validation { .. })
        ));
        assert!(sender.urls().is_empty());
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].request.method, HttpMethod::GET);
    }

    #[test]
    fn test_redirect_hop_cookie_reaches_next_step() {
        let mut project = project();
        let mut found = HttpResponse::new(302, "Found");
        found.add_header("Location", "/item/created");
        found.add_header("Set-Cookie", "sid=r1; Path=/");
        let sender = ScriptedSender::new(vec![
            Ok(found),
            Ok(json(200, r#"{"id":"5"}"#)),
            Ok(json(200, "{}")),
        ]);
        let mut store = MemoryProjectStore::default();
        let mut session = Session::new();

        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut session, "round-trip")
            .unwrap();

        assert!(run.is_completed());
        assert_eq!(
            sender.urls(),
            vec!["http://api.test/item", "http://api.test/item/created", "http://api.test/item/5"]
        );
        assert_eq!(sender.sent.borrow()[2].header("Cookie"), Some("sid=r1"));
        // one entry per step, not per hop
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.history()[0].request.url, "http://api.test/item");
    }

    #[test]
    fn test_captures_do_not_leak_between_runs() {
        let mut project = project();
        let sender = ScriptedSender::new(vec![Ok(json(200, r#"{"id":"1"}"#)), Ok(json(200, "{}"))]);
        let mut store = MemoryProjectStore::default();
        FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();
        assert_eq!(project.vars.get_in(Scope::FlowRun, "X"), Some("1"));

        project.add_flow(Flow::new("fetch-only", ["fetch"])).unwrap();
        let run = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "fetch-only")
            .unwrap();
        assert_eq!(run.state, RunState::Aborted);
    }

    #[test]
    fn test_cookies_carry_between_steps() {
        let mut project = project();
        let mut first = json(200, r#"{"id":"9"}"#);
        first.add_header("Set-Cookie", "sid=abc; Path=/");
        let sender = ScriptedSender::new(vec![Ok(first), Ok(json(200, "{}"))]);
        let mut store = MemoryProjectStore::default();
        let mut session = Session::new();

        FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut session, "round-trip")
            .unwrap();

        assert_eq!(session.len(), 1);
        assert_eq!(sender.sent.borrow()[1].header("Cookie"), Some("sid=abc"));
    }

    #[test]
    fn test_history_disabled() {
        let mut project = project();
        project.settings.record_history = false;
        let sender = ScriptedSender::new(vec![Ok(json(200, r#"{"id":"1"}"#)), Ok(json(200, "{}"))]);
        let mut store = MemoryProjectStore::default();

        FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap();
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_unknown_flow() {
        let mut project = project();
        let sender = ScriptedSender::new(vec![]);
        let mut store = MemoryProjectStore::default();

        let err = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "nope")
            .unwrap_err();
        assert!(matches!(err, RunnerError::FlowNotFound(_)));
    }

    #[test]
    fn test_into_result() {
        let mut project = project();
        project.remove_template("create").unwrap();
        let sender = ScriptedSender::new(vec![]);
        let mut store = MemoryProjectStore::default();

        let err = FlowRunner::new(&sender, &mut store)
            .run(&mut project, &mut Session::new(), "round-trip")
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "flow round-trip aborted at step 0 (create): no request template named \"create\""
        );
    }
}
