//! Command handlers for the reqflow command line.
//!
//! Each handler loads what it needs from a [`ProjectStore`], does its work and
//! writes human-readable output to the given writer. Argument parsing lives in
//! the binary; this module only receives structured actions, so every command
//! can be exercised in tests with a [`MemoryProjectStore`] and a `Vec<u8>`.
//!
//! [`MemoryProjectStore`]: crate::project::MemoryProjectStore

use crate::config::with_setting;
use crate::executor::{HttpSender, RequestError};
use crate::flow::{
    apply_edit, execute_step, replace_step, EditError, EditPolicy, FlowKey, FlowRunner,
    MutationError, RunnerError, StepAddition, StepEdit, StepError, StepMove, UnknownFlowKey,
};
use crate::models::{HttpMethod, HttpRequest, HttpResponse};
use crate::project::{FileProjectStore, Flow, Project, ProjectError, ProjectStore, RequestTemplate};
use crate::variables::{
    render_request, CaptureError, CaptureSpec, OnMissing, RenderError, Scope, DEFAULT_ENV,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Errors returned by command handlers.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Run(#[from] RunnerError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("flow {flow}: {error}; {saved} earlier change(s) were saved")]
    PartialEdit {
        flow: String,
        /// Sets plus edit operations applied before the failure.
        saved: usize,
        #[source]
        error: EditError,
    },

    #[error(transparent)]
    UnknownKey(#[from] UnknownFlowKey),

    #[error("could not set up HTTP client: {0}")]
    Sender(#[from] RequestError),

    #[error("variable {0} is not set")]
    VariableNotSet(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn invalid(message: impl Into<String>) -> CommandError {
    CommandError::InvalidArgument(message.into())
}

/// Parses a one-time variable given as `NAME:VALUE`.
pub fn parse_var_override(arg: &str) -> Result<(String, String), CommandError> {
    let (name, value) = arg
        .split_once(':')
        .ok_or_else(|| invalid(format!("{:?} is not in NAME:VALUE format", arg)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid(format!("{:?} has an empty variable name", arg)));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Parses several `NAME:VALUE` overrides. Later values win.
pub fn parse_var_overrides<S: AsRef<str>>(args: &[S]) -> Result<HashMap<String, String>, CommandError> {
    args.iter().map(|a| parse_var_override(a.as_ref())).collect()
}

/// Parses a step addition given as `[IDX]:REQ`.
///
/// An omitted index appends. `::REQ` appends a template whose name is `:REQ`.
pub fn parse_step_addition(arg: &str) -> Result<StepAddition, CommandError> {
    let (index, template) = match arg.strip_prefix("::") {
        Some(rest) => (None, format!(":{}", rest)),
        None => {
            let (idx, req) = arg
                .split_once(':')
                .ok_or_else(|| invalid(format!("{:?} is not in [IDX]:REQ format", arg)))?;
            let index = match idx.trim() {
                "" => None,
                idx => Some(
                    idx.parse::<usize>()
                        .map_err(|_| invalid(format!("{:?} is not a valid step index", idx)))?,
                ),
            };
            (index, req.to_string())
        }
    };

    if template.trim().is_empty() || template == ":" {
        return Err(invalid(format!("{:?} does not name a request", arg)));
    }
    Ok(StepAddition { index, template })
}

/// Parses a step move given as `FROM:TO` (or `FROM->TO`).
pub fn parse_step_move(arg: &str) -> Result<StepMove, CommandError> {
    let (from, to) = arg
        .split_once("->")
        .or_else(|| arg.split_once(':'))
        .ok_or_else(|| invalid(format!("{:?} is not in FROM:TO format", arg)))?;
    let index = |s: &str| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| invalid(format!("{:?} is not a valid step index", s.trim())))
    };
    Ok(StepMove {
        from: index(from)?,
        to: index(to)?,
    })
}

/// Something addressable on a flow: a named attribute or a step index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowItem {
    Key(FlowKey),
    Step(usize),
}

impl FromStr for FlowItem {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<usize>() {
            Ok(index) => Ok(FlowItem::Step(index)),
            Err(_) => Ok(FlowItem::Key(s.parse()?)),
        }
    }
}

/// What a `flows` invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowsAction {
    /// List every flow.
    List,
    /// Show a flow's steps.
    Show { flow: String },
    /// Create a flow from two or more templates.
    New { flow: String, templates: Vec<String> },
    /// Delete a flow.
    Delete { flow: String },
    /// Print one attribute or step.
    Get { flow: String, item: FlowItem },
    /// Set attributes or steps, then apply a compound edit.
    Edit {
        flow: String,
        sets: Vec<(FlowItem, String)>,
        edit: StepEdit,
    },
}

impl FlowsAction {
    /// Works out the action from positional arguments and flags.
    ///
    /// `args` starts with the flow name. `--new` takes template names after it;
    /// `-d` takes nothing else. Otherwise the remaining arguments are a single
    /// item to get, or item/value pairs to set, optionally with a compound edit.
    pub fn from_args(
        args: &[String],
        new: bool,
        delete: bool,
        edit: StepEdit,
    ) -> Result<Self, CommandError> {
        let Some((flow, rest)) = args.split_first() else {
            if new || delete || !edit.is_empty() {
                return Err(invalid("a flow name is required"));
            }
            return Ok(FlowsAction::List);
        };
        let flow = flow.clone();

        if new {
            if delete || !edit.is_empty() {
                return Err(invalid("--new cannot be combined with -d or step edits"));
            }
            if rest.len() < 2 {
                return Err(invalid("a new flow needs at least two requests"));
            }
            return Ok(FlowsAction::New {
                flow,
                templates: rest.to_vec(),
            });
        }

        if delete {
            if !rest.is_empty() || !edit.is_empty() {
                return Err(invalid("-d takes only the flow name"));
            }
            return Ok(FlowsAction::Delete { flow });
        }

        match rest {
            [] if edit.is_empty() => Ok(FlowsAction::Show { flow }),
            [item] if edit.is_empty() => Ok(FlowsAction::Get {
                flow,
                item: item.parse()?,
            }),
            _ if rest.len() % 2 == 1 => Err(invalid(format!(
                "no value given for {:?}",
                rest[rest.len() - 1]
            ))),
            _ => {
                let sets = rest
                    .chunks(2)
                    .map(|pair| -> Result<(FlowItem, String), CommandError> {
                        Ok((pair[0].parse()?, pair[1].clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FlowsAction::Edit { flow, sets, edit })
            }
        }
    }
}

/// One-time options for `send`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Values for the override scope.
    pub overrides: HashMap<String, String>,
    /// Render and print the request without sending it.
    pub dry_run: bool,
}

/// What a `reqs` invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReqsAction {
    List,
    Show { name: String },
    New { template: RequestTemplate },
    Delete { name: String },
}

/// What a `caps` invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsAction {
    List { template: String },
    Add {
        template: String,
        var: String,
        expr: String,
        skip_if_missing: bool,
    },
    Delete { template: String, var: String },
}

/// What a `vars` invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarsAction {
    List,
    Get { name: String },
    Set { name: String, value: String },
    Unset { name: String },
}

/// What a `settings` invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

/// Creates a new project file.
pub fn init(path: &Path, name: Option<&str>, out: &mut dyn Write) -> Result<(), CommandError> {
    let (store, project) = FileProjectStore::init(path, name)?;
    writeln!(
        out,
        "Initialized project {} in {}",
        project.name,
        store.path().display()
    )?;
    Ok(())
}

fn write_request(out: &mut dyn Write, request: &HttpRequest) -> std::io::Result<()> {
    writeln!(out, "{} {}", request.method, request.url)?;
    for (name, value) in &request.headers {
        writeln!(out, "{}: {}", name, value)?;
    }
    if let Some(body) = &request.body {
        writeln!(out)?;
        writeln!(out, "{}", body)?;
    }
    Ok(())
}

fn write_response(out: &mut dyn Write, response: &HttpResponse) -> std::io::Result<()> {
    writeln!(out, "{}", response.status_line())?;
    for (name, value) in &response.headers {
        writeln!(out, "{}: {}", name, value)?;
    }
    if !response.body.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", response.body_lossy())?;
    }
    Ok(())
}

/// Sends a single template.
///
/// Values captured by the template are promoted into the current environment
/// and saved. Cookies received are saved even when the captures fail.
pub fn send(
    store: &mut dyn ProjectStore,
    sender: &dyn HttpSender,
    template_name: &str,
    opts: &SendOptions,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;
    let template = project
        .template(template_name)
        .cloned()
        .ok_or_else(|| ProjectError::TemplateNotFound(template_name.to_string()))?;
    project.vars.set_overrides(opts.overrides.clone());

    if opts.dry_run {
        let render_opts = project.substitution_options().leave_unresolved();
        let request = render_request(&template, &project.vars.snapshot(), &render_opts)?;
        write_request(out, &request)?;
        return Ok(());
    }

    let mut session = store.load_session()?;
    let result = execute_step(&template, None, &mut project, &mut session, sender, store);
    store.save_session(&session)?;
    let report = result?;

    for (name, value) in &report.captures.captured {
        project.vars.set(Scope::Environment, name.clone(), value.clone());
    }
    if !report.captures.captured.is_empty() {
        store.save(&project)?;
    }

    write_response(out, &report.response)?;
    Ok(())
}

/// Runs a flow, printing one line per executed step.
pub fn exec(
    store: &mut dyn ProjectStore,
    sender: &dyn HttpSender,
    flow_name: &str,
    overrides: HashMap<String, String>,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;
    project.vars.set_overrides(overrides);
    let mut session = store.load_session()?;

    let run = FlowRunner::new(sender, store).run(&mut project, &mut session, flow_name)?;
    store.save_session(&session)?;

    for (index, step) in run.steps.iter().enumerate() {
        writeln!(out, "{}: {} {}", index, step.template, step.response.status_line())?;
    }
    if let Some(failure) = &run.failure {
        writeln!(out, "{}: {} FAILED: {}", failure.index, failure.template, failure.error)?;
    }

    run.into_result()?;
    Ok(())
}

/// Handles the `flows` command.
pub fn flows(
    store: &mut dyn ProjectStore,
    action: FlowsAction,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;

    match action {
        FlowsAction::List => list_flows(&project, out)?,
        FlowsAction::Show { flow } => {
            let flow = find_flow(&project, &flow)?;
            if flow.is_empty() {
                writeln!(out, "(no steps)")?;
            }
            for (index, step) in flow.steps.iter().enumerate() {
                let bang = if project.template(&step.template).is_none() { "!" } else { "" };
                writeln!(out, "{}:{} {}", index, bang, step.template)?;
            }
        }
        FlowsAction::New { flow, templates } => {
            let count = templates.len();
            project.add_flow(Flow::new(flow.trim(), templates))?;
            store.save(&project)?;
            writeln!(out, "Created new flow {} with {} steps", flow.trim(), count)?;
        }
        FlowsAction::Delete { flow } => {
            let removed = project.remove_flow(&flow)?;
            store.save(&project)?;
            writeln!(out, "Deleted flow {}", removed.name)?;
        }
        FlowsAction::Get { flow, item } => {
            let flow = find_flow(&project, &flow)?;
            match item {
                FlowItem::Key(FlowKey::Name) => writeln!(out, "{}", flow.name)?,
                FlowItem::Step(index) => {
                    let step = flow.steps.get(index).ok_or_else(|| {
                        invalid(format!("flow {} has no step {}", flow.name, index))
                    })?;
                    writeln!(out, "{}", step.template)?;
                }
            }
        }
        FlowsAction::Edit { flow, sets, edit } => edit_flow(store, &mut project, &flow, sets, &edit)?,
    }

    Ok(())
}

fn find_flow<'a>(project: &'a Project, name: &str) -> Result<&'a Flow, ProjectError> {
    project
        .flow(name)
        .ok_or_else(|| ProjectError::FlowNotFound(name.to_string()))
}

fn list_flows(project: &Project, out: &mut dyn Write) -> std::io::Result<()> {
    let mut flows: Vec<&Flow> = project.flows().collect();
    if flows.is_empty() {
        return writeln!(out, "(none)");
    }
    flows.sort_by(|a, b| a.name.cmp(&b.name));

    for flow in flows {
        let bang = if project.is_execable(flow) { "" } else { "!" };
        let plural = if flow.len() == 1 { "" } else { "s" };
        writeln!(out, "{}:{} {} request{}", flow.name, bang, flow.len(), plural)?;
    }
    Ok(())
}

/// Applies attribute and step sets, then the compound edit.
///
/// Sets are all-or-nothing. When the compound edit then fails, the sets and
/// the edit operations applied before the failure are saved.
fn edit_flow(
    store: &mut dyn ProjectStore,
    project: &mut Project,
    name: &str,
    sets: Vec<(FlowItem, String)>,
    edit: &StepEdit,
) -> Result<(), CommandError> {
    let mut name = find_flow(project, name)?.name.clone();
    let set_count = sets.len();

    for (item, value) in sets {
        match item {
            FlowItem::Step(index) => {
                let flow = project
                    .flow_mut(&name)
                    .ok_or_else(|| ProjectError::FlowNotFound(name.clone()))?;
                replace_step(&mut flow.steps, index, value)?;
            }
            FlowItem::Key(FlowKey::Name) => {
                project.rename_flow(&name, &value)?;
                name = value.trim().to_string();
            }
        }
    }

    if !edit.is_empty() {
        let flow = project
            .flow_mut(&name)
            .ok_or_else(|| ProjectError::FlowNotFound(name.clone()))?;
        if let Err(error) = apply_edit(&mut flow.steps, edit, EditPolicy::KeepApplied) {
            let applied = if error.left_partial_changes() { error.applied } else { 0 };
            let saved = set_count + applied;
            if saved > 0 {
                store.save(project)?;
            }
            return Err(CommandError::PartialEdit { flow: name, saved, error });
        }
    }

    store.save(project)?;
    Ok(())
}

/// Handles the `reqs` command.
pub fn reqs(
    store: &mut dyn ProjectStore,
    action: ReqsAction,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;

    match action {
        ReqsAction::List => {
            let mut templates = project.templates().peekable();
            if templates.peek().is_none() {
                writeln!(out, "(none)")?;
            }
            for template in templates {
                let method = match template.method.as_str() {
                    "" => "???",
                    method => method,
                };
                writeln!(out, "{} {} {}", template.name, method, template.url)?;
            }
        }
        ReqsAction::Show { name } => {
            let template = project
                .template(&name)
                .ok_or_else(|| ProjectError::TemplateNotFound(name.clone()))?;
            writeln!(out, "{} {}", template.method, template.url)?;
            for (header, value) in &template.headers {
                writeln!(out, "{}: {}", header, value)?;
            }
            if let Some(body) = &template.body {
                writeln!(out)?;
                writeln!(out, "{}", body)?;
            }
            for spec in template.captures.values() {
                writeln!(out, "capture {} <- {}", spec.var_name, spec.source)?;
            }
        }
        ReqsAction::New { template } => {
            if !template.method.trim().is_empty() {
                HttpMethod::from_str(&template.method).map_err(|e| invalid(e.to_string()))?;
            }
            let name = template.name.clone();
            project.add_template(template)?;
            store.save(&project)?;
            writeln!(out, "Created new request {}", name.trim())?;
        }
        ReqsAction::Delete { name } => {
            let removed = project.remove_template(&name)?;
            store.save(&project)?;
            writeln!(out, "Deleted request {}", removed.name)?;

            for flow in project.flows().filter(|f| !project.is_execable(f)) {
                writeln!(out, "flow {} is no longer execable", flow.name)?;
            }
        }
    }

    Ok(())
}

/// Handles the `caps` command.
pub fn caps(
    store: &mut dyn ProjectStore,
    action: CapsAction,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;

    match action {
        CapsAction::List { template } => {
            let template = project
                .template(&template)
                .ok_or_else(|| ProjectError::TemplateNotFound(template.clone()))?;
            if template.captures.is_empty() {
                writeln!(out, "(none)")?;
            }
            for spec in template.captures.values() {
                let skip = match spec.on_missing {
                    OnMissing::Skip => " (skip if missing)",
                    OnMissing::Error => "",
                };
                writeln!(out, "{}: {}{}", spec.var_name, spec.source, skip)?;
            }
        }
        CapsAction::Add {
            template,
            var,
            expr,
            skip_if_missing,
        } => {
            let on_missing = if skip_if_missing { OnMissing::Skip } else { OnMissing::Error };
            let spec = CaptureSpec::parse(&var, &expr, on_missing)?;
            project
                .template_mut(&template)
                .ok_or_else(|| ProjectError::TemplateNotFound(template.clone()))?
                .add_capture(spec);
            store.save(&project)?;
        }
        CapsAction::Delete { template, var } => {
            project
                .template_mut(&template)
                .ok_or_else(|| ProjectError::TemplateNotFound(template.clone()))?
                .remove_capture(&var)
                .ok_or_else(|| invalid(format!("request {} has no capture for {}", template, var)))?;
            store.save(&project)?;
        }
    }

    Ok(())
}

/// Handles the `vars` command against `env`, or the current environment.
///
/// Listing and lookup show what a send in that environment would see: its own
/// variables on top of the default environment's.
pub fn vars(
    store: &mut dyn ProjectStore,
    action: VarsAction,
    env: Option<&str>,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;
    let current = project.vars.current_environment().to_string();
    if let Some(env) = env {
        project.vars.use_environment(env);
    }

    let changed = match action {
        VarsAction::List => {
            let snapshot: Vec<(String, String)> = {
                let mut values = project.vars.values_in(Scope::Default);
                values.extend(project.vars.values_in(Scope::Environment));
                values
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            };
            if snapshot.is_empty() {
                writeln!(out, "(none)")?;
            }
            for (name, value) in snapshot {
                writeln!(out, "{}{}={}", project.settings.var_prefix, name, value)?;
            }
            false
        }
        VarsAction::Get { name } => {
            let value = project
                .vars
                .get(&name)
                .ok_or_else(|| CommandError::VariableNotSet(name.clone()))?;
            writeln!(out, "{}", value)?;
            false
        }
        VarsAction::Set { name, value } => {
            project.vars.set(Scope::Environment, name, value);
            true
        }
        VarsAction::Unset { name } => {
            project
                .vars
                .unset(Scope::Environment, &name)
                .ok_or_else(|| CommandError::VariableNotSet(name.clone()))?;
            true
        }
    };

    if changed {
        project.vars.use_environment(&current);
        store.save(&project)?;
    }
    Ok(())
}

/// Shows the environments, or switches the current one.
///
/// An empty name switches to the default environment.
pub fn env(
    store: &mut dyn ProjectStore,
    name: Option<&str>,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;

    match name {
        Some(name) => {
            project.vars.use_environment(name);
            store.save(&project)?;
        }
        None => {
            let current = project.vars.current_environment();
            let marker = |env: &str| if env == current { "* " } else { "  " };
            writeln!(out, "{}(default)", marker(DEFAULT_ENV))?;
            for env in project.vars.environment_names() {
                writeln!(out, "{}{}", marker(&env), env)?;
            }
            if current != DEFAULT_ENV && !project.vars.environment_names().iter().any(|e| e == current) {
                writeln!(out, "* {}", current)?;
            }
        }
    }
    Ok(())
}

/// Shows the project settings, or changes one of them.
///
/// Keys use the same camelCase names as the project file.
pub fn settings(
    store: &mut dyn ProjectStore,
    action: SettingsAction,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut project = store.load()?;

    match action {
        SettingsAction::Show => {
            let json = serde_json::to_string_pretty(&project.settings)
                .map_err(|e| invalid(format!("could not render settings: {}", e)))?;
            writeln!(out, "{}", json)?;
        }
        SettingsAction::Set { key, value } => {
            project.settings = with_setting(&project.settings, &key, &value).map_err(invalid)?;
            store.save(&project)?;
        }
    }
    Ok(())
}

/// Lists recorded history, oldest first, or clears it.
pub fn history(store: &mut dyn ProjectStore, clear: bool, out: &mut dyn Write) -> Result<(), CommandError> {
    if clear {
        store.clear_history()?;
        writeln!(out, "History cleared")?;
        return Ok(());
    }

    let entries = store.load_history()?;
    if entries.is_empty() {
        writeln!(out, "(none)")?;
    }

    for entry in entries {
        let outcome = match (&entry.response, &entry.error) {
            (_, Some(error)) => format!("ERROR: {}", error),
            (Some(response), None) => format!("{} {}", response.status_code, response.status_text),
            (None, None) => "(no response)".to_string(),
        };
        let flow = entry
            .flow
            .as_deref()
            .map(|f| format!(" [{}]", f))
            .unwrap_or_default();
        writeln!(
            out,
            "{} {}{} {} {} -> {}",
            entry.send_time.format("%Y-%m-%d %H:%M:%S"),
            entry.template,
            flow,
            entry.request.method,
            entry.request.url,
            outcome
        )?;
    }
    Ok(())
}
