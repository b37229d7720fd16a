//! reqflow command line.
//!
//! Thin clap front end over [`reqflow::commands`]. Output goes to stdout;
//! logging goes to stderr through `env_logger` and is controlled by `RUST_LOG`
//! or `-v`.

use clap::{Parser, Subcommand};
use reqflow::commands::{
    self, CapsAction, CommandError, FlowsAction, ReqsAction, SendOptions, SettingsAction,
    VarsAction,
};
use reqflow::executor::{ExecutionConfig, ReqwestSender};
use reqflow::flow::StepEdit;
use reqflow::project::{FileProjectStore, ProjectStore, RequestTemplate, DEFAULT_PROJECT_FILE};
use std::io::{self, Write};
use std::path::PathBuf;

/// Project-based HTTP request templates and flows
#[derive(Parser)]
#[command(name = "reqflow")]
#[command(about = "reqflow - send templated HTTP requests and run them as flows", long_about = None)]
#[command(version)]
struct Cli {
    /// Project file to use
    #[arg(short = 'F', long = "project-file", global = true, default_value = DEFAULT_PROJECT_FILE)]
    project_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project file
    Init {
        /// Project name
        name: Option<String>,
    },

    /// Send a single request template
    Send {
        /// Template to send
        request: String,

        /// One-time variable for this send
        #[arg(short = 'V', long = "var", value_name = "NAME:VALUE")]
        vars: Vec<String>,

        /// Print the rendered request without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute a flow
    Exec {
        /// Flow to run
        flow: String,

        /// One-time variable for every step of the run
        #[arg(short = 'V', long = "var", value_name = "NAME:VALUE")]
        vars: Vec<String>,
    },

    /// List, show, create, delete and edit flows
    Flows {
        /// FLOW, then REQ... with --new, or ATTR/IDX [VAL] pairs
        args: Vec<String>,

        /// Create FLOW from the given requests
        #[arg(long)]
        new: bool,

        /// Delete FLOW
        #[arg(short, long)]
        delete: bool,

        /// Remove the step at IDX
        #[arg(short = 'r', long = "remove", value_name = "IDX")]
        remove: Vec<usize>,

        /// Add a step calling REQ at IDX, or at the end if IDX is omitted
        #[arg(short = 'a', long = "add", value_name = "[IDX]:REQ")]
        add: Vec<String>,

        /// Move the step at FROM to TO
        #[arg(short = 'm', long = "move", value_name = "FROM:TO")]
        moves: Vec<String>,
    },

    /// List, show, create and delete request templates
    Reqs {
        /// Template name
        name: Option<String>,

        /// Create NAME
        #[arg(long)]
        new: bool,

        /// HTTP method of the new template
        #[arg(short = 'X', long, requires = "new")]
        method: Option<String>,

        /// URL of the new template
        #[arg(short, long, requires = "new")]
        url: Option<String>,

        /// Header of the new template
        #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", requires = "new")]
        headers: Vec<String>,

        /// Body of the new template
        #[arg(short, long, requires = "new")]
        body: Option<String>,

        /// Delete NAME
        #[arg(short, long, conflicts_with = "new")]
        delete: bool,
    },

    /// List, add and remove captures on a request template
    Caps {
        /// Template name
        request: String,

        /// Variable to capture into
        var: Option<String>,

        /// Capture expression: headers.NAME [~ REGEX], $.json.path or a regex
        expr: Option<String>,

        /// Leave the variable untouched instead of failing when nothing matches
        #[arg(long)]
        skip: bool,

        /// Remove the capture for VAR
        #[arg(short, long, conflicts_with_all = ["expr", "skip"])]
        delete: bool,
    },

    /// Show and set persisted variables
    Vars {
        /// Variable name
        name: Option<String>,

        /// New value
        value: Option<String>,

        /// Environment to use instead of the current one
        #[arg(short, long)]
        env: Option<String>,

        /// Delete NAME
        #[arg(short, long, conflicts_with = "value")]
        delete: bool,
    },

    /// Show environments, or switch the current one ("" for the default)
    Env {
        /// Environment to switch to
        name: Option<String>,
    },

    /// Show project settings, or set KEY to VALUE
    Settings {
        /// Setting name, as written in the project file (e.g. timeoutSecs)
        key: Option<String>,

        /// New value, read as JSON when possible
        #[arg(requires = "key")]
        value: Option<String>,
    },

    /// List recorded request history
    History {
        /// Delete all recorded history
        #[arg(long)]
        clear: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = run(cli, &mut out);
    let _ = out.flush();

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn sender(store: &mut FileProjectStore) -> Result<ReqwestSender, CommandError> {
    let settings = store.load()?.settings;
    Ok(ReqwestSender::new(ExecutionConfig::from_settings(&settings))?)
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<(), CommandError> {
    let mut store = FileProjectStore::new(&cli.project_file);

    match cli.command {
        Commands::Init { name } => commands::init(&cli.project_file, name.as_deref(), out),

        Commands::Send {
            request,
            vars,
            dry_run,
        } => {
            let opts = SendOptions {
                overrides: commands::parse_var_overrides(&vars)?,
                dry_run,
            };
            let sender = sender(&mut store)?;
            commands::send(&mut store, &sender, &request, &opts, out)
        }

        Commands::Exec { flow, vars } => {
            let overrides = commands::parse_var_overrides(&vars)?;
            let sender = sender(&mut store)?;
            commands::exec(&mut store, &sender, &flow, overrides, out)
        }

        Commands::Flows {
            args,
            new,
            delete,
            remove,
            add,
            moves,
        } => {
            let edit = StepEdit {
                removals: remove.into_iter().collect(),
                additions: add
                    .iter()
                    .map(|a| commands::parse_step_addition(a))
                    .collect::<Result<_, _>>()?,
                moves: moves
                    .iter()
                    .map(|m| commands::parse_step_move(m))
                    .collect::<Result<_, _>>()?,
            };
            let action = FlowsAction::from_args(&args, new, delete, edit)?;
            commands::flows(&mut store, action, out)
        }

        Commands::Reqs {
            name,
            new,
            method,
            url,
            headers,
            body,
            delete,
        } => {
            let action = match (name, new, delete) {
                (None, false, false) => ReqsAction::List,
                (None, _, _) => {
                    return Err(CommandError::InvalidArgument(
                        "a request name is required".to_string(),
                    ))
                }
                (Some(name), true, _) => {
                    let mut template = RequestTemplate::new(
                        name,
                        method.unwrap_or_default().to_uppercase(),
                        url.unwrap_or_default(),
                    );
                    for header in &headers {
                        let (name, value) = commands::parse_var_override(header)?;
                        template = template.with_header(name, value.trim());
                    }
                    if let Some(body) = body {
                        template = template.with_body(body);
                    }
                    ReqsAction::New { template }
                }
                (Some(name), false, true) => ReqsAction::Delete { name },
                (Some(name), false, false) => ReqsAction::Show { name },
            };
            commands::reqs(&mut store, action, out)
        }

        Commands::Caps {
            request,
            var,
            expr,
            skip,
            delete,
        } => {
            let action = match (var, expr) {
                (None, _) => CapsAction::List { template: request },
                (Some(var), _) if delete => CapsAction::Delete {
                    template: request,
                    var,
                },
                (Some(var), Some(expr)) => CapsAction::Add {
                    template: request,
                    var,
                    expr,
                    skip_if_missing: skip,
                },
                (Some(var), None) => {
                    return Err(CommandError::InvalidArgument(format!(
                        "no capture expression given for {}",
                        var
                    )))
                }
            };
            commands::caps(&mut store, action, out)
        }

        Commands::Vars {
            name,
            value,
            env,
            delete,
        } => {
            let action = match (name, value) {
                (None, _) => VarsAction::List,
                (Some(name), _) if delete => VarsAction::Unset { name },
                (Some(name), Some(value)) => VarsAction::Set { name, value },
                (Some(name), None) => VarsAction::Get { name },
            };
            commands::vars(&mut store, action, env.as_deref(), out)
        }

        Commands::Env { name } => commands::env(&mut store, name.as_deref(), out),

        Commands::Settings { key, value } => {
            let action = match (key, value) {
                (None, _) => SettingsAction::Show,
                (Some(key), Some(value)) => SettingsAction::Set { key, value },
                (Some(key), None) => {
                    return Err(CommandError::InvalidArgument(format!(
                        "no value given for setting {}",
                        key
                    )))
                }
            };
            commands::settings(&mut store, action, out)
        }

        Commands::History { clear } => commands::history(&mut store, clear, out),
    }
}
