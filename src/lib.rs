//! reqflow: project-based HTTP request templates and flows
//!
//! A project holds named request templates and flows, ordered sequences of
//! templates run one after another. Variables are substituted into requests at
//! send time and values captured from responses feed the steps that follow.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - **models**: Core data structures for HTTP requests and responses
//! - **variables**: Layered variable store, `$NAME` substitution and response captures
//! - **project**: Templates, flows, and the `ProjectStore` persistence seam
//! - **flow**: Compound step edits and the flow runner
//! - **executor**: The `HttpSender` seam and its reqwest implementation
//! - **session**: Cookie jar shared by every send in a project
//! - **history**: Append-only request history
//! - **config**: Project settings
//! - **commands**: Command handlers behind the `reqflow` binary
//!
//! # Running a flow
//!
//! ```no_run
//! use reqflow::executor::{ExecutionConfig, ReqwestSender};
//! use reqflow::flow::FlowRunner;
//! use reqflow::project::{FileProjectStore, ProjectStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = FileProjectStore::new(".reqflow/project.json");
//! let mut project = store.load()?;
//! let mut session = store.load_session()?;
//! let sender = ReqwestSender::new(ExecutionConfig::from_settings(&project.settings))?;
//!
//! let run = FlowRunner::new(&sender, &mut store).run(&mut project, &mut session, "checkout")?;
//! store.save_session(&session)?;
//! println!("{} after {} steps", run.state, run.steps.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Editing a flow
//!
//! Removals, additions and moves given together always apply in that order:
//!
//! ```
//! use reqflow::flow::{apply_edit, EditPolicy, StepEdit};
//! use reqflow::project::Flow;
//!
//! let mut flow = Flow::new("f", ["A", "B", "C", "D", "E"]);
//! let edit = StepEdit::new().move_step(2, 0).insert(0, "X").remove(3).remove(1);
//! apply_edit(&mut flow.steps, &edit, EditPolicy::default()).unwrap();
//! assert_eq!(flow.template_names(), vec!["C", "X", "A", "E"]);
//! ```

pub mod commands;
pub mod config;
pub mod executor;
pub mod flow;
pub mod history;
pub mod models;
pub mod project;
pub mod session;
pub mod variables;
