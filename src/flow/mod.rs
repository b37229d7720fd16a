//! Flow editing and execution.
//!
//! [`mutation`] applies compound edits to a flow's step list; [`runner`]
//! executes a flow step by step, threading captured values from one step into
//! the next.

pub mod mutation;
pub mod runner;

pub use mutation::{
    apply_edit, move_step, replace_step, EditError, EditPolicy, EditStage, EditSummary, MutationError,
    StepAddition, StepEdit, StepMove,
};
pub use runner::{
    execute_step, FlowRun, FlowRunner, RunState, RunnerError, StepError, StepFailure, StepReport,
};

use std::fmt;
use std::str::FromStr;

/// Attributes of a flow that can be read and set by name.
///
/// Steps are addressed by index instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKey {
    Name,
}

impl FlowKey {
    /// All keys in display order.
    pub const ALL: [FlowKey; 1] = [FlowKey::Name];

    /// Canonical upper-case key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKey::Name => "NAME",
        }
    }

    /// Human-readable label.
    pub fn human(&self) -> &'static str {
        match self {
            FlowKey::Name => "name",
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute name that is not a [`FlowKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid attribute {:?}; must be one of {}", .0, FlowKey::ALL.map(|k| k.as_str()).join(", "))]
pub struct UnknownFlowKey(pub String);

impl FromStr for FlowKey {
    type Err = UnknownFlowKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownFlowKey(s.to_string()))
    }
}
