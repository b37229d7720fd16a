//! Flow step mutation engine.
//!
//! A [`StepEdit`] combines removals, additions and moves against one flow's step
//! list. They are always applied in this order, whatever order the caller gave
//! them in:
//!
//! 1. removals, highest index first, so pending lower indices stay valid
//! 2. additions, lowest target index first; an index past the end appends
//! 3. moves, in the order given, each against the list the previous one left
//!
//! The step list stays densely indexed after every single operation. When an
//! operation fails, what happens to the operations already applied is decided by
//! the [`EditPolicy`].

use crate::project::StepRef;
use std::collections::BTreeSet;
use std::fmt;

/// Inserts a step referencing `template`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepAddition {
    /// Target index; `None` appends.
    pub index: Option<usize>,
    /// Template the new step calls.
    pub template: String,
}

/// Moves the step at `from` so it ends up at `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMove {
    pub from: usize,
    pub to: usize,
}

/// A compound edit of a flow's steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepEdit {
    /// Indices to delete. Duplicates collapse.
    pub removals: BTreeSet<usize>,
    /// Steps to insert.
    pub additions: Vec<StepAddition>,
    /// Moves, applied in order.
    pub moves: Vec<StepMove>,
}

impl StepEdit {
    /// Creates an empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a removal.
    pub fn remove(mut self, index: usize) -> Self {
        self.removals.insert(index);
        self
    }

    /// Adds an insertion at `index`.
    pub fn insert(mut self, index: usize, template: impl Into<String>) -> Self {
        self.additions.push(StepAddition {
            index: Some(index),
            template: template.into(),
        });
        self
    }

    /// Adds an insertion at the end.
    pub fn append(mut self, template: impl Into<String>) -> Self {
        self.additions.push(StepAddition {
            index: None,
            template: template.into(),
        });
        self
    }

    /// Adds a move.
    pub fn move_step(mut self, from: usize, to: usize) -> Self {
        self.moves.push(StepMove { from, to });
        self
    }

    /// Checks if the edit contains no operations.
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty() && self.moves.is_empty()
    }

    /// Total number of operations.
    pub fn len(&self) -> usize {
        self.removals.len() + self.additions.len() + self.moves.len()
    }
}

/// Stage of a compound edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStage {
    Removal,
    Addition,
    Move,
    Replace,
}

impl fmt::Display for EditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditStage::Removal => f.write_str("remove"),
            EditStage::Addition => f.write_str("add"),
            EditStage::Move => f.write_str("move"),
            EditStage::Replace => f.write_str("replace"),
        }
    }
}

/// What happens to earlier operations when a later one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditPolicy {
    /// Operations applied before the failure stay applied.
    #[default]
    KeepApplied,
    /// The step list is restored to its state before the edit.
    Rollback,
}

/// A single operation that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("{stage}: index {index} is out of range for a flow with {len} steps")]
    IndexOutOfRange {
        stage: EditStage,
        index: usize,
        len: usize,
    },
}

/// A compound edit that stopped at a failing operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct EditError {
    /// The failing operation.
    #[source]
    pub error: MutationError,
    /// Operations applied before the failure.
    pub applied: usize,
    /// Whether those operations were undone.
    pub rolled_back: bool,
}

impl EditError {
    /// Checks if the step list differs from its state before the edit.
    pub fn left_partial_changes(&self) -> bool {
        self.applied > 0 && !self.rolled_back
    }
}

/// Counts of operations applied by a successful edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditSummary {
    pub removed: usize,
    pub added: usize,
    pub moved: usize,
}

/// Moves the element at `from` to `to`, shifting the ones in between to close the gap.
pub fn move_step<T>(steps: &mut Vec<T>, from: usize, to: usize) -> Result<(), MutationError> {
    let len = steps.len();
    for index in [from, to] {
        if index >= len {
            return Err(MutationError::IndexOutOfRange {
                stage: EditStage::Move,
                index,
                len,
            });
        }
    }

    if from != to {
        let step = steps.remove(from);
        steps.insert(to, step);
    }
    Ok(())
}

/// Points the step at `index` to another template, returning the old step.
pub fn replace_step(
    steps: &mut [StepRef],
    index: usize,
    template: impl Into<String>,
) -> Result<StepRef, MutationError> {
    let len = steps.len();
    let slot = steps.get_mut(index).ok_or(MutationError::IndexOutOfRange {
        stage: EditStage::Replace,
        index,
        len,
    })?;
    Ok(std::mem::replace(slot, StepRef::new(template)))
}

/// Applies a compound edit to a step list.
///
/// # Arguments
///
/// * `steps` - The flow's steps, modified in place
/// * `edit` - Removals, additions and moves to apply
/// * `policy` - Whether a failure keeps or undoes earlier operations
///
/// # Errors
///
/// Returns [`EditError`] for the first operation that fails. Later operations
/// are not attempted. With [`EditPolicy::KeepApplied`] the caller must treat
/// `steps` as partially edited.
pub fn apply_edit(
    steps: &mut Vec<StepRef>,
    edit: &StepEdit,
    policy: EditPolicy,
) -> Result<EditSummary, EditError> {
    let snapshot = match policy {
        EditPolicy::Rollback => Some(steps.clone()),
        EditPolicy::KeepApplied => None,
    };

    let mut summary = EditSummary::default();
    let outcome = apply_stages(steps, edit, &mut summary);

    outcome.map(|_| summary).map_err(|error| {
        let applied = summary.removed + summary.added + summary.moved;
        let rolled_back = match snapshot {
            Some(original) => {
                *steps = original;
                true
            }
            None => false,
        };
        log::debug!(
            "flow edit failed after {} operation(s), rolled back: {}",
            applied,
            rolled_back
        );
        EditError {
            error,
            applied,
            rolled_back,
        }
    })
}

fn apply_stages(
    steps: &mut Vec<StepRef>,
    edit: &StepEdit,
    summary: &mut EditSummary,
) -> Result<(), MutationError> {
    for &index in edit.removals.iter().rev() {
        if index >= steps.len() {
            return Err(MutationError::IndexOutOfRange {
                stage: EditStage::Removal,
                index,
                len: steps.len(),
            });
        }
        steps.remove(index);
        summary.removed += 1;
    }

    // stable sort keeps the given order among equal targets and among appends
    let mut additions: Vec<&StepAddition> = edit.additions.iter().collect();
    additions.sort_by_key(|a| a.index.unwrap_or(usize::MAX));

    for addition in additions {
        let index = addition.index.unwrap_or(steps.len()).min(steps.len());
        steps.insert(index, StepRef::new(addition.template.clone()));
        summary.added += 1;
    }

    for mv in &edit.moves {
        move_step(steps, mv.from, mv.to)?;
        summary.moved += 1;
    }

    Ok(())
}
