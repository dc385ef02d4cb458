//! Edit operations and their replay.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{NetPolicyError, Result};

/// One step of an edit script.
///
/// Every index refers to the list as it stands when the op is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp<T> {
    /// Content changed in place.
    Update { index: usize, item: T },
    /// Only view state changed; redraw the affordance, not the row.
    Rebind { index: usize, item: T },
    /// Item left the list.
    Remove { index: usize },
    /// Item is detached and re-attached later by a [`EditOp::MoveIn`].
    MoveOut { index: usize },
    /// New item.
    Insert { index: usize, item: T },
    /// Previously detached item, carrying its current content.
    MoveIn { index: usize, item: T },
}

impl<T> EditOp<T> {
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Update { index, .. }
            | Self::Rebind { index, .. }
            | Self::Remove { index }
            | Self::MoveOut { index }
            | Self::Insert { index, .. }
            | Self::MoveIn { index, .. } => *index,
        }
    }

    #[must_use]
    pub const fn item(&self) -> Option<&T> {
        match self {
            Self::Update { item, .. }
            | Self::Rebind { item, .. }
            | Self::Insert { item, .. }
            | Self::MoveIn { item, .. } => Some(item),
            Self::Remove { .. } | Self::MoveOut { .. } => None,
        }
    }
}

/// Per-kind operation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub inserted: usize,
    pub removed: usize,
    pub moved: usize,
    pub updated: usize,
    pub rebound: usize,
}

/// Ordered list of edit operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EditScript<T> {
    ops: Vec<EditOp<T>>,
}

impl<T> Default for EditScript<T> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<T> EditScript<T> {
    #[must_use]
    pub fn new(ops: Vec<EditOp<T>>) -> Self {
        Self { ops }
    }

    #[must_use]
    pub fn ops(&self) -> &[EditOp<T>] {
        &self.ops
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<EditOp<T>> {
        self.ops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for op in &self.ops {
            match op {
                EditOp::Update { .. } => summary.updated += 1,
                EditOp::Rebind { .. } => summary.rebound += 1,
                EditOp::Remove { .. } => summary.removed += 1,
                EditOp::Insert { .. } => summary.inserted += 1,
                // Counted once, on the way in.
                EditOp::MoveOut { .. } => {}
                EditOp::MoveIn { .. } => summary.moved += 1,
            }
        }
        summary
    }

    /// Replay the script against `list`.
    ///
    /// Fails without touching the remaining ops if an index does not fit,
    /// which means `list` was not the snapshot the script was computed from.
    pub fn apply(&self, list: &mut Vec<T>) -> Result<()>
    where
        T: Clone,
    {
        for (step, op) in self.ops.iter().enumerate() {
            let index = op.index();
            match op {
                EditOp::Update { item, .. } | EditOp::Rebind { item, .. } => {
                    let slot = list.get_mut(index).ok_or_else(|| out_of_range(step, index))?;
                    *slot = item.clone();
                }
                EditOp::Remove { .. } | EditOp::MoveOut { .. } => {
                    if index >= list.len() {
                        return Err(out_of_range(step, index));
                    }
                    list.remove(index);
                }
                EditOp::Insert { item, .. } | EditOp::MoveIn { item, .. } => {
                    if index > list.len() {
                        return Err(out_of_range(step, index));
                    }
                    list.insert(index, item.clone());
                }
            }
        }
        Ok(())
    }
}

fn out_of_range(step: usize, index: usize) -> NetPolicyError {
    NetPolicyError::Runtime {
        details: format!("edit op #{step} index {index} does not fit the target list"),
    }
}
