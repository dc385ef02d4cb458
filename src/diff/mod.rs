//! List change detection with separate identity and content equality.
//!
//! [`diff`] turns two ordered snapshots into an [`EditScript`] a consumer can
//! replay against its displayed list. Items are matched by identity key, so a
//! content change to one app never disturbs unrelated rows.

pub mod compute;
pub mod script;

use std::hash::Hash;

pub use compute::diff;
pub use script::{DiffSummary, EditOp, EditScript};

use crate::apps::record::AppRecord;

/// Equality relations the change detector needs from a list item.
pub trait DiffItem {
    /// Identity key type.
    type Key: Eq + Hash + ?Sized;

    /// Stable identity; equal keys mean "the same item".
    fn key(&self) -> &Self::Key;

    /// Whether everything that drives a full re-render is unchanged.
    fn same_content(&self, other: &Self) -> bool;

    /// Whether narrow view state (expansion and the like) is unchanged.
    fn same_view_state(&self, _other: &Self) -> bool {
        true
    }
}

impl DiffItem for AppRecord {
    type Key = str;

    fn key(&self) -> &str {
        &self.package_name
    }

    fn same_content(&self, other: &Self) -> bool {
        Self::same_content(self, other)
    }
}
