//! Expansion view state, kept apart from the immutable app records.

#![allow(missing_docs)]

use std::collections::HashSet;

use parking_lot::RwLock;

/// Set of expanded rows keyed by package name.
#[derive(Debug, Default)]
pub struct ExpansionTable {
    expanded: RwLock<HashSet<String>>,
}

impl ExpansionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_expanded(&self, package_name: &str) -> bool {
        self.expanded.read().contains(package_name)
    }

    /// Flip the entry and return the new state.
    pub fn toggle(&self, package_name: &str) -> bool {
        let mut expanded = self.expanded.write();
        if expanded.remove(package_name) {
            false
        } else {
            expanded.insert(package_name.to_string());
            true
        }
    }

    pub fn set(&self, package_name: &str, expanded: bool) {
        let mut table = self.expanded.write();
        if expanded {
            table.insert(package_name.to_string());
        } else {
            table.remove(package_name);
        }
    }

    /// Drop entries for packages no longer in the working set.
    pub fn retain<'a>(&self, live: impl IntoIterator<Item = &'a str>) {
        let live: HashSet<&str> = live.into_iter().collect();
        self.expanded
            .write()
            .retain(|package| live.contains(package.as_str()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.expanded.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expanded.read().is_empty()
    }
}
