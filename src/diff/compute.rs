//! Edit-script computation.
//!
//! Matching is a single keyed pass. Items that keep their relative order form
//! the longest increasing run of matched old positions; everything else that
//! matched is moved. The emitted order is:
//!
//! 1. `Update` / `Rebind` for staying items, at their old index;
//! 2. `Remove` / `MoveOut`, descending old index;
//! 3. `Insert` / `MoveIn`, ascending new index.

use std::collections::HashMap;

use crate::diff::DiffItem;
use crate::diff::script::{EditOp, EditScript};

/// Compute the edit script that turns `old` into `new`.
///
/// Each old item is matched at most once, so duplicate keys degrade to
/// remove/insert pairs rather than corrupting the script.
pub fn diff<T>(old: &[T], new: &[T]) -> EditScript<T>
where
    T: DiffItem + Clone,
{
    let mut old_by_key: HashMap<&T::Key, usize> = HashMap::with_capacity(old.len());
    for (index, item) in old.iter().enumerate() {
        old_by_key.entry(item.key()).or_insert(index);
    }

    // old index -> new index, and the reverse.
    let mut target: Vec<Option<usize>> = vec![None; old.len()];
    let mut source: Vec<Option<usize>> = Vec::with_capacity(new.len());
    for (new_index, item) in new.iter().enumerate() {
        let matched = old_by_key
            .get(item.key())
            .copied()
            .filter(|&old_index| target[old_index].is_none());
        if let Some(old_index) = matched {
            target[old_index] = Some(new_index);
        }
        source.push(matched);
    }

    let matched_in_new_order: Vec<usize> = source.iter().flatten().copied().collect();
    let mut stays = vec![false; old.len()];
    for (position, keep) in longest_increasing_run(&matched_in_new_order)
        .into_iter()
        .enumerate()
    {
        if keep {
            stays[matched_in_new_order[position]] = true;
        }
    }

    let mut ops = Vec::new();

    for (old_index, new_index) in target.iter().enumerate() {
        let Some(new_index) = *new_index else {
            continue;
        };
        if !stays[old_index] {
            continue;
        }
        let (before, after) = (&old[old_index], &new[new_index]);
        if !before.same_content(after) {
            ops.push(EditOp::Update {
                index: old_index,
                item: after.clone(),
            });
        } else if !before.same_view_state(after) {
            ops.push(EditOp::Rebind {
                index: old_index,
                item: after.clone(),
            });
        }
    }

    for old_index in (0..old.len()).rev() {
        match target[old_index] {
            None => ops.push(EditOp::Remove { index: old_index }),
            Some(_) if !stays[old_index] => ops.push(EditOp::MoveOut { index: old_index }),
            Some(_) => {}
        }
    }

    for (new_index, matched) in source.iter().enumerate() {
        match matched {
            None => ops.push(EditOp::Insert {
                index: new_index,
                item: new[new_index].clone(),
            }),
            Some(old_index) if !stays[*old_index] => ops.push(EditOp::MoveIn {
                index: new_index,
                item: new[new_index].clone(),
            }),
            Some(_) => {}
        }
    }

    EditScript::new(ops)
}

/// Mark the members of one longest strictly increasing subsequence.
///
/// Patience sorting with back-links, O(n log n).
fn longest_increasing_run(values: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut back: Vec<Option<usize>> = vec![None; values.len()];

    for (position, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&tail| values[tail] < value);
        if slot > 0 {
            back[position] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }

    let mut members = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        members[position] = true;
        cursor = back[position];
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::script::EditOp;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        key: &'static str,
        body: u32,
        open: bool,
    }

    impl DiffItem for Row {
        type Key = str;

        fn key(&self) -> &str {
            self.key
        }

        fn same_content(&self, other: &Self) -> bool {
            self.key == other.key && self.body == other.body
        }

        fn same_view_state(&self, other: &Self) -> bool {
            self.open == other.open
        }
    }

    fn row(key: &'static str, body: u32) -> Row {
        Row {
            key,
            body,
            open: false,
        }
    }

    fn rows(keys: &[&'static str]) -> Vec<Row> {
        keys.iter().map(|key| row(key, 0)).collect()
    }

    fn assert_round_trip(old: &[Row], new: &[Row]) -> EditScript<Row> {
        let script = diff(old, new);
        let mut replay = old.to_vec();
        script.apply(&mut replay).expect("script fits old");
        assert_eq!(replay, new, "script {script:?}");
        script
    }

    #[test]
    fn identical_lists_produce_empty_script() {
        let list = rows(&["a", "b", "c"]);
        assert!(assert_round_trip(&list, &list).is_empty());
    }

    #[test]
    fn empty_to_items_and_back() {
        let list = rows(&["a", "b"]);
        let grow = assert_round_trip(&[], &list);
        assert_eq!(grow.summary().inserted, 2);
        let shrink = assert_round_trip(&list, &[]);
        assert_eq!(shrink.summary().removed, 2);
        assert!(assert_round_trip(&[], &[]).is_empty());
    }

    #[test]
    fn content_change_is_single_update() {
        let old = rows(&["a", "b", "c"]);
        let mut new = old.clone();
        new[1].body = 9;
        let script = assert_round_trip(&old, &new);
        assert_eq!(
            script.ops(),
            &[EditOp::Update {
                index: 1,
                item: row("b", 9)
            }]
        );
    }

    #[test]
    fn view_state_change_is_rebind_not_update() {
        let old = rows(&["a", "b"]);
        let mut new = old.clone();
        new[0].open = true;
        let script = assert_round_trip(&old, &new);
        let summary = script.summary();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.rebound, 1);
    }

    #[test]
    fn rotation_moves_single_item() {
        let old = rows(&["a", "b", "c", "d"]);
        let new = rows(&["d", "a", "b", "c"]);
        let script = assert_round_trip(&old, &new);
        assert_eq!(script.summary().moved, 1);
        assert_eq!(script.summary().removed, 0);
        assert_eq!(script.summary().inserted, 0);
    }

    #[test]
    fn moved_and_changed_item_keeps_identity() {
        let old = rows(&["a", "b", "c"]);
        let new = vec![row("c", 5), row("a", 0), row("b", 0)];
        let script = assert_round_trip(&old, &new);
        let summary = script.summary();
        assert_eq!(summary.moved, 1);
        assert_eq!(summary.inserted + summary.removed, 0);
    }

    #[test]
    fn mixed_insert_remove_move() {
        let old = rows(&["a", "b", "c", "d", "e"]);
        let new = rows(&["e", "x", "b", "d", "y", "a"]);
        assert_round_trip(&old, &new);
    }

    #[test]
    fn reversal_round_trips() {
        let old = rows(&["a", "b", "c", "d", "e", "f"]);
        let mut new = old.clone();
        new.reverse();
        let script = assert_round_trip(&old, &new);
        assert_eq!(script.summary().moved, 5);
    }

    #[test]
    fn duplicate_keys_do_not_break_replay() {
        let old = rows(&["a", "a", "b"]);
        let new = rows(&["b", "a", "a", "a"]);
        assert_round_trip(&old, &new);
    }

    #[test]
    fn removals_emitted_in_descending_index() {
        let old = rows(&["a", "b", "c", "d"]);
        let new = rows(&["b"]);
        let script = assert_round_trip(&old, &new);
        let indices: Vec<usize> = script.ops().iter().map(EditOp::index).collect();
        assert_eq!(indices, vec![3, 2, 0]);
    }

    #[test]
    fn increasing_run_is_longest() {
        let marks = longest_increasing_run(&[3, 0, 1, 2]);
        assert_eq!(marks, vec![false, true, true, true]);
        assert!(longest_increasing_run(&[]).is_empty());
        let marks = longest_increasing_run(&[4, 3, 2, 1]);
        assert_eq!(marks.iter().filter(|m| **m).count(), 1);
    }
}
