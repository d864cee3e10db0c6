//! Identity-keyed array diff.
//!
//! Turns one sequence of identity keys into another with a single forward
//! pass instead of an LCS search:
//!
//! 1. skip the common prefix and suffix;
//! 2. index the middle of `next` by key, scanning backward so equal keys
//!    are handed out left to right;
//! 3. walk the middle of `previous`: a matched element that keeps the
//!    order of the elements matched before it stays in place, any other
//!    match is a move, an unmatched element is deleted;
//! 4. every position of `next` nobody filled is an addition.
//!
//! The result is minimal for appends, removals and reorders without
//! ambiguous duplicates. Duplicates are paired by occurrence order.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added<K> {
    /// Position in `next`.
    pub index: usize,
    pub value: K,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moved {
    pub old_index: usize,
    pub new_index: usize,
}

/// Per-index operations turning `previous` into `next`.
///
/// Replay order: remove `deleted ∪ moved.old_index` from the highest index
/// down, then insert `added ∪ moved.new_index` from the lowest index up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayOps<K> {
    pub added: Vec<Added<K>>,
    pub deleted: Vec<usize>,
    pub moved: Vec<Moved>,
}

impl<K> ArrayOps<K> {
    pub fn empty() -> Self {
        Self {
            added: Vec::new(),
            deleted: Vec::new(),
            moved: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.moved.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.moved.len()
    }
}

impl<K: Clone> ArrayOps<K> {
    /// Apply the operations to `previous`.
    pub fn replay(&self, previous: &[K]) -> Vec<K> {
        let mut removals: Vec<usize> = self
            .deleted
            .iter()
            .copied()
            .chain(self.moved.iter().map(|m| m.old_index))
            .collect();
        removals.sort_unstable_by(|a, b| b.cmp(a));
        let mut out = previous.to_vec();
        for index in removals {
            out.remove(index);
        }
        let mut inserts: Vec<(usize, K)> = self
            .added
            .iter()
            .map(|a| (a.index, a.value.clone()))
            .chain(
                self.moved
                    .iter()
                    .map(|m| (m.new_index, previous[m.old_index].clone())),
            )
            .collect();
        inserts.sort_by_key(|(index, _)| *index);
        for (index, value) in inserts {
            out.insert(index, value);
        }
        out
    }
}

pub fn diff<K: Eq + Hash + Clone>(previous: &[K], next: &[K]) -> ArrayOps<K> {
    let mut ops = ArrayOps::empty();

    let mut start = 0;
    while start < previous.len() && start < next.len() && previous[start] == next[start] {
        start += 1;
    }
    let (mut prev_end, mut next_end) = (previous.len(), next.len());
    while prev_end > start && next_end > start && previous[prev_end - 1] == next[next_end - 1] {
        prev_end -= 1;
        next_end -= 1;
    }

    // Backward scan: each stack ends with the lowest index on top.
    let mut positions: HashMap<&K, Vec<usize>> = HashMap::new();
    for j in (start..next_end).rev() {
        positions.entry(&next[j]).or_default().push(j);
    }

    let mut filled = vec![false; next_end - start];
    let mut last_kept: Option<usize> = None;
    for (i, key) in previous.iter().enumerate().take(prev_end).skip(start) {
        match positions.get_mut(key).and_then(Vec::pop) {
            Some(j) => {
                filled[j - start] = true;
                if last_kept.map_or(true, |last| j > last) {
                    last_kept = Some(j);
                } else {
                    ops.moved.push(Moved {
                        old_index: i,
                        new_index: j,
                    });
                }
            }
            None => ops.deleted.push(i),
        }
    }

    for (offset, done) in filled.iter().enumerate() {
        if !done {
            let index = start + offset;
            ops.added.push(Added {
                index,
                value: next[index].clone(),
            });
        }
    }
    ops
}
