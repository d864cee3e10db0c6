//! Coalesces per-index array operations into ranges.
//!
//! Deletions (vacated move sources included) are sorted from the highest
//! index down so each removal leaves the lower indices untouched, and runs
//! of consecutive indices become one `{index, length}` range. Insertions
//! are sorted from the lowest target index up and runs of consecutive
//! targets become one `{index, values}` range. Deletions are applied
//! before insertions, both in the same index space.

use crate::array_diff::ArrayOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRange {
    pub index: usize,
    pub length: usize,
}

/// An element to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element<E> {
    /// An element already in the array, re-inserted at its new position.
    Existing(E),
    /// Position in `next` of a value that must be materialized.
    Fresh(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRange<E> {
    pub index: usize,
    pub values: Vec<Element<E>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<E> {
    pub deletions: Vec<DeleteRange>,
    pub insertions: Vec<InsertRange<E>>,
}

impl<E> Plan<E> {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty()
    }
}

/// Build the range plan for `ops`; `existing` holds the current elements.
pub fn optimize<K, E: Clone>(ops: &ArrayOps<K>, existing: &[E]) -> Plan<E> {
    let mut removals: Vec<usize> = ops
        .deleted
        .iter()
        .copied()
        .chain(ops.moved.iter().map(|m| m.old_index))
        .collect();
    removals.sort_unstable_by(|a, b| b.cmp(a));
    removals.dedup();

    let mut deletions: Vec<DeleteRange> = Vec::new();
    for index in removals {
        match deletions.last_mut() {
            Some(run) if run.index - index == 1 => {
                run.index = index;
                run.length += 1;
            }
            _ => deletions.push(DeleteRange { index, length: 1 }),
        }
    }

    let mut inserts: Vec<(usize, Element<E>)> = ops
        .moved
        .iter()
        .map(|m| (m.new_index, Element::Existing(existing[m.old_index].clone())))
        .chain(ops.added.iter().map(|a| (a.index, Element::Fresh(a.index))))
        .collect();
    inserts.sort_by_key(|(index, _)| *index);

    let mut insertions: Vec<InsertRange<E>> = Vec::new();
    for (index, element) in inserts {
        match insertions.last_mut() {
            Some(run) if run.index + run.values.len() == index => run.values.push(element),
            _ => insertions.push(InsertRange {
                index,
                values: vec![element],
            }),
        }
    }

    Plan {
        deletions,
        insertions,
    }
}
