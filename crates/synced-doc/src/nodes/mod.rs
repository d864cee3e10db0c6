//! Document node types.
//!
//! | Rust type  | Semantics                                    |
//! |------------|----------------------------------------------|
//! | `ConNode`  | Immutable primitive leaf                     |
//! | `ObjNode`  | LWW key→node map, insertion-ordered keys     |
//! | `ArrNode`  | RGA array of node references                 |

pub mod rga;

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

use crate::clock::Ts;
use crate::value::Primitive;
use rga::Rga;

/// All nodes of a document keyed by their ID.
pub type NodeIndex = HashMap<Ts, DocNode>;

// ── ConNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConNode {
    pub id: Ts,
    pub val: Primitive,
}

// ── ObjNode ───────────────────────────────────────────────────────────────

/// One key of a map: the LWW stamp of the last write and the node it set,
/// `None` when the last write was a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjEntry {
    pub stamp: Ts,
    pub value: Option<Ts>,
}

/// Last-write-wins map.
#[derive(Debug, Clone)]
pub struct ObjNode {
    pub id: Ts,
    pub keys: IndexMap<String, ObjEntry>,
}

impl ObjNode {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            keys: IndexMap::new(),
        }
    }

    /// Write `value` under `key` if `stamp` beats the current entry.
    /// Returns `true` when the visible value changed.
    pub fn put(&mut self, key: &str, stamp: Ts, value: Option<Ts>) -> bool {
        match self.keys.get_mut(key) {
            Some(entry) if entry.stamp >= stamp => false,
            Some(entry) => {
                let changed = entry.value != value;
                *entry = ObjEntry { stamp, value };
                changed
            }
            None => {
                self.keys.insert(key.to_string(), ObjEntry { stamp, value });
                value.is_some()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Ts> {
        self.keys.get(key).and_then(|e| e.value)
    }

    /// Live `(key, node)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Ts)> {
        self.keys
            .iter()
            .filter_map(|(k, e)| e.value.map(|v| (k.as_str(), v)))
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        let map = self
            .entries()
            .map(|(k, id)| (k.to_string(), view_of(index, id)))
            .collect();
        Value::Object(map)
    }
}

// ── ArrNode ───────────────────────────────────────────────────────────────

/// RGA array whose slots reference other nodes.
#[derive(Debug, Clone)]
pub struct ArrNode {
    pub id: Ts,
    pub rga: Rga,
}

impl ArrNode {
    pub fn new(id: Ts) -> Self {
        Self { id, rga: Rga::new() }
    }

    pub fn len(&self) -> usize {
        self.rga.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rga.is_empty()
    }

    /// Node references of all live slots, in order.
    pub fn elements(&self) -> Vec<Ts> {
        self.rga.slots().map(|(_, node)| node).collect()
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        Value::Array(
            self.rga
                .slots()
                .map(|(_, node)| view_of(index, node))
                .collect(),
        )
    }
}

// ── DocNode ───────────────────────────────────────────────────────────────

/// The kind of a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Con,
    Obj,
    Arr,
}

#[derive(Debug, Clone)]
pub enum DocNode {
    Con(ConNode),
    Obj(ObjNode),
    Arr(ArrNode),
}

impl DocNode {
    pub fn id(&self) -> Ts {
        match self {
            DocNode::Con(n) => n.id,
            DocNode::Obj(n) => n.id,
            DocNode::Arr(n) => n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            DocNode::Con(_) => NodeKind::Con,
            DocNode::Obj(_) => NodeKind::Obj,
            DocNode::Arr(_) => NodeKind::Arr,
        }
    }

    /// Plain JSON snapshot of this node and everything below it.
    pub fn view(&self, index: &NodeIndex) -> Value {
        match self {
            DocNode::Con(n) => n.val.to_json(),
            DocNode::Obj(n) => n.view(index),
            DocNode::Arr(n) => n.view(index),
        }
    }
}

/// JSON view of the node `id`; dangling references read as `null`.
pub fn view_of(index: &NodeIndex, id: Ts) -> Value {
    index.get(&id).map_or(Value::Null, |node| node.view(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ts;

    #[test]
    fn obj_put_is_last_writer_wins() {
        let mut obj = ObjNode::new(ts(9, 1));
        assert!(obj.put("a", ts(9, 5), Some(ts(9, 4))));
        assert!(!obj.put("a", ts(9, 3), Some(ts(9, 2))));
        assert_eq!(obj.get("a"), Some(ts(9, 4)));
        assert!(obj.put("a", ts(9, 6), None));
        assert_eq!(obj.get("a"), None);
        assert_eq!(obj.entries().count(), 0);
    }

    #[test]
    fn obj_delete_of_unknown_key_is_not_a_change() {
        let mut obj = ObjNode::new(ts(9, 1));
        assert!(!obj.put("x", ts(9, 2), None));
    }

    #[test]
    fn obj_keeps_insertion_order() {
        let mut obj = ObjNode::new(ts(9, 1));
        obj.put("z", ts(9, 2), Some(ts(9, 10)));
        obj.put("a", ts(9, 3), Some(ts(9, 11)));
        let keys: Vec<&str> = obj.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
