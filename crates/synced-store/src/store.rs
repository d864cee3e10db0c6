//! The reactive store: an arena of containers addressed by key paths.
//!
//! Every container lives in the arena under an opaque [`StoreId`] and has
//! at most one parent. The root is a mapping whose keys are the top-level
//! collections. Writes made between [`Store::begin_batch`] and
//! [`Store::end_batch`] are collected; closing the outermost batch turns
//! them into one [`Notification`] per interested subscriber. Delivering the
//! notifications is left to the caller so that subscribers never run while
//! the store is borrowed.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as Json;
use synced_doc::Primitive;

use crate::error::{SyncError, SyncResult};
use crate::value::Value;

// ── Identifiers ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One step of a store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

pub type StorePath = Vec<Key>;

pub fn display_path(path: &[Key]) -> String {
    let mut out = String::new();
    for key in path {
        match key {
            Key::Name(name) => {
                out.push('/');
                out.push_str(name);
            }
            Key::Index(i) => out.push_str(&format!("/{i}")),
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

// ── Containers ─────────────────────────────────────────────────────────────

/// Content of one position inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Primitive(Primitive),
    Node(StoreId),
}

impl Slot {
    pub fn node(&self) -> Option<StoreId> {
        match self {
            Slot::Node(id) => Some(*id),
            Slot::Primitive(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Sequence,
    Mapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Sequence(Vec<Slot>),
    Mapping(IndexMap<String, Slot>),
}

impl Body {
    pub fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Sequence => Body::Sequence(Vec::new()),
            ContainerKind::Mapping => Body::Mapping(IndexMap::new()),
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            Body::Sequence(_) => ContainerKind::Sequence,
            Body::Mapping(_) => ContainerKind::Mapping,
        }
    }

    pub fn slot(&self, key: &Key) -> Option<&Slot> {
        match (self, key) {
            (Body::Mapping(map), Key::Name(name)) => map.get(name),
            (Body::Sequence(items), Key::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    fn slots(&self) -> Box<dyn Iterator<Item = &Slot> + '_> {
        match self {
            Body::Sequence(items) => Box::new(items.iter()),
            Body::Mapping(map) => Box::new(map.values()),
        }
    }

    fn children(&self) -> impl Iterator<Item = StoreId> + '_ {
        self.slots().filter_map(Slot::node)
    }

    fn key_of(&self, child: StoreId) -> Option<Key> {
        let target = Slot::Node(child);
        match self {
            Body::Sequence(items) => items.iter().position(|s| *s == target).map(Key::Index),
            Body::Mapping(map) => map
                .iter()
                .find(|(_, s)| **s == target)
                .map(|(k, _)| Key::Name(k.clone())),
        }
    }
}

#[derive(Debug)]
struct Node {
    body: Body,
    parent: Option<StoreId>,
}

// ── Subscriptions ──────────────────────────────────────────────────────────

pub type Subscriber = Rc<dyn Fn(&[StorePath])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Changed paths owed to one subscriber after a batch.
pub struct Notification {
    pub paths: Vec<StorePath>,
    subscriber: Subscriber,
}

impl Notification {
    pub fn deliver(&self) {
        (self.subscriber)(&self.paths);
    }
}

fn overlaps(a: &[Key], b: &[Key]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y)
}

// ── Store ──────────────────────────────────────────────────────────────────

pub struct Store {
    nodes: HashMap<StoreId, Node>,
    root: StoreId,
    next_id: u64,
    depth: usize,
    dirty: Vec<(StoreId, Option<Key>)>,
    subscribers: Vec<(SubscriptionId, StorePath, Subscriber)>,
    next_subscription: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let root = StoreId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                body: Body::empty(ContainerKind::Mapping),
                parent: None,
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            depth: 0,
            dirty: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn root(&self) -> StoreId {
        self.root
    }

    /// Number of live containers, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn contains(&self, id: StoreId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn body(&self, id: StoreId) -> Option<&Body> {
        self.nodes.get(&id).map(|n| &n.body)
    }

    pub fn kind(&self, id: StoreId) -> Option<ContainerKind> {
        self.body(id).map(Body::kind)
    }

    pub fn parent(&self, id: StoreId) -> Option<StoreId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn slot(&self, parent: StoreId, key: &Key) -> Option<&Slot> {
        self.body(parent).and_then(|b| b.slot(key))
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Deep value at `path` from the root.
    pub fn get(&self, path: &[Key]) -> Option<Value> {
        let mut slot = Slot::Node(self.root);
        for key in path {
            slot = self.slot(slot.node()?, key)?.clone();
        }
        Some(self.slot_value(&slot))
    }

    /// Deep value of container `id`.
    pub fn value(&self, id: StoreId) -> Value {
        match self.body(id) {
            Some(Body::Sequence(items)) => {
                Value::Sequence(items.iter().map(|s| self.slot_value(s)).collect())
            }
            Some(Body::Mapping(map)) => Value::Mapping(
                map.iter()
                    .map(|(k, s)| (k.clone(), self.slot_value(s)))
                    .collect(),
            ),
            None => Value::null(),
        }
    }

    pub fn slot_value(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Primitive(p) => Value::Primitive(p.clone()),
            Slot::Node(id) => self.value(*id),
        }
    }

    /// Deep value of container `id` with every container, `id` included,
    /// wrapped in `Tracked` so writing it back keeps identities.
    pub fn tracked(&self, id: StoreId) -> Value {
        let content = match self.body(id) {
            Some(Body::Sequence(items)) => {
                Value::Sequence(items.iter().map(|s| self.tracked_slot(s)).collect())
            }
            Some(Body::Mapping(map)) => Value::Mapping(
                map.iter()
                    .map(|(k, s)| (k.clone(), self.tracked_slot(s)))
                    .collect(),
            ),
            None => return Value::null(),
        };
        Value::tracked(id, content)
    }

    /// Like [`Store::tracked`], for whatever sits in `slot`.
    pub fn tracked_slot(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Primitive(p) => Value::Primitive(p.clone()),
            Slot::Node(id) => self.tracked(*id),
        }
    }

    pub fn to_json(&self) -> Json {
        self.value(self.root).to_json()
    }

    /// Path from the root to `id`, or `None` for detached containers.
    pub fn path_of(&self, id: StoreId) -> Option<StorePath> {
        let mut path = Vec::new();
        let mut current = id;
        while current != self.root {
            let parent = self.parent(current)?;
            path.push(self.body(parent)?.key_of(current)?);
            current = parent;
        }
        path.reverse();
        Some(path)
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// A new, detached, empty container.
    pub(crate) fn create(&mut self, kind: ContainerKind) -> StoreId {
        let id = StoreId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                body: Body::empty(kind),
                parent: None,
            },
        );
        id
    }

    /// Write `slot` at `key` of `parent`; `Key::Index(len)` appends.
    /// Returns the container the write detached, if any.
    pub(crate) fn set_slot(
        &mut self,
        parent: StoreId,
        key: &Key,
        slot: Slot,
    ) -> SyncResult<Option<StoreId>> {
        let node = self
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| SyncError::PathNotFound(parent.to_string()))?;
        let previous = match (&mut node.body, key) {
            (Body::Mapping(map), Key::Name(name)) => {
                if map.get(name) == Some(&slot) {
                    return Ok(None);
                }
                map.insert(name.clone(), slot.clone())
            }
            (Body::Sequence(items), Key::Index(i)) if *i < items.len() => {
                if items[*i] == slot {
                    return Ok(None);
                }
                Some(std::mem::replace(&mut items[*i], slot.clone()))
            }
            (Body::Sequence(items), Key::Index(i)) if *i == items.len() => {
                items.push(slot.clone());
                None
            }
            _ => {
                return Err(SyncError::Unsupported(format!(
                    "cannot write {key} into {parent}"
                )))
            }
        };
        self.adopt(&slot, parent);
        self.dirty.push((parent, Some(key.clone())));
        Ok(previous
            .and_then(|s| s.node())
            .and_then(|old| self.detach(old, parent)))
    }

    /// Remove `key` from `parent`. Returns the detached container, if any.
    pub(crate) fn remove_key(&mut self, parent: StoreId, key: &Key) -> Option<StoreId> {
        let node = self.nodes.get_mut(&parent)?;
        let removed = match (&mut node.body, key) {
            (Body::Mapping(map), Key::Name(name)) => map.shift_remove(name)?,
            (Body::Sequence(items), Key::Index(i)) if *i < items.len() => items.remove(*i),
            _ => return None,
        };
        self.dirty.push((parent, Some(key.clone())));
        removed.node().and_then(|old| self.detach(old, parent))
    }

    /// Replace the whole content of `id`. Returns the detached containers.
    pub(crate) fn replace_body(&mut self, id: StoreId, body: Body) -> Vec<StoreId> {
        let Some(node) = self.nodes.get_mut(&id) else {
            return Vec::new();
        };
        if node.body == body {
            return Vec::new();
        }
        let old = std::mem::replace(&mut node.body, body);
        let adopted: Vec<StoreId> = node.body.children().collect();
        for child in adopted {
            if let Some(n) = self.nodes.get_mut(&child) {
                n.parent = Some(id);
            }
        }
        self.dirty.push((id, None));
        old.children()
            .filter_map(|child| self.detach(child, id))
            .collect()
    }

    /// Free a detached container and everything below it. Returns every
    /// freed ID; containers that were re-attached elsewhere are kept.
    pub(crate) fn release(&mut self, id: StoreId) -> Vec<StoreId> {
        let mut freed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if current == self.root {
                continue;
            }
            let detached = current == id && self.parent(current).is_none();
            let orphaned = current != id;
            if !(detached || orphaned) {
                continue;
            }
            let Some(node) = self.nodes.remove(&current) else {
                continue;
            };
            for child in node.body.children() {
                if self.parent(child) == Some(current) {
                    stack.push(child);
                }
            }
            freed.push(current);
        }
        freed
    }

    fn adopt(&mut self, slot: &Slot, parent: StoreId) {
        if let Some(child) = slot.node() {
            if let Some(n) = self.nodes.get_mut(&child) {
                n.parent = Some(parent);
            }
        }
    }

    fn detach(&mut self, child: StoreId, parent: StoreId) -> Option<StoreId> {
        let still_held = self
            .body(parent)
            .is_some_and(|b| b.children().any(|c| c == child));
        let node = self.nodes.get_mut(&child)?;
        if still_held || node.parent != Some(parent) {
            return None;
        }
        node.parent = None;
        Some(child)
    }

    // ── Batches and subscriptions ────────────────────────────────────────

    pub fn subscribe(&mut self, path: StorePath, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, path, subscriber));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(other, _, _)| *other != id);
        before != self.subscribers.len()
    }

    pub(crate) fn begin_batch(&mut self) {
        self.depth += 1;
    }

    /// Close a batch. The outermost close yields the notifications to
    /// deliver; inner closes yield nothing.
    pub(crate) fn end_batch(&mut self) -> Vec<Notification> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 || self.dirty.is_empty() {
            return Vec::new();
        }
        let mut changed: IndexSet<StorePath> = IndexSet::new();
        for (id, key) in std::mem::take(&mut self.dirty) {
            let Some(mut path) = self.path_of(id) else {
                continue;
            };
            path.extend(key);
            changed.insert(path);
        }
        self.subscribers
            .iter()
            .filter_map(|(_, watched, subscriber)| {
                let paths: Vec<StorePath> = changed
                    .iter()
                    .filter(|p| overlaps(watched, p))
                    .cloned()
                    .collect();
                (!paths.is_empty()).then(|| Notification {
                    paths,
                    subscriber: subscriber.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn prim(n: i64) -> Slot {
        Slot::Primitive(Primitive::from(n))
    }

    #[test]
    fn nested_writes_and_deep_reads() {
        let mut store = Store::new();
        let users = store.create(ContainerKind::Mapping);
        store.set_slot(store.root(), &"users".into(), Slot::Node(users)).unwrap();
        let list = store.create(ContainerKind::Sequence);
        store.set_slot(users, &"tests".into(), Slot::Node(list)).unwrap();
        store.set_slot(list, &Key::Index(0), prim(1)).unwrap();
        store.set_slot(list, &Key::Index(1), prim(2)).unwrap();

        assert_eq!(store.to_json(), json!({"users": {"tests": [1, 2]}}));
        assert_eq!(
            store.get(&["users".into(), "tests".into(), Key::Index(1)]),
            Some(Value::from(2))
        );
        assert_eq!(store.path_of(list), Some(vec!["users".into(), "tests".into()]));
        assert!(store.set_slot(list, &Key::Index(5), prim(0)).is_err());
    }

    #[test]
    fn tracked_read_tags_every_container() {
        let mut store = Store::new();
        let child = store.create(ContainerKind::Sequence);
        store.set_slot(store.root(), &"a".into(), Slot::Node(child)).unwrap();
        store.set_slot(child, &Key::Index(0), prim(1)).unwrap();
        store.set_slot(store.root(), &"b".into(), prim(3)).unwrap();

        let read = store.tracked(store.root());
        assert_eq!(read.tracked_id(), Some(store.root()));
        assert_eq!(read.get("a").and_then(Value::tracked_id), Some(child));
        assert_eq!(read.to_json(), json!({"a": [1], "b": 3}));
        assert_eq!(read.to_json(), store.to_json());
    }

    #[test]
    fn removed_subtree_is_released() {
        let mut store = Store::new();
        let a = store.create(ContainerKind::Mapping);
        let b = store.create(ContainerKind::Sequence);
        store.set_slot(store.root(), &"a".into(), Slot::Node(a)).unwrap();
        store.set_slot(a, &"b".into(), Slot::Node(b)).unwrap();
        let detached = store.remove_key(store.root(), &"a".into()).unwrap();
        let mut freed = store.release(detached);
        freed.sort();
        assert_eq!(freed, vec![a, b]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replace_body_keeps_moved_children() {
        let mut store = Store::new();
        let list = store.create(ContainerKind::Sequence);
        let x = store.create(ContainerKind::Mapping);
        let y = store.create(ContainerKind::Mapping);
        store.set_slot(store.root(), &"list".into(), Slot::Node(list)).unwrap();
        store.replace_body(list, Body::Sequence(vec![Slot::Node(x), Slot::Node(y)]));
        let dropped = store.replace_body(list, Body::Sequence(vec![Slot::Node(y)]));
        assert_eq!(dropped, vec![x]);
        assert_eq!(store.path_of(y), Some(vec!["list".into(), Key::Index(0)]));
        assert!(store.release(y).is_empty());
    }

    #[test]
    fn batch_notifies_overlapping_subscribers_once() {
        let mut store = Store::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        store.subscribe(
            vec!["users".into()],
            Rc::new(move |paths: &[StorePath]| log.borrow_mut().push(paths.len())),
        );
        let other = store.subscribe(vec!["other".into()], Rc::new(|_: &[StorePath]| panic!()));

        store.begin_batch();
        let users = store.create(ContainerKind::Mapping);
        store.set_slot(store.root(), &"users".into(), Slot::Node(users)).unwrap();
        store.begin_batch();
        store.set_slot(users, &"boris".into(), prim(1)).unwrap();
        assert!(store.end_batch().is_empty());
        let notes = store.end_batch();
        assert_eq!(notes.len(), 1);
        notes.iter().for_each(Notification::deliver);
        assert_eq!(*seen.borrow(), vec![2]);
        assert!(store.unsubscribe(other));
    }

    #[test]
    fn unchanged_writes_are_not_dirty() {
        let mut store = Store::new();
        store.set_slot(store.root(), &"k".into(), prim(1)).unwrap();
        store.end_batch();
        store.subscribe(vec![], Rc::new(|_: &[StorePath]| panic!("no change expected")));
        store.begin_batch();
        store.set_slot(store.root(), &"k".into(), prim(1)).unwrap();
        assert!(store.end_batch().is_empty());
    }
}
