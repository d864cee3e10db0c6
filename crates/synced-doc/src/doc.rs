//! [`Doc`]: shared handle to a document with transactions and observers.
//!
//! # Overview
//!
//! Local edits run inside [`Doc::transact`]. Every edit is recorded by a
//! [`PatchBuilder`] and applied to the model immediately, so reads later in
//! the same transaction see it. When the closure returns, the patch is
//! pushed to the outbox (and to `on_patch` listeners) and every node
//! observer whose node changed is notified once with a [`ChangeEvent`].
//!
//! Remote patches enter through [`Doc::apply_patch`] and notify observers
//! the same way.
//!
//! Listeners run after the model borrow has been released: they may read
//! the document and register or remove observers, but must not start a
//! new transaction synchronously.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::builder::PatchBuilder;
use crate::clock::{Ts, ORIGIN};
use crate::error::DocError;
use crate::model::{ChangeSet, Model, NodeChange};
use crate::nodes::{DocNode, NodeKind};
use crate::operations::Op;
use crate::patch::Patch;
use crate::value::Primitive;

// ── Events ─────────────────────────────────────────────────────────────────

/// Where a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Delivered to the observers of `target` once per transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub target: Ts,
    pub change: NodeChange,
    pub origin: Origin,
}

pub type Listener = Rc<dyn Fn(&ChangeEvent)>;
pub type PatchListener = Rc<dyn Fn(&Patch)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Observers {
    next: u64,
    by_node: HashMap<Ts, Vec<(ObserverId, Listener)>>,
    node_of: HashMap<ObserverId, Ts>,
}

struct DocInner {
    model: RefCell<Model>,
    observers: RefCell<Observers>,
    patch_listeners: RefCell<Vec<PatchListener>>,
    outbox: RefCell<Vec<Patch>>,
}

// ── Doc ────────────────────────────────────────────────────────────────────

/// Cheaply cloneable handle to one replica of a document.
#[derive(Clone)]
pub struct Doc {
    inner: Rc<DocInner>,
}

impl Doc {
    /// Create an empty replica with session ID `sid` (must be ≥ 65536).
    pub fn new(sid: u64) -> Self {
        Self {
            inner: Rc::new(DocInner {
                model: RefCell::new(Model::new(sid)),
                observers: RefCell::new(Observers::default()),
                patch_listeners: RefCell::new(Vec::new()),
                outbox: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn sid(&self) -> u64 {
        self.inner.model.borrow().clock.sid
    }

    /// Open the root map called `name`.
    pub fn root_map(&self, name: &str) -> Result<Ts, DocError> {
        self.inner.model.borrow_mut().root(name, NodeKind::Obj)
    }

    /// Open the root array called `name`.
    pub fn root_array(&self, name: &str) -> Result<Ts, DocError> {
        self.inner.model.borrow_mut().root(name, NodeKind::Arr)
    }

    /// Borrow the model read-only.
    pub fn model(&self) -> Ref<'_, Model> {
        self.inner.model.borrow()
    }

    /// Plain JSON snapshot of node `id`.
    pub fn to_json(&self, id: Ts) -> Value {
        self.inner.model.borrow().view(id)
    }

    /// JSON snapshot of all opened root collections.
    pub fn to_json_roots(&self) -> Value {
        self.inner.model.borrow().view_roots()
    }

    /// Run `f` as one local transaction and notify observers afterwards.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Transaction<'_>) -> R) -> R {
        let (result, patch, changes) = {
            let model = self.inner.model.borrow_mut();
            let mut tx = Transaction::new(model);
            let result = f(&mut tx);
            let (patch, changes) = tx.finish();
            (result, patch, changes)
        };
        if !patch.is_empty() {
            debug!(ops = patch.ops.len(), changed = changes.nodes.len(), "local transaction");
            self.inner.outbox.borrow_mut().push(patch.clone());
            let listeners: Vec<PatchListener> = self.inner.patch_listeners.borrow().clone();
            for listener in listeners {
                listener(&patch);
            }
        }
        self.dispatch(changes, Origin::Local);
        result
    }

    /// Merge a patch produced by another replica.
    pub fn apply_patch(&self, patch: &Patch) {
        let mut changes = ChangeSet::default();
        self.inner
            .model
            .borrow_mut()
            .apply_patch(patch, &mut changes);
        debug!(ops = patch.ops.len(), changed = changes.nodes.len(), "remote patch");
        self.dispatch(changes, Origin::Remote);
    }

    /// Register `listener` for changes of node `node`.
    pub fn observe(&self, node: Ts, listener: impl Fn(&ChangeEvent) + 'static) -> ObserverId {
        let mut observers = self.inner.observers.borrow_mut();
        let id = ObserverId(observers.next);
        observers.next += 1;
        observers
            .by_node
            .entry(node)
            .or_default()
            .push((id, Rc::new(listener)));
        observers.node_of.insert(id, node);
        trace!(node = %node, "observer registered");
        id
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.borrow_mut();
        let Some(node) = observers.node_of.remove(&id) else {
            return false;
        };
        if let Some(list) = observers.by_node.get_mut(&node) {
            list.retain(|(other, _)| *other != id);
            if list.is_empty() {
                observers.by_node.remove(&node);
            }
        }
        true
    }

    /// Number of registered node observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().node_of.len()
    }

    /// Call `listener` with every local patch as it is committed.
    pub fn on_patch(&self, listener: impl Fn(&Patch) + 'static) {
        self.inner
            .patch_listeners
            .borrow_mut()
            .push(Rc::new(listener));
    }

    /// Drain the local patches committed since the last call.
    pub fn take_outbox(&self) -> Vec<Patch> {
        std::mem::take(&mut *self.inner.outbox.borrow_mut())
    }

    fn dispatch(&self, changes: ChangeSet, origin: Origin) {
        let mut calls: Vec<(Listener, ChangeEvent)> = Vec::new();
        {
            let observers = self.inner.observers.borrow();
            for (target, change) in changes.nodes {
                let Some(list) = observers.by_node.get(&target) else {
                    continue;
                };
                let event = ChangeEvent {
                    target,
                    change,
                    origin,
                };
                for (_, listener) in list {
                    calls.push((listener.clone(), event.clone()));
                }
            }
        }
        for (listener, event) in calls {
            listener(&event);
        }
    }
}

// ── Transaction ────────────────────────────────────────────────────────────

/// Read/write access to the model for the duration of one transaction.
pub struct Transaction<'a> {
    model: RefMut<'a, Model>,
    builder: PatchBuilder,
    changes: ChangeSet,
}

impl<'a> Transaction<'a> {
    fn new(model: RefMut<'a, Model>) -> Self {
        let builder = PatchBuilder::new(model.clock.sid, model.clock.time);
        Self {
            model,
            builder,
            changes: ChangeSet::default(),
        }
    }

    fn finish(mut self) -> (Patch, ChangeSet) {
        let patch = self.builder.flush();
        if !patch.is_empty() {
            self.model.tick += 1;
        }
        (patch, self.changes)
    }

    fn apply_last(&mut self) {
        if let Some(op) = self.builder.patch.ops.last() {
            let op: Op = op.clone();
            self.model.apply_operation(&op, &mut self.changes);
        }
    }

    /// Number of operations recorded so far.
    pub fn op_count(&self) -> usize {
        self.builder.patch.ops.len()
    }

    /// Operations recorded so far, in order.
    pub fn ops(&self) -> &[Op] {
        &self.builder.patch.ops
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn kind(&self, id: Ts) -> Option<NodeKind> {
        self.model.node(id).map(DocNode::kind)
    }

    /// The primitive held by a `con` node.
    pub fn con_value(&self, id: Ts) -> Option<&Primitive> {
        match self.model.node(id) {
            Some(DocNode::Con(n)) => Some(&n.val),
            _ => None,
        }
    }

    pub fn map_get(&self, obj: Ts, key: &str) -> Result<Option<Ts>, DocError> {
        Ok(self.model.obj(obj)?.get(key))
    }

    pub fn map_keys(&self, obj: Ts) -> Result<Vec<String>, DocError> {
        Ok(self
            .model
            .obj(obj)?
            .entries()
            .map(|(k, _)| k.to_string())
            .collect())
    }

    pub fn arr_len(&self, arr: Ts) -> Result<usize, DocError> {
        Ok(self.model.arr(arr)?.len())
    }

    pub fn arr_get(&self, arr: Ts, index: usize) -> Result<Option<Ts>, DocError> {
        Ok(self.model.arr(arr)?.rga.get(index))
    }

    pub fn arr_elements(&self, arr: Ts) -> Result<Vec<Ts>, DocError> {
        Ok(self.model.arr(arr)?.elements())
    }

    pub fn to_json(&self, id: Ts) -> Value {
        self.model.view(id)
    }

    // ── Creation ─────────────────────────────────────────────────────────

    pub fn new_con(&mut self, val: Primitive) -> Ts {
        let id = self.builder.con(val);
        self.apply_last();
        id
    }

    pub fn new_map(&mut self) -> Ts {
        let id = self.builder.obj();
        self.apply_last();
        id
    }

    pub fn new_array(&mut self) -> Ts {
        let id = self.builder.arr();
        self.apply_last();
        id
    }

    // ── Map edits ────────────────────────────────────────────────────────

    /// Point `key` of map `obj` at node `value`.
    pub fn map_set(&mut self, obj: Ts, key: &str, value: Ts) -> Result<(), DocError> {
        self.model.obj(obj)?;
        self.builder.ins_obj(obj, vec![(key.to_string(), Some(value))]);
        self.apply_last();
        Ok(())
    }

    /// Set `key` of map `obj` to a fresh `con` leaf.
    pub fn map_set_primitive(&mut self, obj: Ts, key: &str, val: Primitive) -> Result<(), DocError> {
        self.model.obj(obj)?;
        let con = self.new_con(val);
        self.map_set(obj, key, con)
    }

    pub fn map_delete(&mut self, obj: Ts, key: &str) -> Result<(), DocError> {
        if self.model.obj(obj)?.get(key).is_none() {
            return Ok(());
        }
        self.builder.ins_obj(obj, vec![(key.to_string(), None)]);
        self.apply_last();
        Ok(())
    }

    // ── Array edits ──────────────────────────────────────────────────────

    /// Insert node references at live position `index`.
    pub fn arr_insert(&mut self, arr: Ts, index: usize, values: Vec<Ts>) -> Result<(), DocError> {
        if values.is_empty() {
            return Ok(());
        }
        let node = self.model.arr(arr)?;
        let len = node.len();
        if index > len {
            return Err(DocError::OutOfBounds { index, len });
        }
        let after = if index == 0 {
            ORIGIN
        } else {
            node.rga
                .slot_at(index - 1)
                .ok_or(DocError::OutOfBounds { index, len })?
        };
        self.builder.ins_arr(arr, after, values);
        self.apply_last();
        Ok(())
    }

    /// Delete `length` elements starting at live position `index`.
    pub fn arr_delete(&mut self, arr: Ts, index: usize, length: usize) -> Result<(), DocError> {
        if length == 0 {
            return Ok(());
        }
        let node = self.model.arr(arr)?;
        let len = node.len();
        if index + length > len {
            return Err(DocError::OutOfBounds {
                index: index + length - 1,
                len,
            });
        }
        let spans = node.rga.interval(index, length);
        self.builder.del(arr, spans);
        self.apply_last();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn transaction_commits_patch_and_notifies() {
        let doc = Doc::new(100_000);
        let users = doc.root_map("users").unwrap();
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        doc.observe(users, move |event| {
            assert_eq!(event.origin, Origin::Local);
            assert!(matches!(&event.change, NodeChange::Map(keys) if keys.len() == 2));
            seen.set(seen.get() + 1);
        });
        doc.transact(|tx| {
            tx.map_set_primitive(users, "a", Primitive::from(1)).unwrap();
            tx.map_set_primitive(users, "b", Primitive::from(2)).unwrap();
        });
        assert_eq!(hits.get(), 1);
        assert_eq!(doc.to_json(users), json!({"a": 1, "b": 2}));
        assert_eq!(doc.take_outbox().len(), 1);
        assert!(doc.take_outbox().is_empty());
    }

    #[test]
    fn empty_transaction_produces_no_patch() {
        let doc = Doc::new(100_000);
        let users = doc.root_map("users").unwrap();
        doc.transact(|tx| tx.map_delete(users, "missing").unwrap());
        assert!(doc.take_outbox().is_empty());
    }

    #[test]
    fn array_edits_by_position() {
        let doc = Doc::new(100_000);
        let list = doc.root_array("list").unwrap();
        doc.transact(|tx| {
            let items: Vec<Ts> = (1..=4).map(|n| tx.new_con(Primitive::from(n))).collect();
            tx.arr_insert(list, 0, items).unwrap();
            tx.arr_delete(list, 1, 2).unwrap();
            let five = tx.new_con(Primitive::from(5));
            tx.arr_insert(list, 1, vec![five]).unwrap();
            assert!(matches!(
                tx.arr_insert(list, 9, vec![five]),
                Err(DocError::OutOfBounds { index: 9, len: 3 })
            ));
        });
        assert_eq!(doc.to_json(list), json!([1, 5, 4]));
    }

    #[test]
    fn listener_may_read_and_unobserve() {
        let doc = Doc::new(100_000);
        let list = doc.root_array("list").unwrap();
        let handle = doc.clone();
        let id = Rc::new(Cell::new(None));
        let own = id.clone();
        let observer = doc.observe(list, move |event| {
            assert_eq!(handle.to_json(event.target), json!([true]));
            if let Some(me) = own.get() {
                assert!(handle.unobserve(me));
            }
        });
        id.set(Some(observer));
        doc.transact(|tx| {
            let t = tx.new_con(Primitive::from(true));
            tx.arr_insert(list, 0, vec![t]).unwrap();
        });
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn patches_replicate_between_docs() {
        let a = Doc::new(100_000);
        let b = Doc::new(200_000);
        let list_a = a.root_array("list").unwrap();
        let list_b = b.root_array("list").unwrap();
        assert_eq!(list_a, list_b);
        a.transact(|tx| {
            let m = tx.new_map();
            tx.map_set_primitive(m, "x", Primitive::from("y")).unwrap();
            tx.arr_insert(list_a, 0, vec![m]).unwrap();
        });
        let remote_events = Rc::new(Cell::new(0));
        let counter = remote_events.clone();
        b.observe(list_b, move |event| {
            assert_eq!(event.origin, Origin::Remote);
            counter.set(counter.get() + 1);
        });
        for patch in a.take_outbox() {
            b.apply_patch(&patch);
        }
        assert_eq!(b.to_json(list_b), json!([{"x": "y"}]));
        assert_eq!(remote_events.get(), 1);
    }
}
