//! [`SyncedStore`]: the public entry point.
//!
//! [`SyncedStore::mutate`] resolves a [`Path`] against the store and the
//! document in lockstep, computes the new value for every resolved target
//! and projects it into the document. All targets of one call share one
//! document transaction and one store batch.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value as Json;
use synced_doc::{Doc, NodeKind, Transaction, Ts};
use tracing::debug;

use crate::config::SyncConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{SyncError, SyncResult};
use crate::links::Links;
use crate::path::{Path, Predicate, Segment, Update};
use crate::projector::DocParent;
use crate::queue::{self, BatchTarget, QueuedUpdate, Scheduler, UpdateQueue};
use crate::store::{
    display_path, Body, Key, Notification, Slot, Store, StoreId, StorePath,
    SubscriptionId,
};
use crate::value::Value;

// ── Engine ─────────────────────────────────────────────────────────────────

pub(crate) struct Engine {
    pub(crate) doc: Doc,
    pub(crate) store: RefCell<Store>,
    pub(crate) links: RefCell<Links>,
    pub(crate) diagnostics: RefCell<Diagnostics>,
    pub(crate) roots: RefCell<IndexMap<String, Ts>>,
    pub(crate) config: SyncConfig,
    pub(crate) this: Weak<Engine>,
    queue: UpdateQueue<Engine>,
}

impl BatchTarget for Engine {
    fn update_queue(&self) -> &UpdateQueue<Self> {
        &self.queue
    }

    fn apply_batch(&self, updates: Vec<QueuedUpdate<Self>>) {
        let count = updates.len();
        self.store.borrow_mut().begin_batch();
        for update in updates {
            update(self);
        }
        let notifications = self.store.borrow_mut().end_batch();
        debug!(
            updates = count,
            notified = notifications.len(),
            "read-path batch applied"
        );
        deliver(notifications);
    }
}

fn deliver(notifications: Vec<Notification>) {
    for notification in &notifications {
        notification.deliver();
    }
}

/// One resolved write target.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub store_parent: StoreId,
    pub doc_parent: DocParent,
    pub key: Key,
    pub path: StorePath,
}

#[derive(Debug, Clone)]
struct Cursor {
    store: StoreId,
    doc: DocParent,
    path: StorePath,
}

/// Keep the first target per `(store parent, key)`; report the rest.
pub(crate) fn dedupe_targets(targets: Vec<Target>, errors: &mut Vec<SyncError>) -> Vec<Target> {
    let mut seen: HashSet<(StoreId, Key)> = HashSet::new();
    targets
        .into_iter()
        .filter(|t| {
            let fresh = seen.insert((t.store_parent, t.key.clone()));
            if !fresh {
                errors.push(SyncError::OverlappingTargets(display_path(&t.path)));
            }
            fresh
        })
        .collect()
}

impl Engine {
    pub(crate) fn enqueue(&self, update: QueuedUpdate<Engine>) {
        self.queue.enqueue(self.this.clone(), update);
    }

    fn report(&self, error: SyncError) {
        self.diagnostics.borrow_mut().report(error);
    }

    // ── Construction ─────────────────────────────────────────────────────

    fn init(&self, shape: Value) {
        let Value::Mapping(entries) = shape else {
            self.report(SyncError::ShapeViolation(
                "the initial shape must be a mapping of top-level collections".into(),
            ));
            return;
        };

        let mut seeds: Vec<(String, Ts, Value)> = Vec::new();
        for (name, value) in entries {
            let opened = match &value {
                Value::Mapping(_) => self.doc.root_map(&name),
                Value::Sequence(_) => self.doc.root_array(&name),
                _ => {
                    self.report(SyncError::ShapeViolation(format!(
                        "top-level `{name}` must be a sequence or a mapping"
                    )));
                    continue;
                }
            };
            match opened {
                Ok(root) => {
                    self.roots.borrow_mut().insert(name.clone(), root);
                    seeds.push((name, root, value));
                }
                Err(error) => self.report(SyncError::ShapeViolation(format!(
                    "top-level `{name}`: {error}"
                ))),
            }
        }

        let store_root = self.store.borrow().root();
        self.store.borrow_mut().begin_batch();
        self.doc.transact(|tx| {
            for (name, root, value) in &seeds {
                let loaded = match tx.kind(*root) {
                    Some(NodeKind::Obj) => tx.map_keys(*root).is_ok_and(|keys| !keys.is_empty()),
                    Some(NodeKind::Arr) => tx.arr_len(*root).is_ok_and(|len| len > 0),
                    _ => false,
                };
                if loaded {
                    debug!(collection = %name, "mirroring existing document content");
                    self.mirror_root(tx.model(), name, *root);
                    continue;
                }
                let key = Key::Name(name.clone());
                if let Err(error) = self.project(tx, DocParent::Root, store_root, &key, Some(value)) {
                    self.report(error);
                    self.mirror_root(tx.model(), name, *root);
                }
            }
        });
        let notifications = self.store.borrow_mut().end_batch();
        deliver(notifications);
    }

    // ── Path resolution ──────────────────────────────────────────────────

    fn resolve(&self, segments: &[Segment]) -> (Vec<Target>, Vec<SyncError>) {
        let mut errors = Vec::new();
        let Some((last, init)) = segments.split_last() else {
            errors.push(SyncError::Unsupported("empty mutation path".into()));
            return (Vec::new(), errors);
        };

        let store = self.store.borrow();
        let links = self.links.borrow();
        let mut cursors = vec![Cursor {
            store: store.root(),
            doc: DocParent::Root,
            path: Vec::new(),
        }];

        for segment in init {
            let mut next = Vec::new();
            for cursor in &cursors {
                let keys = match keys_for(&store, cursor, segment) {
                    Ok(keys) => keys,
                    Err(error) => {
                        errors.push(error);
                        continue;
                    }
                };
                for key in keys {
                    match self.descend(&store, &links, cursor, key) {
                        Ok(child) => next.push(child),
                        Err(error) => errors.push(error),
                    }
                }
            }
            cursors = next;
        }

        let mut targets = Vec::new();
        for cursor in cursors {
            match keys_for(&store, &cursor, last) {
                Ok(keys) => targets.extend(keys.into_iter().map(|key| {
                    let mut path = cursor.path.clone();
                    path.push(key.clone());
                    Target {
                        store_parent: cursor.store,
                        doc_parent: cursor.doc,
                        key,
                        path,
                    }
                })),
                Err(error) => errors.push(error),
            }
        }
        let targets = dedupe_targets(targets, &mut errors);
        (targets, errors)
    }

    fn descend(&self, store: &Store, links: &Links, cursor: &Cursor, key: Key) -> SyncResult<Cursor> {
        let slot = store.slot(cursor.store, &key).cloned();
        let mut path = cursor.path.clone();
        path.push(key);
        let child = match slot {
            Some(Slot::Node(child)) => child,
            Some(Slot::Primitive(_)) => {
                return Err(SyncError::PathNotFound(format!(
                    "{} is not a container",
                    display_path(&path)
                )))
            }
            None => return Err(SyncError::PathNotFound(display_path(&path))),
        };
        let doc = links.doc_of(child).ok_or_else(|| {
            SyncError::PathNotFound(format!("{} has no document node", display_path(&path)))
        })?;
        Ok(Cursor {
            store: child,
            doc: DocParent::Node(doc),
            path,
        })
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    fn mutate(&self, path: &Path, update: &Update) -> MutationReport {
        let (targets, mut errors) = self.resolve(path.segments());
        let branches = targets.len();
        let mut applied = 0;

        self.store.borrow_mut().begin_batch();
        let ops = self.doc.transact(|tx| {
            // Last to first, so removals inside one sequence keep the
            // indices of the targets still pending valid.
            for target in targets.iter().rev() {
                match self.apply_target(tx, target, update) {
                    Ok(()) => applied += 1,
                    Err(error) => errors.push(error),
                }
            }
            if self.config.log_operations {
                for op in tx.ops() {
                    debug!(op = op.name(), id = %op.id(), "document operation");
                }
            }
            tx.op_count()
        });
        let notifications = self.store.borrow_mut().end_batch();

        for error in &errors {
            self.report(error.clone());
        }
        debug!(branches, applied, ops, errors = errors.len(), "mutation projected");
        deliver(notifications);

        MutationReport {
            branches,
            applied,
            ops,
            errors,
        }
    }

    fn apply_target(&self, tx: &mut Transaction<'_>, target: &Target, update: &Update) -> SyncResult<()> {
        let current = {
            let store = self.store.borrow();
            store
                .slot(target.store_parent, &target.key)
                .map(|slot| store.tracked_slot(slot))
        };
        let value = match update {
            Update::Replace(value) => Some(value.clone()),
            Update::Remove => None,
            Update::Transform(f) => f(current.as_ref()),
            Update::MutateInPlace(f) => {
                let Some(mut draft) = current.clone() else {
                    return Err(SyncError::Unsupported(format!(
                        "nothing at {} to mutate in place",
                        display_path(&target.path)
                    )));
                };
                f(&mut draft);
                Some(draft)
            }
        };
        if value.is_none() && current.is_none() {
            return Ok(());
        }
        self.project(tx, target.doc_parent, target.store_parent, &target.key, value.as_ref())
    }
}

/// Keys selected by `segment` under `cursor`.
fn keys_for(store: &Store, cursor: &Cursor, segment: &Segment) -> SyncResult<Vec<Key>> {
    match segment {
        Segment::Key(name) => Ok(vec![Key::Name(name.clone())]),
        Segment::Index(index) => Ok(vec![Key::Index(*index)]),
        Segment::Filter(predicate) => filter(store, cursor, predicate),
    }
}

fn filter(store: &Store, cursor: &Cursor, predicate: &Predicate) -> SyncResult<Vec<Key>> {
    match store.body(cursor.store) {
        Some(Body::Sequence(items)) => Ok(items
            .iter()
            .enumerate()
            .filter(|(_, slot)| predicate(&store.tracked_slot(slot)))
            .map(|(i, _)| Key::Index(i))
            .collect()),
        _ => Err(SyncError::FilterOnNonSequence(display_path(&cursor.path))),
    }
}

// ── Public surface ─────────────────────────────────────────────────────────

/// Outcome of one [`SyncedStore::mutate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Targets the path resolved to.
    pub branches: usize,
    /// Targets projected without error.
    pub applied: usize,
    /// Document operations emitted.
    pub ops: usize,
    pub errors: Vec<SyncError>,
}

impl MutationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A reactive store kept in sync with a [`Doc`].
#[derive(Clone)]
pub struct SyncedStore {
    engine: Rc<Engine>,
}

/// Create a store mirroring the top-level collections named in `shape`.
///
/// `shape` maps each collection name to a sequence or a mapping. A
/// collection the document already has content for is mirrored from the
/// document; otherwise the content given in `shape` is written into it.
/// Read-path updates are flushed through `scheduler` after
/// `config.debounce`.
pub fn create_synced_store(
    doc: &Doc,
    shape: impl Into<Value>,
    config: SyncConfig,
    scheduler: Rc<dyn Scheduler>,
) -> SyncedStore {
    let engine = Rc::new_cyclic(|this| Engine {
        doc: doc.clone(),
        store: RefCell::new(Store::new()),
        links: RefCell::new(Links::default()),
        diagnostics: RefCell::new(Diagnostics::default()),
        roots: RefCell::new(IndexMap::new()),
        queue: UpdateQueue::new(scheduler, config.debounce),
        config,
        this: this.clone(),
    });
    engine.init(shape.into());
    SyncedStore { engine }
}

impl SyncedStore {
    /// Write `update` at every target `path` resolves to.
    pub fn mutate(&self, path: impl Into<Path>, update: impl Into<Update>) -> MutationReport {
        self.engine.mutate(&path.into(), &update.into())
    }

    /// Deep value at `path`.
    pub fn get(&self, path: &[Key]) -> Option<Value> {
        self.engine.store.borrow().get(path)
    }

    pub fn snapshot(&self) -> Json {
        self.engine.store.borrow().to_json()
    }

    /// Call `subscriber` after every batch that changed `path`, something
    /// below it or one of its ancestors.
    pub fn subscribe(
        &self,
        path: StorePath,
        subscriber: impl Fn(&[StorePath]) + 'static,
    ) -> SubscriptionId {
        self.engine
            .store
            .borrow_mut()
            .subscribe(path, Rc::new(subscriber))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.engine.store.borrow_mut().unsubscribe(id)
    }

    /// Apply pending read-path updates without waiting for the debounce
    /// window. Returns how many ran.
    pub fn flush_now(&self) -> usize {
        queue::flush(&*self.engine)
    }

    pub fn pending_updates(&self) -> usize {
        self.engine.queue.len()
    }

    pub fn take_diagnostics(&self) -> Vec<SyncError> {
        self.engine.diagnostics.borrow_mut().take()
    }

    pub fn doc(&self) -> &Doc {
        &self.engine.doc
    }

    /// Read-only access to the underlying store.
    pub fn with_store<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        f(&self.engine.store.borrow())
    }

    /// Document node mirrored by the container at `path`.
    pub fn doc_node(&self, path: &[Key]) -> Option<Ts> {
        let store = self.engine.store.borrow();
        let mut id = store.root();
        for key in path {
            id = store.slot(id, key)?.node()?;
        }
        self.engine.links.borrow().doc_of(id)
    }

    /// Number of store containers linked to document nodes.
    pub fn linked_count(&self) -> usize {
        self.engine.links.borrow().len()
    }
}
