//! Write path: store values projected onto the document.
//!
//! [`Engine::project`] makes the document child at `key` of a parent equal
//! to a new value and then mirrors the written child back into the store,
//! so later branches of the same mutation can address what was created.
//!
//! | new value     | document child                       | effect                         |
//! |---------------|--------------------------------------|--------------------------------|
//! | absent        | any                                  | delete key / element           |
//! | primitive     | equal `con`                          | nothing                        |
//! | primitive     | other                                | set key / delete + insert      |
//! | mapping       | map                                  | delete missing keys, recurse   |
//! | sequence      | array                                | diff + ranged delete / insert  |
//! | container     | absent or other kind                 | build fresh subtree            |
//! | tracked       | the node linked to it                | merge its content              |
//! | tracked       | anything else                        | shape violation                |
//!
//! The whole value is validated before the first operation, so a shape
//! violation never leaves a partial write behind.

use std::collections::HashSet;

use indexmap::IndexMap;
use synced_doc::{DocError, NodeKind, Primitive, Transaction, Ts};
use tracing::debug;

use crate::array_diff::{diff, ArrayOps};
use crate::error::{SyncError, SyncResult};
use crate::mutator::Engine;
use crate::optimizer::{optimize, Element};
use crate::store::{Key, StoreId};
use crate::value::Value;

/// Where a projection writes: a top-level collection or a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocParent {
    Root,
    Node(Ts),
}

/// Identity of an array element for the diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    Primitive(Primitive),
    Store(StoreId),
    /// A document container with no store mirror; matches nothing.
    Unlinked(Ts),
    /// A container value that will be built from scratch; matches nothing.
    Fresh(usize),
}

fn tracked_violation(id: StoreId) -> SyncError {
    SyncError::ShapeViolation(format!(
        "store-owned value {id} cannot be written into the document"
    ))
}

fn check_fresh(value: &Value) -> SyncResult<()> {
    match value {
        Value::Primitive(_) => Ok(()),
        Value::Tracked { id, .. } => Err(tracked_violation(*id)),
        Value::Sequence(items) => items.iter().try_for_each(check_fresh),
        Value::Mapping(map) => map.values().try_for_each(check_fresh),
    }
}

impl Engine {
    pub(crate) fn project(
        &self,
        tx: &mut Transaction<'_>,
        doc_parent: DocParent,
        store_parent: StoreId,
        key: &Key,
        value: Option<&Value>,
    ) -> SyncResult<()> {
        let parent = match doc_parent {
            DocParent::Root => return self.project_root(tx, key, value),
            DocParent::Node(parent) => parent,
        };
        match (tx.kind(parent), key) {
            (Some(NodeKind::Obj), Key::Name(name)) => {
                self.check(tx, tx.map_get(parent, name)?, value)?;
                self.write_map_key(tx, parent, name, value)?;
                self.mirror_map_key(tx.model(), parent, store_parent, name);
            }
            (Some(NodeKind::Arr), Key::Index(index)) => {
                self.write_array_index(tx, parent, *index, value)?;
                self.mirror_linked(tx.model(), parent);
            }
            (Some(_), _) => {
                return Err(SyncError::Unsupported(format!(
                    "cannot address {key} inside document node {parent}"
                )))
            }
            (None, _) => return Err(DocError::NotFound(parent).into()),
        }
        Ok(())
    }

    fn project_root(
        &self,
        tx: &mut Transaction<'_>,
        key: &Key,
        value: Option<&Value>,
    ) -> SyncResult<()> {
        let Key::Name(name) = key else {
            return Err(SyncError::Unsupported(format!(
                "top-level collections are addressed by name, not {key}"
            )));
        };
        let root = self.roots.borrow().get(name).copied().ok_or_else(|| {
            SyncError::ShapeViolation(format!("`{name}` is not a top-level collection"))
        })?;
        let Some(value) = value else {
            return Err(SyncError::Unsupported(format!(
                "top-level collection `{name}` cannot be removed"
            )));
        };
        self.check(tx, Some(root), Some(value))?;
        match (value.untracked(), tx.kind(root)) {
            (Value::Mapping(map), Some(NodeKind::Obj)) => self.merge_map(tx, root, map)?,
            (Value::Sequence(items), Some(NodeKind::Arr)) => self.write_sequence(tx, root, items)?,
            _ => {
                return Err(SyncError::ShapeViolation(format!(
                    "top-level collection `{name}` cannot change its kind"
                )))
            }
        }
        self.mirror_root(tx.model(), name, root);
        Ok(())
    }

    // ── Validation ───────────────────────────────────────────────────────

    /// Reject `Tracked` values that do not sit on the document node they
    /// mirror, and `Tracked` content that changed its kind.
    fn check(&self, tx: &Transaction<'_>, current: Option<Ts>, value: Option<&Value>) -> SyncResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        match value {
            Value::Primitive(_) => Ok(()),
            Value::Tracked { id, content } => {
                let linked = self.links.borrow().doc_of(*id);
                match current {
                    Some(node) if linked == Some(node) => self.check_content(tx, node, content),
                    _ => Err(tracked_violation(*id)),
                }
            }
            Value::Mapping(_) | Value::Sequence(_) => {
                let same_kind = matches!(
                    (value, current.and_then(|c| tx.kind(c))),
                    (Value::Mapping(_), Some(NodeKind::Obj)) | (Value::Sequence(_), Some(NodeKind::Arr))
                );
                match current {
                    Some(node) if same_kind => self.check_content(tx, node, value),
                    _ => check_fresh(value),
                }
            }
        }
    }

    /// Check `content` written over the existing container `node`.
    fn check_content(&self, tx: &Transaction<'_>, node: Ts, content: &Value) -> SyncResult<()> {
        match (content, tx.kind(node)) {
            (Value::Mapping(map), Some(NodeKind::Obj)) => map
                .iter()
                .try_for_each(|(k, v)| self.check(tx, tx.map_get(node, k)?, Some(v))),
            (Value::Sequence(items), Some(NodeKind::Arr)) => {
                let elements: HashSet<Ts> = tx.arr_elements(node)?.into_iter().collect();
                let mut seen = HashSet::new();
                for item in items {
                    let Value::Tracked { id, content } = item else {
                        check_fresh(item)?;
                        continue;
                    };
                    let doc = self.links.borrow().doc_of(*id);
                    match doc {
                        Some(doc) if elements.contains(&doc) && seen.insert(*id) => {
                            self.check_content(tx, doc, content)?
                        }
                        _ => return Err(tracked_violation(*id)),
                    }
                }
                Ok(())
            }
            _ => Err(SyncError::ShapeViolation(format!(
                "content written over {node} does not match its kind"
            ))),
        }
    }

    /// Bring the existing container `node` in line with `content`.
    fn write_content(&self, tx: &mut Transaction<'_>, node: Ts, content: &Value) -> SyncResult<()> {
        match (content.untracked(), tx.kind(node)) {
            (Value::Mapping(map), Some(NodeKind::Obj)) => self.merge_map(tx, node, map),
            (Value::Sequence(items), Some(NodeKind::Arr)) => self.write_sequence(tx, node, items),
            _ => Ok(()),
        }
    }

    // ── Maps ─────────────────────────────────────────────────────────────

    fn write_map_key(
        &self,
        tx: &mut Transaction<'_>,
        obj: Ts,
        name: &str,
        value: Option<&Value>,
    ) -> SyncResult<()> {
        let current = tx.map_get(obj, name)?;
        let kind = current.and_then(|c| tx.kind(c));
        match value {
            None => tx.map_delete(obj, name)?,
            Some(Value::Primitive(p)) => {
                if current.and_then(|c| tx.con_value(c)) != Some(p) {
                    let con = tx.new_con(p.clone());
                    tx.map_set(obj, name, con)?;
                }
            }
            Some(Value::Tracked { content, .. }) => {
                if let Some(child) = current {
                    self.write_content(tx, child, content)?;
                }
            }
            Some(fresh @ Value::Mapping(map)) => match (current, kind) {
                (Some(child), Some(NodeKind::Obj)) => self.merge_map(tx, child, map)?,
                _ => {
                    let child = self.build(tx, fresh)?;
                    tx.map_set(obj, name, child)?;
                }
            },
            Some(fresh @ Value::Sequence(items)) => match (current, kind) {
                (Some(child), Some(NodeKind::Arr)) => self.write_sequence(tx, child, items)?,
                _ => {
                    let child = self.build(tx, fresh)?;
                    tx.map_set(obj, name, child)?;
                }
            },
        }
        Ok(())
    }

    fn merge_map(
        &self,
        tx: &mut Transaction<'_>,
        obj: Ts,
        map: &IndexMap<String, Value>,
    ) -> SyncResult<()> {
        for key in tx.map_keys(obj)? {
            if !map.contains_key(&key) {
                tx.map_delete(obj, &key)?;
            }
        }
        for (key, value) in map {
            self.write_map_key(tx, obj, key, Some(value))?;
        }
        Ok(())
    }

    // ── Arrays ───────────────────────────────────────────────────────────

    fn write_array_index(
        &self,
        tx: &mut Transaction<'_>,
        arr: Ts,
        index: usize,
        value: Option<&Value>,
    ) -> SyncResult<()> {
        let len = tx.arr_len(arr)?;
        let Some(value) = value else {
            if index >= len {
                return Err(SyncError::Unsupported(format!(
                    "cannot remove element {index} of an array of length {len}"
                )));
            }
            tx.arr_delete(arr, index, 1)?;
            return Ok(());
        };
        if index > len {
            return Err(SyncError::Unsupported(format!(
                "cannot write element {index} of an array of length {len}"
            )));
        }
        let current = tx.arr_get(arr, index)?;
        self.check(tx, current, Some(value))?;
        let kind = current.and_then(|c| tx.kind(c));
        let node = match (value, current, kind) {
            (Value::Tracked { content, .. }, Some(c), _) => return self.write_content(tx, c, content),
            (Value::Primitive(p), Some(c), _) if tx.con_value(c) == Some(p) => return Ok(()),
            (Value::Mapping(map), Some(c), Some(NodeKind::Obj)) => return self.merge_map(tx, c, map),
            (Value::Sequence(items), Some(c), Some(NodeKind::Arr)) => {
                return self.write_sequence(tx, c, items)
            }
            _ => self.build(tx, value)?,
        };
        if index < len {
            tx.arr_delete(arr, index, 1)?;
        }
        tx.arr_insert(arr, index, vec![node])?;
        Ok(())
    }

    fn identity_of(&self, tx: &Transaction<'_>, element: Ts) -> Identity {
        if let Some(p) = tx.con_value(element) {
            return Identity::Primitive(p.clone());
        }
        match self.links.borrow().store_of(element) {
            Some(id) => Identity::Store(id),
            None => Identity::Unlinked(element),
        }
    }

    /// Reconcile document array `arr` with `items` by identity.
    fn write_sequence(&self, tx: &mut Transaction<'_>, arr: Ts, items: &[Value]) -> SyncResult<()> {
        let existing = tx.arr_elements(arr)?;
        let previous: Vec<Identity> = existing.iter().map(|e| self.identity_of(tx, *e)).collect();
        let next: Vec<Identity> = items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Primitive(p) => Identity::Primitive(p.clone()),
                Value::Tracked { id, .. } => Identity::Store(*id),
                _ => Identity::Fresh(i),
            })
            .collect();

        let ops = diff(&previous, &next);
        if !ops.is_empty() {
            self.apply_plan(tx, arr, items, &ops, &existing)?;
        }

        // Kept elements may carry edits of their own.
        for item in items {
            if let Value::Tracked { id, content } = item {
                let doc = self.links.borrow().doc_of(*id);
                if let Some(doc) = doc {
                    self.write_content(tx, doc, content)?;
                }
            }
        }
        Ok(())
    }

    fn apply_plan(
        &self,
        tx: &mut Transaction<'_>,
        arr: Ts,
        items: &[Value],
        ops: &ArrayOps<Identity>,
        existing: &[Ts],
    ) -> SyncResult<()> {
        let plan = optimize(ops, existing);
        if self.config.log_operations {
            debug!(
                array = %arr,
                added = ops.added.len(),
                deleted = ops.deleted.len(),
                moved = ops.moved.len(),
                delete_ranges = plan.deletions.len(),
                insert_ranges = plan.insertions.len(),
                "array reconciled"
            );
        }

        for range in &plan.deletions {
            tx.arr_delete(arr, range.index, range.length)?;
        }
        for range in plan.insertions {
            let mut nodes = Vec::with_capacity(range.values.len());
            for element in range.values {
                nodes.push(match element {
                    Element::Existing(node) => node,
                    Element::Fresh(i) => self.build(tx, &items[i])?,
                });
            }
            tx.arr_insert(arr, range.index, nodes)?;
        }
        let len = tx.arr_len(arr)?;
        if len > items.len() {
            tx.arr_delete(arr, items.len(), len - items.len())?;
        }
        Ok(())
    }

    // ── Construction ─────────────────────────────────────────────────────

    /// Materialize `value` as new document nodes.
    fn build(&self, tx: &mut Transaction<'_>, value: &Value) -> SyncResult<Ts> {
        match value {
            Value::Primitive(p) => Ok(tx.new_con(p.clone())),
            Value::Mapping(map) => {
                let obj = tx.new_map();
                for (key, child) in map {
                    let node = self.build(tx, child)?;
                    tx.map_set(obj, key, node)?;
                }
                Ok(obj)
            }
            Value::Sequence(items) => {
                let arr = tx.new_array();
                let nodes = items
                    .iter()
                    .map(|item| self.build(tx, item))
                    .collect::<SyncResult<Vec<Ts>>>()?;
                tx.arr_insert(arr, 0, nodes)?;
                Ok(arr)
            }
            Value::Tracked { id, .. } => Err(tracked_violation(*id)),
        }
    }
}
