//! In-memory document model.
//!
//! A [`Model`] holds every node in an index keyed by ID, the named root
//! collections, and a vector clock. Operations are applied via
//! [`Model::apply_operation`]; each application records which nodes it
//! changed into a [`ChangeSet`] so observers can be notified per
//! transaction.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::clock::{root_id, session, ClockVector, Ts};
use crate::error::DocError;
use crate::nodes::{view_of, ArrNode, ConNode, DocNode, NodeIndex, NodeKind, ObjNode};
use crate::operations::Op;
use crate::patch::Patch;

// ── Change tracking ────────────────────────────────────────────────────────

/// What changed on one node during a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChange {
    /// Keys of a map whose visible value changed.
    Map(IndexSet<String>),
    /// The array's element sequence changed.
    Array,
}

/// Per-node changes of one transaction, in first-touch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub nodes: IndexMap<Ts, NodeChange>,
}

impl ChangeSet {
    fn touch_key(&mut self, node: Ts, key: &str) {
        match self
            .nodes
            .entry(node)
            .or_insert_with(|| NodeChange::Map(IndexSet::new()))
        {
            NodeChange::Map(keys) => {
                keys.insert(key.to_string());
            }
            NodeChange::Array => {}
        }
    }

    fn touch_array(&mut self, node: Ts) {
        self.nodes.insert(node, NodeChange::Array);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ── Model ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Model {
    /// All nodes keyed by ID.
    pub index: NodeIndex,
    /// Named root collections, in the order they were opened.
    pub roots: IndexMap<String, Ts>,
    /// Local time and the latest time seen from every peer.
    pub clock: ClockVector,
    /// Incremented once per applied patch.
    pub tick: u64,
}

impl Model {
    /// Create an empty model for session `sid`.
    ///
    /// The clock starts at `1`; time `0` is reserved for `ORIGIN`.
    pub fn new(sid: u64) -> Self {
        debug_assert!(sid >= session::MIN_USER, "session IDs below 65536 are reserved");
        Self {
            index: NodeIndex::default(),
            roots: IndexMap::new(),
            clock: ClockVector::new(sid, 1),
            tick: 0,
        }
    }

    /// Open (creating if needed) the root collection `name` of `kind`.
    pub fn root(&mut self, name: &str, kind: NodeKind) -> Result<Ts, DocError> {
        let id = root_id(name);
        match self.index.get(&id) {
            Some(node) if node.kind() != kind => return Err(DocError::WrongType(id)),
            Some(_) => {}
            None => {
                let node = match kind {
                    NodeKind::Obj => DocNode::Obj(ObjNode::new(id)),
                    NodeKind::Arr => DocNode::Arr(ArrNode::new(id)),
                    NodeKind::Con => return Err(DocError::WrongType(id)),
                };
                self.index.insert(id, node);
            }
        }
        self.roots.entry(name.to_string()).or_insert(id);
        Ok(id)
    }

    pub fn node(&self, id: Ts) -> Option<&DocNode> {
        self.index.get(&id)
    }

    pub fn obj(&self, id: Ts) -> Result<&ObjNode, DocError> {
        match self.index.get(&id) {
            Some(DocNode::Obj(n)) => Ok(n),
            Some(_) => Err(DocError::WrongType(id)),
            None => Err(DocError::NotFound(id)),
        }
    }

    pub fn arr(&self, id: Ts) -> Result<&ArrNode, DocError> {
        match self.index.get(&id) {
            Some(DocNode::Arr(n)) => Ok(n),
            Some(_) => Err(DocError::WrongType(id)),
            None => Err(DocError::NotFound(id)),
        }
    }

    /// Plain JSON snapshot of node `id`.
    pub fn view(&self, id: Ts) -> Value {
        view_of(&self.index, id)
    }

    /// JSON snapshot of every root collection, keyed by name.
    pub fn view_roots(&self) -> Value {
        Value::Object(
            self.roots
                .iter()
                .map(|(name, id)| (name.clone(), self.view(*id)))
                .collect(),
        )
    }

    /// Apply every operation of `patch`, collecting changes.
    pub fn apply_patch(&mut self, patch: &Patch, changes: &mut ChangeSet) {
        for op in &patch.ops {
            self.apply_operation(op, changes);
        }
        self.tick += 1;
    }

    /// Apply a single operation. Already applied operations are no-ops, so
    /// patches can be delivered more than once.
    pub fn apply_operation(&mut self, op: &Op, changes: &mut ChangeSet) {
        self.clock.observe(op.id(), op.span());

        match op {
            // ── Creation operations ────────────────────────────────────────
            Op::NewCon { id, val } => {
                self.index.entry(*id).or_insert_with(|| {
                    DocNode::Con(ConNode {
                        id: *id,
                        val: val.clone(),
                    })
                });
            }
            Op::NewObj { id } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| DocNode::Obj(ObjNode::new(*id)));
            }
            Op::NewArr { id } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| DocNode::Arr(ArrNode::new(*id)));
            }

            // ── Mutation operations ────────────────────────────────────────
            Op::InsObj { id, obj, data } => {
                self.ensure_remote_root(*obj, NodeKind::Obj);
                if let Some(DocNode::Obj(node)) = self.index.get_mut(obj) {
                    for (key, value) in data {
                        if node.put(key, *id, *value) {
                            changes.touch_key(*obj, key);
                        }
                    }
                }
            }
            Op::InsArr {
                id,
                obj,
                after,
                data,
            } => {
                self.ensure_remote_root(*obj, NodeKind::Arr);
                if let Some(DocNode::Arr(node)) = self.index.get_mut(obj) {
                    let before = node.rga.chunks.len();
                    node.rga.insert(*after, *id, data.clone());
                    if node.rga.chunks.len() != before {
                        changes.touch_array(*obj);
                    }
                }
            }
            Op::Del { obj, what, .. } => {
                if let Some(DocNode::Arr(node)) = self.index.get_mut(obj) {
                    if node.rga.delete(what) > 0 {
                        changes.touch_array(*obj);
                    }
                }
            }
        }
    }

    /// A remote replica may write into a root collection this replica has
    /// not opened yet; the operation's type tells which kind it is.
    fn ensure_remote_root(&mut self, id: Ts, kind: NodeKind) {
        if id.sid != session::ROOT || self.index.contains_key(&id) {
            return;
        }
        let node = match kind {
            NodeKind::Arr => DocNode::Arr(ArrNode::new(id)),
            _ => DocNode::Obj(ObjNode::new(id)),
        };
        self.index.insert(id, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PatchBuilder;
    use crate::clock::ORIGIN;
    use crate::value::Primitive;
    use serde_json::json;

    const SID: u64 = 100_001;

    #[test]
    fn root_collections_are_typed() {
        let mut model = Model::new(SID);
        let users = model.root("users", NodeKind::Obj).unwrap();
        assert_eq!(model.root("users", NodeKind::Obj).unwrap(), users);
        assert!(matches!(
            model.root("users", NodeKind::Arr),
            Err(DocError::WrongType(_))
        ));
    }

    #[test]
    fn apply_patch_builds_view_and_changes() {
        let mut model = Model::new(SID);
        let root = model.root("todos", NodeKind::Arr).unwrap();
        let mut b = PatchBuilder::new(SID, model.clock.time);
        let a = b.con(Primitive::from("a"));
        let obj = b.obj();
        let flag = b.con(Primitive::from(true));
        b.ins_obj(obj, vec![("done".into(), Some(flag))]);
        b.ins_arr(root, ORIGIN, vec![a, obj]);
        let mut changes = ChangeSet::default();
        model.apply_patch(&b.flush(), &mut changes);

        assert_eq!(model.view(root), json!(["a", {"done": true}]));
        assert_eq!(changes.nodes.get(&root), Some(&NodeChange::Array));
        assert!(matches!(changes.nodes.get(&obj), Some(NodeChange::Map(keys)) if keys.contains("done")));
        assert_eq!(model.tick, 1);
    }

    #[test]
    fn reapplying_a_patch_reports_no_changes() {
        let mut model = Model::new(SID);
        let root = model.root("m", NodeKind::Obj).unwrap();
        let mut b = PatchBuilder::new(SID, model.clock.time);
        let v = b.con(Primitive::from(1));
        b.ins_obj(root, vec![("k".into(), Some(v))]);
        let patch = b.flush();
        let mut first = ChangeSet::default();
        model.apply_patch(&patch, &mut first);
        let mut second = ChangeSet::default();
        model.apply_patch(&patch, &mut second);
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn remote_write_opens_missing_root() {
        let mut model = Model::new(SID);
        let id = root_id("late");
        let mut b = PatchBuilder::new(200_002, 1);
        let v = b.con(Primitive::from(1));
        b.ins_obj(id, vec![("k".into(), Some(v))]);
        model.apply_patch(&b.flush(), &mut ChangeSet::default());
        assert_eq!(model.view(id), json!({"k": 1}));
        assert_eq!(model.clock.time, 3);
    }
}
