//! Read path: document changes flow into the store.
//!
//! Every document container that has a store mirror carries one observer,
//! installed when the mirror is created and removed when it is released. A
//! change only enqueues store updates; the store itself is written when the
//! update queue flushes, and each queued update reads the document as it is
//! at flush time. Containers that arrive with a remote change are observed
//! once that flush mirrors them, and anything they went through before is
//! picked up by the same read.
//!
//! Mirroring is idempotent. The echo of a local write, which the write
//! path has already mirrored, leaves the store untouched.

use synced_doc::model::Model;
use synced_doc::nodes::DocNode;
use synced_doc::{ChangeEvent, NodeChange, Ts};
use tracing::trace;

use crate::mutator::Engine;
use crate::store::{Body, ContainerKind, Key, Slot, StoreId};

impl Engine {
    // ── Observers ────────────────────────────────────────────────────────

    fn ensure_observed(&self, doc: Ts) {
        if self.links.borrow().is_observed(doc) {
            return;
        }
        let engine = self.this.clone();
        let observer = self.doc.observe(doc, move |event| {
            if let Some(engine) = engine.upgrade() {
                engine.on_doc_change(event);
            }
        });
        self.links.borrow_mut().set_observer(doc, observer);
        trace!(node = %doc, "observing document node");
    }

    fn on_doc_change(&self, event: &ChangeEvent) {
        let target = event.target;
        match &event.change {
            NodeChange::Array => self.enqueue(Box::new(move |engine: &Engine| {
                let model = engine.doc.model();
                engine.mirror_linked(&model, target);
            })),
            NodeChange::Map(keys) => {
                for key in keys {
                    let key = key.clone();
                    self.enqueue(Box::new(move |engine: &Engine| {
                        let model = engine.doc.model();
                        engine.mirror_key(&model, target, &key);
                    }));
                }
            }
        }
    }

    // ── Mirroring ────────────────────────────────────────────────────────

    /// Store slot mirroring document node `doc`. Containers reuse the store
    /// node already linked to them, so moved elements keep their identity.
    pub(crate) fn mirror(&self, model: &Model, doc: Ts) -> Slot {
        match model.node(doc) {
            Some(DocNode::Con(con)) => Slot::Primitive(con.val.clone()),
            Some(DocNode::Obj(obj)) => {
                let id = self.store_node_for(doc, ContainerKind::Mapping);
                let body = Body::Mapping(
                    obj.entries()
                        .map(|(key, child)| (key.to_string(), self.mirror(model, child)))
                        .collect(),
                );
                self.replace_body(id, body);
                Slot::Node(id)
            }
            Some(DocNode::Arr(arr)) => {
                let id = self.store_node_for(doc, ContainerKind::Sequence);
                let body = Body::Sequence(
                    arr.elements()
                        .into_iter()
                        .map(|child| self.mirror(model, child))
                        .collect(),
                );
                self.replace_body(id, body);
                Slot::Node(id)
            }
            None => Slot::Primitive(synced_doc::Primitive::Null),
        }
    }

    /// Re-mirror `doc` if it already has a store mirror.
    pub(crate) fn mirror_linked(&self, model: &Model, doc: Ts) {
        if self.links.borrow().store_of(doc).is_some() {
            self.mirror(model, doc);
        }
    }

    /// Bring one key of a mirrored document map into the store. A key the
    /// store never had and the document no longer has is left alone.
    pub(crate) fn mirror_key(&self, model: &Model, doc_map: Ts, key: &str) {
        let Some(store_map) = self.links.borrow().store_of(doc_map) else {
            return;
        };
        self.mirror_map_key(model, doc_map, store_map, key);
    }

    pub(crate) fn mirror_map_key(&self, model: &Model, doc_map: Ts, store_map: StoreId, key: &str) {
        match model.obj(doc_map).ok().and_then(|obj| obj.get(key)) {
            Some(child) => self.mirror_into(model, store_map, key, child),
            None => {
                let detached = self
                    .store
                    .borrow_mut()
                    .remove_key(store_map, &Key::Name(key.to_string()));
                if let Some(old) = detached {
                    self.release(old);
                }
            }
        }
    }

    /// Mirror a top-level collection under the store root.
    pub(crate) fn mirror_root(&self, model: &Model, name: &str, doc: Ts) {
        let root = self.store.borrow().root();
        self.mirror_into(model, root, name, doc);
    }

    fn mirror_into(&self, model: &Model, store_map: StoreId, key: &str, doc: Ts) {
        let slot = self.mirror(model, doc);
        let result = self
            .store
            .borrow_mut()
            .set_slot(store_map, &Key::Name(key.to_string()), slot);
        match result {
            Ok(Some(old)) => self.release(old),
            Ok(None) => {}
            Err(error) => self.diagnostics.borrow_mut().report(error),
        }
    }

    fn store_node_for(&self, doc: Ts, kind: ContainerKind) -> StoreId {
        let linked = self.links.borrow().store_of(doc);
        let id = match linked {
            Some(id) if self.store.borrow().kind(id) == Some(kind) => id,
            _ => {
                let id = self.store.borrow_mut().create(kind);
                self.links.borrow_mut().link(id, doc);
                id
            }
        };
        self.ensure_observed(doc);
        id
    }

    fn replace_body(&self, id: StoreId, body: Body) {
        let detached = self.store.borrow_mut().replace_body(id, body);
        for old in detached {
            self.release(old);
        }
    }

    /// Free a detached store subtree and drop its links and observers.
    pub(crate) fn release(&self, id: StoreId) {
        let freed = self.store.borrow_mut().release(id);
        for store_id in freed {
            let unlinked = self.links.borrow_mut().unlink(store_id);
            if let Some((doc, observer)) = unlinked {
                if let Some(observer) = observer {
                    self.doc.unobserve(observer);
                }
                trace!(node = %doc, store = %store_id, "released mirror");
            }
        }
    }
}
