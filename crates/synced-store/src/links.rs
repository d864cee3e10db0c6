//! Correspondence between store containers and document nodes.
//!
//! Two one-directional lookups keyed by opaque IDs. Neither side owns the
//! other: releasing a store container only drops its entries here.

use std::collections::HashMap;

use synced_doc::{ObserverId, Ts};

use crate::store::StoreId;

#[derive(Debug, Default)]
pub struct Links {
    doc_of: HashMap<StoreId, Ts>,
    store_of: HashMap<Ts, StoreId>,
    observers: HashMap<Ts, ObserverId>,
}

impl Links {
    /// Pair `store` with `doc`, replacing any previous pairing of either.
    pub fn link(&mut self, store: StoreId, doc: Ts) {
        if let Some(old_doc) = self.doc_of.insert(store, doc) {
            if old_doc != doc {
                self.store_of.remove(&old_doc);
            }
        }
        if let Some(old_store) = self.store_of.insert(doc, store) {
            if old_store != store {
                self.doc_of.remove(&old_store);
            }
        }
    }

    /// Drop the pairing of `store`. Returns the document node it mirrored
    /// and that node's observer, which the caller should unregister.
    pub fn unlink(&mut self, store: StoreId) -> Option<(Ts, Option<ObserverId>)> {
        let doc = self.doc_of.remove(&store)?;
        self.store_of.remove(&doc);
        Some((doc, self.observers.remove(&doc)))
    }

    pub fn doc_of(&self, store: StoreId) -> Option<Ts> {
        self.doc_of.get(&store).copied()
    }

    pub fn store_of(&self, doc: Ts) -> Option<StoreId> {
        self.store_of.get(&doc).copied()
    }

    pub fn is_observed(&self, doc: Ts) -> bool {
        self.observers.contains_key(&doc)
    }

    pub fn set_observer(&mut self, doc: Ts, observer: ObserverId) {
        self.observers.insert(doc, observer);
    }

    pub fn len(&self) -> usize {
        self.doc_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_of.is_empty()
    }
}
