#![allow(dead_code)]

use std::rc::Rc;

use serde_json::Value as Json;
use synced_doc::Doc;
use synced_store::{
    create_synced_store, Key, ManualScheduler, SyncConfig, SyncedStore, Value, DEFAULT_DEBOUNCE,
};

pub struct Replica {
    pub doc: Doc,
    pub scheduler: Rc<ManualScheduler>,
    pub store: SyncedStore,
}

impl Replica {
    pub fn new(sid: u64, shape: Json) -> Self {
        init_tracing();
        let doc = Doc::new(sid);
        let scheduler = ManualScheduler::new();
        let store = create_synced_store(
            &doc,
            Value::from_json(&shape),
            SyncConfig {
                log_operations: true,
                ..SyncConfig::default()
            },
            scheduler.clone(),
        );
        Self {
            doc,
            scheduler,
            store,
        }
    }

    /// Let the debounce window pass. Returns how many scheduled tasks ran.
    pub fn settle(&self) -> usize {
        self.scheduler.advance(DEFAULT_DEBOUNCE)
    }

    /// Ship every local patch of `self` to `other`.
    pub fn send_to(&self, other: &Replica) {
        for patch in self.doc.take_outbox() {
            other.doc.apply_patch(&patch);
        }
    }
}

pub fn path(keys: &[&str]) -> Vec<Key> {
    keys.iter().map(|k| Key::from(*k)).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
