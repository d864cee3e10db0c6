//! synced-store: a reactive store kept in sync with a replicated document.
//!
//! Local writes go through [`SyncedStore::mutate`]: the path is resolved
//! against the store, the new value is projected onto the document as
//! minimal CRDT operations (array edits are diffed by identity, so a moved
//! element keeps its document node) and the result is mirrored back into
//! the store. Changes arriving from the document, local echoes and remote
//! patches alike, are queued and applied to the store in debounced
//! batches.
//!
//! # Quick example
//!
//! ```
//! use std::time::Duration;
//! use serde_json::json;
//! use synced_doc::Doc;
//! use synced_store::{create_synced_store, ManualScheduler, SyncConfig, Update, Value};
//!
//! let doc = Doc::new(100_000);
//! let scheduler = ManualScheduler::new();
//! let shape = Value::from_json(&json!({ "users": {} }));
//! let store = create_synced_store(&doc, shape, SyncConfig::default(), scheduler.clone());
//!
//! let report = store.mutate(["users", "boris"], Update::replace(json!({ "age": 30 })));
//! assert!(report.is_ok());
//! assert_eq!(store.snapshot(), json!({ "users": { "boris": { "age": 30 } } }));
//!
//! scheduler.advance(Duration::from_millis(50));
//! assert_eq!(store.pending_updates(), 0);
//! ```

pub mod array_diff;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod links;
pub mod mutator;
mod observer;
pub mod optimizer;
pub mod path;
mod projector;
pub mod queue;
pub mod store;
pub mod value;

pub use config::{ConfigError, SyncConfig, DEFAULT_DEBOUNCE};
pub use error::{SyncError, SyncResult};
pub use mutator::{create_synced_store, MutationReport, SyncedStore};
pub use path::{Path, Segment, Update};
pub use queue::{ManualScheduler, Scheduler};
#[cfg(feature = "tokio")]
pub use queue::TokioScheduler;
pub use store::{Key, Store, StoreId, StorePath, SubscriptionId};
pub use value::Value;
