//! synced-doc: a small JSON CRDT replicated document.
//!
//! A document is a set of named root collections (LWW maps or RGA arrays)
//! whose values are `con` leaves, maps and arrays. Local edits are made in
//! transactions that produce serializable [`Patch`]es; applying the same
//! patches on another replica converges to the same state.
//!
//! # Quick example
//!
//! ```
//! use synced_doc::{Doc, Primitive};
//!
//! let a = Doc::new(100_000);
//! let b = Doc::new(200_000);
//! let todos = a.root_array("todos").unwrap();
//! a.transact(|tx| {
//!     let title = tx.new_con(Primitive::from("write docs"));
//!     tx.arr_insert(todos, 0, vec![title]).unwrap();
//! });
//! for patch in a.take_outbox() {
//!     b.apply_patch(&patch);
//! }
//! assert_eq!(b.to_json(todos), serde_json::json!(["write docs"]));
//! ```

pub mod builder;
pub mod clock;
pub mod doc;
pub mod error;
pub mod model;
pub mod nodes;
pub mod operations;
pub mod patch;
pub mod value;

pub use clock::{Ts, Tss};
pub use doc::{ChangeEvent, Doc, ObserverId, Origin, Transaction};
pub use error::DocError;
pub use model::{Model, NodeChange};
pub use nodes::NodeKind;
pub use operations::Op;
pub use patch::Patch;
pub use value::Primitive;
