//! Document operations.
//!
//! Each variant carries an `id: Ts` identifying it in the logical clock
//! space. Creation operations and map/delete operations consume one tick;
//! `InsArr` consumes one tick per inserted element.

use serde::{Deserialize, Serialize};

use crate::clock::{Ts, Tss};
use crate::value::Primitive;

/// A single document operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    // ── Creation operations ──────────────────────────────────────────────
    /// Create a constant leaf.
    NewCon { id: Ts, val: Primitive },
    /// Create an LWW map.
    NewObj { id: Ts },
    /// Create an RGA array.
    NewArr { id: Ts },

    // ── Mutation operations ──────────────────────────────────────────────
    /// Set (`Some`) or delete (`None`) keys of a map. The operation ID is
    /// the LWW stamp of every entry it writes.
    InsObj {
        id: Ts,
        obj: Ts,
        data: Vec<(String, Option<Ts>)>,
    },
    /// Insert node references into an array after the slot `after`
    /// (`ORIGIN` prepends).
    InsArr {
        id: Ts,
        obj: Ts,
        after: Ts,
        data: Vec<Ts>,
    },
    /// Delete array slots covered by `what`.
    Del { id: Ts, obj: Ts, what: Vec<Tss> },
}

impl Op {
    pub fn id(&self) -> Ts {
        match self {
            Op::NewCon { id, .. }
            | Op::NewObj { id }
            | Op::NewArr { id }
            | Op::InsObj { id, .. }
            | Op::InsArr { id, .. }
            | Op::Del { id, .. } => *id,
        }
    }

    /// Number of clock ticks consumed by this operation.
    pub fn span(&self) -> u64 {
        match self {
            Op::InsArr { data, .. } => data.len() as u64,
            _ => 1,
        }
    }

    /// Short mnemonic used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Op::NewCon { .. } => "new_con",
            Op::NewObj { .. } => "new_obj",
            Op::NewArr { .. } => "new_arr",
            Op::InsObj { .. } => "ins_obj",
            Op::InsArr { .. } => "ins_arr",
            Op::Del { .. } => "del",
        }
    }
}
