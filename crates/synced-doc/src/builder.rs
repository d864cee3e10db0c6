//! [`PatchBuilder`]: allocates timestamps and records operations.

use crate::clock::{ClockVector, Ts, Tss};
use crate::operations::Op;
use crate::patch::Patch;
use crate::value::Primitive;

/// Utility for constructing a [`Patch`] operation by operation.
///
/// The builder owns a copy of the document clock; every method ticks it by
/// the span of the operation it records and returns the new operation's ID.
pub struct PatchBuilder {
    pub clock: ClockVector,
    pub patch: Patch,
}

impl PatchBuilder {
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            clock: ClockVector::new(sid, time),
            patch: Patch::new(),
        }
    }

    /// Returns the current patch and resets the builder.
    pub fn flush(&mut self) -> Patch {
        std::mem::take(&mut self.patch)
    }

    // ── Creation operations ────────────────────────────────────────────────

    /// Create a new `con` leaf holding `val`.
    pub fn con(&mut self, val: Primitive) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewCon { id, val });
        id
    }

    /// Create a new `obj` map.
    pub fn obj(&mut self) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewObj { id });
        id
    }

    /// Create a new `arr` array.
    pub fn arr(&mut self) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewArr { id });
        id
    }

    // ── Mutation operations ────────────────────────────────────────────────

    /// Set or delete keys on a map. Returns the stamp of the write.
    pub fn ins_obj(&mut self, obj: Ts, data: Vec<(String, Option<Ts>)>) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::InsObj { id, obj, data });
        id
    }

    /// Insert node references into an array after slot `after`.
    pub fn ins_arr(&mut self, obj: Ts, after: Ts, data: Vec<Ts>) -> Ts {
        let id = self.clock.tick(data.len() as u64);
        self.patch.ops.push(Op::InsArr {
            id,
            obj,
            after,
            data,
        });
        id
    }

    /// Delete the array slots covered by `what`.
    pub fn del(&mut self, obj: Ts, what: Vec<Tss>) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::Del { id, obj, what });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ts, ORIGIN};

    #[test]
    fn ids_advance_by_span() {
        let mut builder = PatchBuilder::new(70_000, 5);
        let arr = builder.arr();
        let a = builder.con(Primitive::from(1));
        let b = builder.con(Primitive::from(2));
        let ins = builder.ins_arr(arr, ORIGIN, vec![a, b]);
        let next = builder.obj();
        assert_eq!(arr, ts(70_000, 5));
        assert_eq!(ins, ts(70_000, 8));
        assert_eq!(next, ts(70_000, 10));
        let patch = builder.flush();
        assert_eq!(patch.ops.len(), 5);
        assert_eq!(patch.next_time(), 11);
        assert!(builder.patch.is_empty());
    }
}
