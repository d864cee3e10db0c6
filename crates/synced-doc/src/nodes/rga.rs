//! Replicated Growable Array of node references.
//!
//! A linear `Vec<Chunk>` instead of a balanced tree: O(n) per operation,
//! which is fine for the array sizes a synchronised UI store holds.

use crate::clock::{contains_id, Ts, Tss};

// ── Chunk ─────────────────────────────────────────────────────────────────

/// A contiguous run of slots inserted by one operation.
///
/// Slots within a chunk carry consecutive IDs `id, id+1, id+2, ...`.
/// `refs` is `None` once the chunk is a tombstone.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Ts,
    pub span: u64,
    pub refs: Option<Vec<Ts>>,
}

impl Chunk {
    fn live(id: Ts, refs: Vec<Ts>) -> Self {
        Self {
            id,
            span: refs.len() as u64,
            refs: Some(refs),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.refs.is_none()
    }

    /// Split at slot offset `at`; `self` keeps `[0, at)`.
    fn split_off(&mut self, at: u64) -> Chunk {
        let right = Chunk {
            id: Ts::new(self.id.sid, self.id.time + at),
            span: self.span - at,
            refs: self.refs.as_mut().map(|r| r.split_off(at as usize)),
        };
        self.span = at;
        right
    }
}

// ── Rga ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Rga {
    pub chunks: Vec<Chunk>,
}

impl Rga {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Index of the chunk whose slot range contains `slot`.
    fn chunk_of(&self, slot: Ts) -> Option<usize> {
        self.chunks
            .iter()
            .position(|c| contains_id(c.id, c.span, slot))
    }

    /// Insert `refs` as a chunk with ID `id` right after slot `after`
    /// (`ORIGIN` prepends). Re-applying an already known chunk is a no-op.
    ///
    /// Concurrent inserts at the same anchor are ordered by descending ID,
    /// which every replica computes identically.
    pub fn insert(&mut self, after: Ts, id: Ts, refs: Vec<Ts>) {
        if refs.is_empty() || self.chunk_of(id).is_some() {
            return;
        }
        let mut pos = if after.sid == 0 && after.time == 0 {
            0
        } else {
            match self.chunk_of(after) {
                Some(idx) => {
                    let offset = after.time - self.chunks[idx].id.time + 1;
                    if offset < self.chunks[idx].span {
                        let right = self.chunks[idx].split_off(offset);
                        self.chunks.insert(idx + 1, right);
                    }
                    idx + 1
                }
                None => self.chunks.len(),
            }
        };
        while pos < self.chunks.len() && self.chunks[pos].id > id {
            pos += 1;
        }
        self.chunks.insert(pos, Chunk::live(id, refs));
    }

    /// Tombstone every slot covered by `spans`, splitting chunks at the
    /// span boundaries. Returns how many live slots were removed.
    pub fn delete(&mut self, spans: &[Tss]) -> usize {
        let mut removed = 0;
        for span in spans {
            let (start, end) = (span.time, span.time + span.span);
            let mut i = 0;
            while i < self.chunks.len() {
                let c = &self.chunks[i];
                let (c_start, c_end) = (c.id.time, c.id.time + c.span);
                if c.id.sid != span.sid || c_start >= end || c_end <= start {
                    i += 1;
                    continue;
                }
                if start > c_start {
                    let right = self.chunks[i].split_off(start - c_start);
                    self.chunks.insert(i + 1, right);
                    i += 1;
                }
                let c_end = self.chunks[i].id.time + self.chunks[i].span;
                if end < c_end {
                    let keep = end - self.chunks[i].id.time;
                    let right = self.chunks[i].split_off(keep);
                    self.chunks.insert(i + 1, right);
                }
                let chunk = &mut self.chunks[i];
                if let Some(refs) = chunk.refs.take() {
                    removed += refs.len();
                }
                i += 1;
            }
        }
        removed
    }

    /// Iterate live chunks.
    pub fn iter_live(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| !c.is_deleted())
    }

    /// Live `(slot_id, node_ref)` pairs in order.
    pub fn slots(&self) -> impl Iterator<Item = (Ts, Ts)> + '_ {
        self.iter_live().flat_map(|c| {
            let base = c.id;
            c.refs
                .iter()
                .flatten()
                .enumerate()
                .map(move |(i, r)| (Ts::new(base.sid, base.time + i as u64), *r))
        })
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.iter_live()
            .map(|c| c.refs.as_ref().map_or(0, Vec::len))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot ID at live position `pos`.
    pub fn slot_at(&self, pos: usize) -> Option<Ts> {
        self.slots().nth(pos).map(|(slot, _)| slot)
    }

    /// Node reference stored at live position `pos`.
    pub fn get(&self, pos: usize) -> Option<Ts> {
        self.slots().nth(pos).map(|(_, node)| node)
    }

    /// Slot spans covering live positions `[pos, pos + len)`, merged per
    /// chunk so a contiguous range costs one span per chunk.
    pub fn interval(&self, pos: usize, len: usize) -> Vec<Tss> {
        let mut spans = Vec::new();
        let end = pos + len;
        let mut count = 0usize;
        for c in self.iter_live() {
            let c_len = c.span as usize;
            let (c_start, c_end) = (count, count + c_len);
            if c_end > pos && c_start < end {
                let lo = pos.saturating_sub(c_start);
                let hi = (end - c_start).min(c_len);
                spans.push(Tss::new(c.id.sid, c.id.time + lo as u64, (hi - lo) as u64));
            }
            count = c_end;
            if count >= end {
                break;
            }
        }
        spans
    }
}
