//! Logical clock types.
//!
//! Every node and every operation in a document is identified by a logical
//! timestamp `(session_id, time)`. Timestamps order first by time, then by
//! session, which gives all replicas the same last-writer-wins decision.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

// ── Sessions ───────────────────────────────────────────────────────────────

/// Reserved session IDs.
pub mod session {
    /// The ORIGIN sentinel `(0, 0)` lives in this session.
    pub const SYSTEM: u64 = 0;
    /// Named root collections get their IDs in this session.
    pub const ROOT: u64 = 1;
    /// Smallest session ID handed out to a replica.
    pub const MIN_USER: u64 = 65_536;
}

// ── Core structs ───────────────────────────────────────────────────────────

/// An immutable logical timestamp: `(session_id, logical_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ts {
    pub sid: u64,
    pub time: u64,
}

impl Ts {
    pub const fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }
}

impl Ord for Ts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.sid.cmp(&other.sid))
    }
}

impl PartialOrd for Ts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sid == session::ROOT {
            return write!(f, "root.{:x}", self.time);
        }
        let s = self.sid.to_string();
        if s.len() > 4 {
            write!(f, "..{}.{}", &s[s.len() - 4..], self.time)
        } else {
            write!(f, "{}.{}", s, self.time)
        }
    }
}

/// An immutable logical time-span: `(session_id, logical_time, span)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tss {
    pub sid: u64,
    pub time: u64,
    pub span: u64,
}

impl Tss {
    pub const fn new(sid: u64, time: u64, span: u64) -> Self {
        Self { sid, time, span }
    }

    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }
}

/// The "before everything" sentinel used as insertion anchor in arrays.
pub const ORIGIN: Ts = Ts::new(session::SYSTEM, 0);

// ── Factory functions ──────────────────────────────────────────────────────

/// Create a timestamp.
#[inline]
pub fn ts(sid: u64, time: u64) -> Ts {
    Ts::new(sid, time)
}

/// Create a timespan.
#[inline]
pub fn tss(sid: u64, time: u64, span: u64) -> Tss {
    Tss::new(sid, time, span)
}

/// Advance a timestamp by `cycles`, returning the new timestamp.
#[inline]
pub fn tick(stamp: Ts, cycles: u64) -> Ts {
    Ts::new(stamp.sid, stamp.time + cycles)
}

/// Returns `true` if the timespan `[ts1, span1)` contains point `ts2`.
pub fn contains_id(ts1: Ts, span1: u64, ts2: Ts) -> bool {
    ts1.sid == ts2.sid && ts1.time <= ts2.time && ts2.time < ts1.time + span1
}

/// Deterministic ID of the root collection called `name`.
///
/// Every replica derives the same ID from the same name (FNV-1a), so root
/// collections never need to be created by a patch.
pub fn root_id(name: &str) -> Ts {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    Ts::new(session::ROOT, hash | 1)
}

// ── ClockVector ────────────────────────────────────────────────────────────

/// A vector clock: local logical clock plus the latest timestamp seen from
/// every peer.
#[derive(Debug, Clone)]
pub struct ClockVector {
    pub sid: u64,
    pub time: u64,
    pub peers: HashMap<u64, Ts>,
}

impl ClockVector {
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            sid,
            time,
            peers: HashMap::new(),
        }
    }

    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }

    /// Returns the current timestamp and advances the clock by `cycles`.
    pub fn tick(&mut self, cycles: u64) -> Ts {
        let stamp = Ts::new(self.sid, self.time);
        self.time += cycles;
        stamp
    }

    /// Advance local time past an observed `[id, id + span)` interval.
    ///
    /// Idempotent: observing the same interval twice is harmless.
    pub fn observe(&mut self, id: Ts, span: u64) {
        if id.sid == session::SYSTEM || id.sid == session::ROOT {
            return;
        }
        let edge = id.time + span;
        if edge > self.time {
            self.time = edge;
        }
        if id.sid == self.sid {
            return;
        }
        let last = Ts::new(id.sid, edge - 1);
        match self.peers.get(&id.sid) {
            Some(seen) if seen.time >= last.time => {}
            _ => {
                self.peers.insert(id.sid, last);
            }
        }
    }
}
