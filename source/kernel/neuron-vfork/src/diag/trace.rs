// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Bounded trace ring of vfork context transfers for bring-up triage
//! OWNERS: @kernel-sched-team
//! STATUS: Experimental
//! API_STABILITY: Unstable
//!
//! Records a fixed number of transfers in-memory (no heap) and emits nothing unless dumped.

use crate::types::Pid;

/// Number of transfers kept before the oldest is overwritten.
pub const TRACE_RING_LEN: usize = 32;

/// One completed stack relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct VforkTrace {
    /// Monotonic sequence number (wraps).
    pub seq: u32,
    pub parent: Pid,
    pub child: Pid,
    /// Bytes requested from the stack allocator.
    pub stack_size: usize,
    /// Live bytes copied from the parent.
    pub used: usize,
    pub parent_top: usize,
    pub sp: usize,
    pub fp: usize,
    pub child_top: usize,
    pub new_sp: usize,
    pub new_fp: usize,
    /// Continuation records duplicated into the child.
    pub nsyscalls: usize,
}

pub struct TraceRing {
    entries: [Option<VforkTrace>; TRACE_RING_LEN],
    head: usize,
    seq: u32,
}

impl Default for TraceRing {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRing {
    pub const fn new() -> Self {
        Self { entries: [None; TRACE_RING_LEN], head: 0, seq: 0 }
    }

    /// Stores `trace`, stamping it with the next sequence number.
    pub fn record(&mut self, mut trace: VforkTrace) {
        trace.seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        self.entries[self.head % TRACE_RING_LEN] = Some(trace);
        self.head = (self.head + 1) % TRACE_RING_LEN;
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries[0].is_none()
    }

    /// Most recent transfer.
    pub fn last(&self) -> Option<&VforkTrace> {
        let idx = (self.head + TRACE_RING_LEN - 1) % TRACE_RING_LEN;
        self.entries[idx].as_ref()
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &VforkTrace> + '_ {
        (0..TRACE_RING_LEN).filter_map(move |i| self.entries[(self.head + i) % TRACE_RING_LEN].as_ref())
    }

    /// Writes every recorded transfer through the log facility.
    pub fn dump(&self) {
        for t in self.iter() {
            crate::log_info!(
                target: "vfork-trace",
                "#{} parent={} child={} size={} used={} sp={:#x}->{:#x} fp={:#x}->{:#x} nsys={}",
                t.seq,
                t.parent,
                t.child,
                t.stack_size,
                t.used,
                t.sp,
                t.new_sp,
                t.fp,
                t.new_fp,
                t.nsyscalls
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(child: u32) -> VforkTrace {
        VforkTrace {
            seq: 0,
            parent: Pid::from_raw(1),
            child: Pid::from_raw(child),
            stack_size: 4103,
            used: 64,
            parent_top: 0x2000,
            sp: 0x1fc0,
            fp: 0x1fe0,
            child_top: 0x4000,
            new_sp: 0x3fc0,
            new_fp: 0x3fe0,
            nsyscalls: 0,
        }
    }

    #[test]
    fn wraps_and_keeps_newest() {
        let mut ring = TraceRing::new();
        assert!(ring.is_empty());
        for child in 0..(TRACE_RING_LEN as u32 + 3) {
            ring.record(sample(child));
        }
        assert_eq!(ring.len(), TRACE_RING_LEN);
        assert_eq!(ring.last().map(|t| t.child), Some(Pid::from_raw(TRACE_RING_LEN as u32 + 2)));
        assert_eq!(ring.iter().next().map(|t| t.seq), Some(3));
        ring.dump();
    }
}
