// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Bounded runnable queue used by the reference task table
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Scheduler (new/enqueue/schedule_next/purge/is_queued), EnqueueOutcome
//! INVARIANTS: Bounded capacity with deterministic reject on saturation; FIFO order;
//!             only fully constructed tasks are enqueued

use alloc::collections::VecDeque;
use core::marker::PhantomData;

use crate::types::Pid;

/// Default runnable queue capacity.
pub const RUN_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueRejectReason {
    QueueFull { capacity: usize },
    AlreadyQueued { pid: Pid },
}

#[must_use = "enqueue outcomes must be handled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Rejected(EnqueueRejectReason),
}

/// Single-CPU FIFO of runnable tasks.
///
/// `!Send` and `!Sync`: the queue is CPU-local and owned by the task table.
pub struct Scheduler {
    queue: VecDeque<Pid>,
    capacity: usize,
    current: Option<Pid>,
    _not_send_sync: PhantomData<*mut ()>,
}
static_assertions::assert_not_impl_any!(Scheduler: Send, Sync);

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_capacity(RUN_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            current: None,
            _not_send_sync: PhantomData,
        }
    }

    pub fn enqueue(&mut self, pid: Pid) -> EnqueueOutcome {
        if self.is_queued(pid) || self.current == Some(pid) {
            return EnqueueOutcome::Rejected(EnqueueRejectReason::AlreadyQueued { pid });
        }
        if self.queue.len() >= self.capacity {
            return EnqueueOutcome::Rejected(EnqueueRejectReason::QueueFull {
                capacity: self.capacity,
            });
        }
        self.queue.push_back(pid);
        EnqueueOutcome::Enqueued
    }

    /// Pops the next runnable task; the previous current task goes to the back of the queue.
    ///
    /// With nothing else queued the current task keeps running. The pop frees the slot the
    /// previous task takes, so a full queue never loses it.
    pub fn schedule_next(&mut self) -> Option<Pid> {
        if let Some(next) = self.queue.pop_front() {
            if let Some(prev) = self.current.replace(next) {
                self.queue.push_back(prev);
            }
        }
        self.current
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    /// Removes `pid` from the queue and from the current slot.
    pub fn purge(&mut self, pid: Pid) {
        self.queue.retain(|queued| *queued != pid);
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    pub fn is_queued(&self, pid: Pid) -> bool {
        self.queue.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
