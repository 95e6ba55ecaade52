// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Reference task-management collaborator for the vfork core
//! OWNERS: @kernel-sched-team
//! PUBLIC API: TaskTable (new/create_task/setup/start/abort/reap/task), TaskTable::take_last_abort_cause
//! DEPENDS_ON: sched::Scheduler, stack::pool::SharedStackPool
//! INVARIANTS: PID 0 reserved; a slot is Reserved while its child is under construction;
//!             a pid is enqueued only after its record is complete; abort releases the stack

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::arch::{ArchProfile, XcptContext};
use crate::errno::Errno;
use crate::sched::{EnqueueOutcome, EnqueueRejectReason, Scheduler};
use crate::stack::pool::{SharedStackPool, StackAllocator};
use crate::stack::StackRegion;
use crate::types::{Pid, TaskFlags};

use super::{
    ChildState, ChildTask, SetupError, StartError, TaskError, TaskLifecycle, TaskRecord,
};

enum Slot {
    /// Child under construction.
    Reserved,
    /// Task whose record lives outside the table (e.g. the running parent).
    External,
    Live(TaskRecord),
}

/// Flags a child never inherits from its parent.
const TRANSIENT_FLAGS: TaskFlags = TaskFlags::CANCEL_PENDING.union(TaskFlags::EXIT_PROCESSING);

/// Bounded task table driving the reference scheduler.
pub struct TaskTable {
    slots: Vec<Option<Slot>>,
    scheduler: Scheduler,
    stacks: SharedStackPool,
    profile: ArchProfile,
    abort_causes: BTreeMap<Pid, Errno>,
    aborts: usize,
}

impl TaskTable {
    /// Creates a table with room for `capacity` tasks, PID 0 included.
    pub fn new(capacity: usize, stacks: SharedStackPool, profile: ArchProfile) -> Self {
        Self::with_scheduler(capacity, stacks, profile, Scheduler::new())
    }

    pub fn with_scheduler(
        capacity: usize,
        stacks: SharedStackPool,
        profile: ArchProfile,
        scheduler: Scheduler,
    ) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(1));
        slots.push(Some(Slot::External));
        slots.resize_with(capacity.max(1), || None);
        Self { slots, scheduler, stacks, profile, abort_causes: BTreeMap::new(), aborts: 0 }
    }

    fn reserve_slot(&mut self, slot: Slot) -> Result<Pid, SetupError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SetupError::NoFreeSlots)?;
        self.slots[index] = Some(slot);
        Ok(Pid::from_raw(index as u32))
    }

    fn free_slot(&mut self, pid: Pid) {
        if let Some(slot) = self.slots.get_mut(pid.as_index()) {
            *slot = None;
        }
    }

    /// Registers a task whose record the caller keeps, e.g. the task about to call vfork.
    pub fn create_task(
        &mut self,
        flags: TaskFlags,
        stack: StackRegion,
        context: XcptContext,
    ) -> Result<TaskRecord, SetupError> {
        let pid = self.reserve_slot(Slot::External)?;
        Ok(TaskRecord::new(pid, flags, stack, context))
    }

    /// Returns a started task.
    pub fn task(&self, pid: Pid) -> Option<&TaskRecord> {
        match self.slots.get(pid.as_index()) {
            Some(Some(Slot::Live(record))) => Some(record),
            _ => None,
        }
    }

    pub fn task_mut(&mut self, pid: Pid) -> Option<&mut TaskRecord> {
        match self.slots.get_mut(pid.as_index()) {
            Some(Some(Slot::Live(record))) => Some(record),
            _ => None,
        }
    }

    /// Returns true while `pid` is reserved for a child under construction.
    pub fn is_reserved(&self, pid: Pid) -> bool {
        matches!(self.slots.get(pid.as_index()), Some(Some(Slot::Reserved)))
    }

    /// Number of occupied slots, PID 0 included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Number of children destroyed through [`TaskLifecycle::abort`].
    pub fn abort_count(&self) -> usize {
        self.aborts
    }

    /// Returns and clears the cause of the last aborted child of `parent`.
    pub fn take_last_abort_cause(&mut self, parent: Pid) -> Option<Errno> {
        self.abort_causes.remove(&parent)
    }

    /// Removes a started task and returns its stack to the pool.
    pub fn reap(&mut self, pid: Pid) -> Option<()> {
        let slot = self.slots.get_mut(pid.as_index())?;
        if !matches!(slot, Some(Slot::Live(_))) {
            return None;
        }
        let Some(Slot::Live(record)) = slot.take() else {
            return None;
        };
        self.scheduler.purge(pid);
        self.stacks.release_stack(record.into_stack());
        crate::log_debug!(target: "task", "reaped pid={}", pid);
        Some(())
    }

    /// Releases what a destroyed child held and records why it died. The slot is already free.
    fn retire(&mut self, pid: Pid, parent: Pid, stack: Option<StackRegion>, cause: Errno) {
        if let Some(stack) = stack {
            self.stacks.release_stack(stack);
        }
        self.abort_causes.insert(parent, cause);
        self.aborts += 1;
        crate::log_trace!(target: "task", "retired pid={} cause={}", pid, cause);
    }

    fn reject(&mut self, child: ChildTask, cause: Errno, err: StartError) -> StartError {
        crate::log_warn!(target: "task", "start rejected pid={} err={}", child.pid(), err);
        self.abort(child, cause);
        err
    }
}

impl TaskLifecycle for TaskTable {
    fn setup(&mut self, parent: &TaskRecord, entry: usize) -> Result<ChildTask, SetupError> {
        if entry == 0 || entry & 1 != 0 {
            return Err(SetupError::InvalidEntryPoint);
        }
        let pid = self.reserve_slot(Slot::Reserved)?;
        let flags = parent.flags() - TRANSIENT_FLAGS;
        crate::log_debug!(target: "task", "setup child pid={} parent={}", pid, parent.pid());
        Ok(ChildTask::new(pid, parent.pid(), flags, entry, self.profile.initial_state(entry)))
    }

    fn start(&mut self, mut child: ChildTask) -> Result<Pid, StartError> {
        let pid = child.pid();
        let parent = child.parent();
        if !self.is_reserved(pid) {
            return Err(self.reject(child, Errno::EINVAL, StartError::UnknownTask { pid }));
        }
        if child.state() != ChildState::ContextPopulated {
            return Err(self.reject(child, Errno::EINVAL, StartError::NotPopulated));
        }
        if child.stack().is_none() {
            let err = StartError::InvalidState(TaskError::MissingStack);
            return Err(self.reject(child, Errno::EINVAL, err));
        }

        if let Err(err) = child.mark_runnable() {
            return Err(self.reject(child, Errno::EINVAL, err.into()));
        }
        let record = match child.into_task_record() {
            Ok(record) => record,
            Err((err, child)) => return Err(self.reject(child, Errno::EINVAL, err.into())),
        };
        let Some(slot) = self.slots.get_mut(pid.as_index()) else {
            self.retire(pid, parent, Some(record.into_stack()), Errno::EINVAL);
            return Err(StartError::UnknownTask { pid });
        };
        *slot = Some(Slot::Live(record));

        let (cause, err) = match self.scheduler.enqueue(pid) {
            EnqueueOutcome::Enqueued => {
                crate::log_debug!(target: "task", "started pid={}", pid);
                return Ok(pid);
            }
            EnqueueOutcome::Rejected(EnqueueRejectReason::QueueFull { capacity }) => {
                (Errno::EAGAIN, StartError::QueueFull { capacity })
            }
            EnqueueOutcome::Rejected(EnqueueRejectReason::AlreadyQueued { .. }) => {
                let err = TaskError::InvalidStateTransition {
                    from: ChildState::Runnable,
                    to: ChildState::Runnable,
                };
                (Errno::EINVAL, StartError::InvalidState(err))
            }
        };

        crate::log_warn!(target: "task", "start rejected pid={} err={}", pid, err);
        let stack = match self.slots.get_mut(pid.as_index()).and_then(Option::take) {
            Some(Slot::Live(record)) => Some(record.into_stack()),
            _ => None,
        };
        self.retire(pid, parent, stack, cause);
        Err(err)
    }

    fn abort(&mut self, mut child: ChildTask, cause: Errno) {
        let pid = child.pid();
        let from = child.state();
        if let Err(err) = child.mark_aborted() {
            crate::log_warn!(target: "task", "abort pid={} from {}: {}", pid, from, err);
        }
        let stack = child.take_stack();
        if self.is_reserved(pid) {
            self.free_slot(pid);
        }
        self.retire(pid, child.parent(), stack, cause);
        crate::log_warn!(target: "task", "aborted pid={} state={} cause={}", pid, from, cause);
    }
}
