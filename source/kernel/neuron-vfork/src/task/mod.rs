// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Task records seen by the vfork core and the task-management seam
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (state machine) + tests/vfork_flow.rs
//! PUBLIC API: TaskRecord, ChildTask, ChildState, TaskLifecycle, SetupError, StartError, TaskError
//! INVARIANTS: Child moves strictly forward Allocated -> StackProvisioned -> ContextPopulated ->
//!             Runnable, or to Aborted; only Runnable children become TaskRecords

pub mod table;

use core::fmt;

use crate::arch::XcptContext;
use crate::errno::Errno;
use crate::stack::StackRegion;
use crate::types::{Pid, TaskFlags, TaskType};

/// Scheduler-owned record of an existing task. The vfork core only reads it.
#[derive(Debug)]
pub struct TaskRecord {
    pid: Pid,
    flags: TaskFlags,
    stack: StackRegion,
    context: XcptContext,
}

impl TaskRecord {
    pub fn new(pid: Pid, flags: TaskFlags, stack: StackRegion, context: XcptContext) -> Self {
        Self { pid, flags, stack, context }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    #[inline]
    pub fn task_type(&self) -> TaskType {
        self.flags.task_type()
    }

    #[inline]
    pub fn stack(&self) -> &StackRegion {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut StackRegion {
        &mut self.stack
    }

    #[inline]
    pub fn context(&self) -> &XcptContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut XcptContext {
        &mut self.context
    }

    /// Returns the stack so it can be handed back to the allocator.
    pub fn into_stack(self) -> StackRegion {
        self.stack
    }
}

/// Construction state of a child record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Allocated,
    StackProvisioned,
    ContextPopulated,
    Runnable,
    Aborted,
}

impl ChildState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Allocated => "allocated",
            Self::StackProvisioned => "stack-provisioned",
            Self::ContextPopulated => "context-populated",
            Self::Runnable => "runnable",
            Self::Aborted => "aborted",
        }
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Runnable | Self::Aborted)
    }
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[must_use = "task errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    InvalidStateTransition { from: ChildState, to: ChildState },
    /// Record reached Runnable without a stack.
    MissingStack,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid child transition {from} -> {to}")
            }
            Self::MissingStack => f.write_str("child has no stack"),
        }
    }
}

/// Child record under construction.
///
/// Created by [`TaskLifecycle::setup`] with zeroed saved registers and no stack. Ownership
/// returns to the task-management collaborator through `start` or `abort`.
#[derive(Debug)]
pub struct ChildTask {
    pid: Pid,
    parent: Pid,
    flags: TaskFlags,
    entry: usize,
    stack: Option<StackRegion>,
    context: XcptContext,
    state: ChildState,
}

impl ChildTask {
    pub fn new(pid: Pid, parent: Pid, flags: TaskFlags, entry: usize, context: XcptContext) -> Self {
        Self { pid, parent, flags, entry, stack: None, context, state: ChildState::Allocated }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn parent(&self) -> Pid {
        self.parent
    }

    #[inline]
    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    #[inline]
    pub fn entry(&self) -> usize {
        self.entry
    }

    #[inline]
    pub fn state(&self) -> ChildState {
        self.state
    }

    pub fn stack(&self) -> Option<&StackRegion> {
        self.stack.as_ref()
    }

    pub fn stack_mut(&mut self) -> Option<&mut StackRegion> {
        self.stack.as_mut()
    }

    pub fn context(&self) -> &XcptContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut XcptContext {
        &mut self.context
    }

    fn advance(&mut self, expected: ChildState, to: ChildState) -> Result<(), TaskError> {
        if self.state != expected {
            return Err(TaskError::InvalidStateTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// Attaches the freshly allocated stack. Only valid while `Allocated`.
    ///
    /// On error the region is handed back to the caller.
    pub fn attach_stack(&mut self, region: StackRegion) -> Result<(), (TaskError, StackRegion)> {
        if let Err(err) = self.advance(ChildState::Allocated, ChildState::StackProvisioned) {
            return Err((err, region));
        }
        self.stack = Some(region);
        Ok(())
    }

    pub fn mark_populated(&mut self) -> Result<(), TaskError> {
        self.advance(ChildState::StackProvisioned, ChildState::ContextPopulated)
    }

    pub fn mark_runnable(&mut self) -> Result<(), TaskError> {
        self.advance(ChildState::ContextPopulated, ChildState::Runnable)
    }

    /// Moves any non-terminal record to `Aborted`.
    pub fn mark_aborted(&mut self) -> Result<(), TaskError> {
        if self.state.is_terminal() {
            return Err(TaskError::InvalidStateTransition {
                from: self.state,
                to: ChildState::Aborted,
            });
        }
        self.state = ChildState::Aborted;
        Ok(())
    }

    /// Detaches the stack, if any, for release.
    pub fn take_stack(&mut self) -> Option<StackRegion> {
        self.stack.take()
    }

    /// Converts a runnable child into a regular task record.
    ///
    /// On error the child is handed back so the caller can abort it.
    pub fn into_task_record(self) -> Result<TaskRecord, (TaskError, ChildTask)> {
        if self.state != ChildState::Runnable {
            let err = TaskError::InvalidStateTransition { from: self.state, to: ChildState::Runnable };
            return Err((err, self));
        }
        match self.stack {
            Some(stack) => Ok(TaskRecord::new(self.pid, self.flags, stack, self.context)),
            None => Err((TaskError::MissingStack, self)),
        }
    }
}

#[must_use = "setup errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// Task table is full.
    NoFreeSlots,
    /// Entry point is null or unaligned.
    InvalidEntryPoint,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFreeSlots => f.write_str("no free task slots"),
            Self::InvalidEntryPoint => f.write_str("invalid entry point"),
        }
    }
}

#[must_use = "start errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// Child was handed over before its context was complete.
    NotPopulated,
    /// Runnable queue rejected the child.
    QueueFull { capacity: usize },
    /// Child does not hold a slot reserved by this collaborator.
    UnknownTask { pid: Pid },
    InvalidState(TaskError),
}

impl From<TaskError> for StartError {
    fn from(err: TaskError) -> Self {
        Self::InvalidState(err)
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPopulated => f.write_str("child context not populated"),
            Self::QueueFull { capacity } => write!(f, "run queue full ({capacity})"),
            Self::UnknownTask { pid } => write!(f, "pid {pid} not reserved"),
            Self::InvalidState(err) => write!(f, "{err}"),
        }
    }
}

/// Task-management collaborator.
///
/// `start` and `abort` consume the child, so a record leaves the vfork core exactly once.
pub trait TaskLifecycle {
    /// Allocates and partially initializes a child of `parent` entering at `entry`.
    fn setup(&mut self, parent: &TaskRecord, entry: usize) -> Result<ChildTask, SetupError>;

    /// Publishes a populated child to the scheduler. Aborts the child itself on failure.
    fn start(&mut self, child: ChildTask) -> Result<Pid, StartError>;

    /// Destroys a partially constructed child, releasing anything attached to it.
    fn abort(&mut self, child: ChildTask, cause: Errno);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child() -> ChildTask {
        ChildTask::new(Pid::from_raw(2), Pid::from_raw(1), TaskFlags::empty(), 0x100, XcptContext::default())
    }

    fn region() -> StackRegion {
        StackRegion::new(0x1000, 256, 8).unwrap()
    }

    #[test]
    fn forward_path_reaches_runnable() {
        let mut c = child();
        assert_eq!(c.state(), ChildState::Allocated);
        c.attach_stack(region()).map_err(|(e, _)| e).unwrap();
        c.mark_populated().unwrap();
        c.mark_runnable().unwrap();
        let record = c.into_task_record().map_err(|(e, _)| e).unwrap();
        assert_eq!(record.pid(), Pid::from_raw(2));
        assert_eq!(record.stack().adjusted_top(), 0x1100);
    }

    #[test]
    fn skipping_stack_is_rejected() {
        let mut c = child();
        assert_eq!(
            c.mark_populated(),
            Err(TaskError::InvalidStateTransition {
                from: ChildState::Allocated,
                to: ChildState::ContextPopulated,
            })
        );
        assert!(c.mark_runnable().is_err());
    }

    #[test]
    fn second_stack_is_handed_back() {
        let mut c = child();
        c.attach_stack(region()).map_err(|(e, _)| e).unwrap();
        let (err, back) = c.attach_stack(region()).unwrap_err();
        assert!(matches!(err, TaskError::InvalidStateTransition { .. }));
        assert_eq!(back.alloc_base(), 0x1000);
    }

    #[test]
    fn partial_child_cannot_become_record() {
        let mut c = child();
        c.attach_stack(region()).map_err(|(e, _)| e).unwrap();
        let (err, mut back) = c.into_task_record().unwrap_err();
        assert!(matches!(err, TaskError::InvalidStateTransition { .. }));
        assert_eq!(back.take_stack().map(|s| s.alloc_base()), Some(0x1000));
    }

    #[test]
    fn runnable_child_without_stack_is_handed_back() {
        let mut c = child();
        c.state = ChildState::Runnable;
        let (err, back) = c.into_task_record().unwrap_err();
        assert_eq!(err, TaskError::MissingStack);
        assert_eq!(back.pid(), Pid::from_raw(2));
    }

    #[test]
    fn aborted_is_terminal() {
        let mut c = child();
        c.mark_aborted().unwrap();
        assert!(c.mark_aborted().is_err());
        assert!(c.attach_stack(region()).is_err());
    }
}
