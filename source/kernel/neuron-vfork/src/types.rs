// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes shared by the vfork core and its collaborators
//! OWNERS: @kernel-team
//! PUBLIC API: Pid, TaskFlags, TaskType
//! INVARIANTS: PID 0 is the kernel; the task-type field occupies TaskFlags::TTYPE_MASK only

use bitflags::bitflags;
use core::fmt;

/// Process identifier (PID).
///
/// **Ownership**: Only the task-management collaborator creates PIDs.
/// **Invariant**: PID 0 is reserved for the kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Creates a PID from a raw value (kernel-internal only).
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw PID value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the PID as an index into task-owned vectors.
    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    /// Kernel PID (reserved, never exposed to userspace).
    pub const KERNEL: Self = Self(0);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

impl From<Pid> for u32 {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// Task control flags. Bits 0..=1 hold the task type.
    pub struct TaskFlags: u16 {
        const TTYPE_PTHREAD = 1 << 0;
        const TTYPE_KERNEL = 1 << 1;
        const TTYPE_MASK = Self::TTYPE_PTHREAD.bits() | Self::TTYPE_KERNEL.bits();
        const NONCANCELABLE = 1 << 2;
        const CANCEL_PENDING = 1 << 3;
        const EXIT_PROCESSING = 1 << 4;
    }
}

/// Task classification carried in [`TaskFlags::TTYPE_MASK`].
///
/// The stack allocator uses it to pick placement and guard policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Task,
    Pthread,
    Kernel,
}

impl TaskFlags {
    /// Returns the task type encoded in the flags.
    pub fn task_type(self) -> TaskType {
        let ttype = self & Self::TTYPE_MASK;
        if ttype == Self::TTYPE_PTHREAD {
            TaskType::Pthread
        } else if ttype == Self::TTYPE_KERNEL {
            TaskType::Kernel
        } else {
            TaskType::Task
        }
    }

    /// Returns the flags with the task-type field replaced by `ttype`.
    pub fn with_task_type(self, ttype: TaskType) -> Self {
        let base = self - Self::TTYPE_MASK;
        match ttype {
            TaskType::Task => base,
            TaskType::Pthread => base | Self::TTYPE_PTHREAD,
            TaskType::Kernel => base | Self::TTYPE_KERNEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_roundtrips_through_flags() {
        for ttype in [TaskType::Task, TaskType::Pthread, TaskType::Kernel] {
            let flags = TaskFlags::NONCANCELABLE.with_task_type(ttype);
            assert_eq!(flags.task_type(), ttype);
            assert!(flags.contains(TaskFlags::NONCANCELABLE));
        }
    }

    #[test]
    fn empty_flags_are_a_plain_task() {
        assert_eq!(TaskFlags::empty().task_type(), TaskType::Task);
    }
}
