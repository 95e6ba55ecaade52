// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: errno values surfaced by the vfork primitive
//! OWNERS: @kernel-team
//! PUBLIC API: Errno, SyscallReturn
//! INVARIANTS: Codes match the POSIX numbering used by the syscall ABI

use core::fmt;

/// POSIX error number carried in the kernel's per-task error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Errno(i32);

impl Errno {
    pub const EPERM: Self = Self(1);
    pub const EAGAIN: Self = Self(11);
    pub const ENOMEM: Self = Self(12);
    pub const EFAULT: Self = Self(14);
    pub const EINVAL: Self = Self(22);

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "EPERM",
            11 => "EAGAIN",
            12 => "ENOMEM",
            14 => "EFAULT",
            22 => "EINVAL",
            _ => "E?",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// Value handed back to the parent by the syscall stub.
///
/// `value` is the child PID on success and `-1` on failure; `errno` is what the stub stores
/// into the caller's error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallReturn {
    pub value: isize,
    pub errno: Option<Errno>,
}

impl SyscallReturn {
    pub const fn ok(value: isize) -> Self {
        Self { value, errno: None }
    }

    pub const fn err(errno: Errno) -> Self {
        Self { value: -1, errno: Some(errno) }
    }
}
