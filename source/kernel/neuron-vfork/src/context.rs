// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Register snapshot captured by the vfork syscall stub
//! OWNERS: @kernel-team
//! PUBLIC API: VforkContext
//! INVARIANTS: Read-only to the core; the only CPU state the child starts from

use crate::arch::CALLEE_SAVED_REGS;

/// Caller state saved by the `vfork` stub at the call site.
///
/// Layout matches the stub's push order: r4..r10, fp, sp, lr.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VforkContext {
    /// r4..r10, in register order.
    pub callee_saved: [usize; CALLEE_SAVED_REGS.len()],
    /// Frame pointer (r11).
    pub fp: usize,
    pub sp: usize,
    /// Return address into the caller of `vfork`.
    pub lr: usize,
}

impl VforkContext {
    /// Address the child resumes at. The Thumb bit is dropped from `lr`.
    #[inline]
    pub const fn entry_point(&self) -> usize {
        self.lr & !1
    }

    /// Iterates `(register index, value)` pairs for the callee-saved set.
    pub fn callee_saved_regs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        CALLEE_SAVED_REGS.iter().copied().zip(self.callee_saved.iter().copied())
    }
}
