// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Saved register file layout for ARM tasks.
//! Must match the context save/restore layout used by the exception entry path.

use alloc::vec::Vec;
use static_assertions::const_assert;

pub const REG_R0: usize = 0;
pub const REG_R1: usize = 1;
pub const REG_R2: usize = 2;
pub const REG_R3: usize = 3;
pub const REG_R4: usize = 4;
pub const REG_R5: usize = 5;
pub const REG_R6: usize = 6;
pub const REG_R7: usize = 7;
pub const REG_R8: usize = 8;
pub const REG_R9: usize = 9;
pub const REG_R10: usize = 10;
pub const REG_R11: usize = 11;
pub const REG_R12: usize = 12;
pub const REG_R13: usize = 13;
pub const REG_R14: usize = 14;
pub const REG_R15: usize = 15;
pub const REG_XPSR: usize = 16;

/// Number of words in the saved register file.
pub const XCPTCONTEXT_REGS: usize = 17;

pub const REG_A1: usize = REG_R0;
pub const REG_FP: usize = REG_R11;
pub const REG_SP: usize = REG_R13;
pub const REG_LR: usize = REG_R14;
pub const REG_PC: usize = REG_R15;

/// Callee-saved registers captured by the vfork stub, in order.
pub const CALLEE_SAVED_REGS: [usize; 7] =
    [REG_R4, REG_R5, REG_R6, REG_R7, REG_R8, REG_R9, REG_R10];

const_assert!(REG_XPSR < XCPTCONTEXT_REGS);
const_assert!(REG_FP != REG_A1 && REG_SP != REG_A1);

/// Architecture state needed to finish a privileged call after a context switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    /// Profile keeps only the return address.
    None,
    /// Cortex-M `EXC_RETURN` value used to leave handler mode.
    ExcReturn(usize),
    /// Cortex-A/R program status word restored on return to the caller.
    Cpsr(usize),
}

/// One outstanding privileged call, innermost last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallContinuation {
    /// Address the syscall dispatcher returns to.
    pub sysreturn: usize,
    pub resume: ResumeState,
}

/// Saved context of a task: register file plus pending privileged-call records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcptContext {
    pub regs: [usize; XCPTCONTEXT_REGS],
    pub syscalls: Vec<SyscallContinuation>,
}

impl Default for XcptContext {
    fn default() -> Self {
        Self { regs: [0; XCPTCONTEXT_REGS], syscalls: Vec::new() }
    }
}

impl XcptContext {
    /// Number of privileged calls the task is currently nested in.
    pub fn nsyscalls(&self) -> usize {
        self.syscalls.len()
    }

    #[inline]
    pub fn reg(&self, index: usize) -> usize {
        self.regs.get(index).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_reg(&mut self, index: usize, value: usize) {
        if let Some(slot) = self.regs.get_mut(index) {
            *slot = value;
        }
    }
}
