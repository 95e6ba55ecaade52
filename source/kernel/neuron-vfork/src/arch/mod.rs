// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Architecture profiles for the vfork context transfer
//! OWNERS: @kernel-team
//! PUBLIC API: ArchProfile, XcptContext, SyscallContinuation, ResumeState, REG_* indices
//! INVARIANTS: Parent and child share one profile; the profile is fixed at configuration time

pub mod arm;

pub use arm::{
    ResumeState, SyscallContinuation, XcptContext, CALLEE_SAVED_REGS, REG_A1, REG_FP, REG_LR,
    REG_PC, REG_SP, REG_XPSR, XCPTCONTEXT_REGS,
};

/// Core family the kernel was configured for.
///
/// Each profile decides which fields of a [`SyscallContinuation`] are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchProfile {
    /// ARMv6-M/v7-M/v8-M; continuation records carry `EXC_RETURN`.
    CortexM,
    /// ARMv7-A; records carry CPSR only in kernel builds.
    CortexA { kernel_build: bool },
    /// ARMv7-R; records carry CPSR only in protected builds.
    CortexR { protected_build: bool },
}

const XPSR_THUMB: usize = 1 << 24;
const PSR_MODE_USR: usize = 0x10;
const PSR_MODE_SVC: usize = 0x13;

impl ArchProfile {
    /// Short name used in diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::CortexM => "cortex-m",
            Self::CortexA { .. } => "cortex-a",
            Self::CortexR { .. } => "cortex-r",
        }
    }

    /// Returns true when continuation records hold more than the return address.
    pub const fn carries_resume_state(self) -> bool {
        match self {
            Self::CortexM => true,
            Self::CortexA { kernel_build } => kernel_build,
            Self::CortexR { protected_build } => protected_build,
        }
    }

    /// Builds a continuation record in this profile's layout.
    pub const fn continuation(self, sysreturn: usize, raw_state: usize) -> SyscallContinuation {
        let resume = match self {
            Self::CortexM => ResumeState::ExcReturn(raw_state),
            Self::CortexA { kernel_build: true } | Self::CortexR { protected_build: true } => {
                ResumeState::Cpsr(raw_state)
            }
            _ => ResumeState::None,
        };
        SyscallContinuation { sysreturn, resume }
    }

    /// Copies the fields of `parent` this profile resumes from.
    pub fn duplicate_continuation(self, parent: &SyscallContinuation) -> SyscallContinuation {
        let resume = if self.carries_resume_state() { parent.resume } else { ResumeState::None };
        SyscallContinuation { sysreturn: parent.sysreturn, resume }
    }

    /// Program status word a freshly created task starts with.
    pub const fn initial_psr(self) -> usize {
        match self {
            Self::CortexM => XPSR_THUMB,
            Self::CortexA { kernel_build: true } | Self::CortexR { protected_build: true } => {
                PSR_MODE_USR
            }
            _ => PSR_MODE_SVC,
        }
    }

    /// Generic initial register state for a new task entering at `entry`.
    ///
    /// All registers are zero except PC and the status word, so the return-value register
    /// (`REG_A1`) reads zero until someone writes it.
    pub fn initial_state(self, entry: usize) -> XcptContext {
        let mut ctx = XcptContext::default();
        ctx.set_reg(REG_PC, entry);
        ctx.set_reg(REG_XPSR, self.initial_psr());
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cortex_m_keeps_exc_return() {
        let profile = ArchProfile::CortexM;
        let parent = profile.continuation(0x0800_1234, 0xffff_fffd);
        assert_eq!(profile.duplicate_continuation(&parent), parent);
        assert_eq!(parent.resume, ResumeState::ExcReturn(0xffff_fffd));
    }

    #[test]
    fn flat_builds_only_keep_sysreturn() {
        for profile in [
            ArchProfile::CortexA { kernel_build: false },
            ArchProfile::CortexR { protected_build: false },
        ] {
            assert!(!profile.carries_resume_state());
            let parent = SyscallContinuation { sysreturn: 0x40, resume: ResumeState::Cpsr(0x1f) };
            let child = profile.duplicate_continuation(&parent);
            assert_eq!(child.sysreturn, 0x40);
            assert_eq!(child.resume, ResumeState::None);
        }
    }

    #[test]
    fn protected_builds_keep_cpsr() {
        let profile = ArchProfile::CortexR { protected_build: true };
        let parent = profile.continuation(0x80, 0x10);
        assert_eq!(parent.resume, ResumeState::Cpsr(0x10));
        assert_eq!(profile.duplicate_continuation(&parent), parent);
    }

    #[test]
    fn initial_state_only_sets_pc_and_psr() {
        let ctx = ArchProfile::CortexM.initial_state(0x0800_0100);
        assert_eq!(ctx.reg(REG_PC), 0x0800_0100);
        assert_eq!(ctx.reg(REG_XPSR), XPSR_THUMB);
        assert_eq!(ctx.reg(REG_A1), 0);
        assert_eq!(ctx.reg(REG_SP), 0);
        assert!(ctx.syscalls.is_empty());
    }
}
