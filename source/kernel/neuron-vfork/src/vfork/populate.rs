// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Fills the child's saved register file from the vfork snapshot
//! OWNERS: @kernel-sched-team
//! PUBLIC API: populate_context
//! INVARIANTS: REG_A1 (the child's vfork result) is never written; continuation records are
//!             duplicated in order, never moved out of the parent; the child carries all of
//!             them or the populate fails before any register is written

use crate::arch::{XcptContext, REG_FP, REG_SP};
use crate::config::VforkConfig;
use crate::context::VforkContext;

use super::VforkError;

/// Writes r4..r10 and the relocated fp/sp into `child`, then duplicates the parent's pending
/// continuation records. Returns the number of records the child carries.
///
/// A parent holding more records than `max_nested_syscalls` fails with
/// [`VforkError::NestingOverflow`] and `child` is left untouched.
pub fn populate_context(
    child: &mut XcptContext,
    context: &VforkContext,
    new_sp: usize,
    new_fp: usize,
    parent: &XcptContext,
    config: &VforkConfig,
) -> Result<usize, VforkError> {
    check_nesting_depth(parent, config)?;
    for (reg, value) in context.callee_saved_regs() {
        child.set_reg(reg, value);
    }
    child.set_reg(REG_FP, new_fp);
    child.set_reg(REG_SP, new_sp);

    Ok(duplicate_continuations(child, parent, config))
}

#[cfg(feature = "syscall_nesting")]
fn check_nesting_depth(parent: &XcptContext, config: &VforkConfig) -> Result<(), VforkError> {
    let pending = parent.nsyscalls();
    if config.syscall_nesting && pending > config.max_nested_syscalls {
        return Err(VforkError::NestingOverflow { pending, max: config.max_nested_syscalls });
    }
    Ok(())
}

#[cfg(not(feature = "syscall_nesting"))]
fn check_nesting_depth(_parent: &XcptContext, _config: &VforkConfig) -> Result<(), VforkError> {
    Ok(())
}

#[cfg(feature = "syscall_nesting")]
fn duplicate_continuations(child: &mut XcptContext, parent: &XcptContext, config: &VforkConfig) -> usize {
    child.syscalls.clear();
    if !config.syscall_nesting {
        return 0;
    }
    child.syscalls.extend(
        parent.syscalls.iter().map(|record| config.profile.duplicate_continuation(record)),
    );
    crate::log_trace!(target: "vfork", "duplicated {} continuation records", child.nsyscalls());
    child.nsyscalls()
}

#[cfg(not(feature = "syscall_nesting"))]
fn duplicate_continuations(child: &mut XcptContext, _parent: &XcptContext, _config: &VforkConfig) -> usize {
    child.syscalls.clear();
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{ArchProfile, REG_A1};
    use crate::arch::arm::{REG_R10, REG_R4, REG_R7};

    fn snapshot() -> VforkContext {
        VforkContext {
            callee_saved: [0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa],
            fp: 0x2000_0fe0,
            sp: 0x2000_0fc0,
            lr: 0x0800_0101,
        }
    }

    #[test]
    fn writes_callee_saved_and_relocated_pointers() {
        let mut child = ArchProfile::CortexM.initial_state(0x0800_0100);
        let parent = XcptContext::default();
        populate_context(&mut child, &snapshot(), 0x3000_0fc0, 0x3000_0fe0, &parent, &VforkConfig::default())
            .unwrap();
        assert_eq!(child.reg(REG_R4), 0x44);
        assert_eq!(child.reg(REG_R7), 0x77);
        assert_eq!(child.reg(REG_R10), 0xaa);
        assert_eq!(child.reg(REG_SP), 0x3000_0fc0);
        assert_eq!(child.reg(REG_FP), 0x3000_0fe0);
        assert_eq!(child.reg(REG_A1), 0);
    }

    #[cfg(feature = "syscall_nesting")]
    #[test]
    fn duplicates_every_record_up_to_configured_depth() {
        let profile = ArchProfile::CortexM;
        let mut parent = XcptContext::default();
        parent.syscalls.push(profile.continuation(0x100, 0xffff_fff9));
        parent.syscalls.push(profile.continuation(0x200, 0xffff_fffd));
        let cfg = VforkConfig::for_profile(profile).with_syscall_nesting(true, 2);
        let mut child = XcptContext::default();
        assert_eq!(populate_context(&mut child, &snapshot(), 0, 0, &parent, &cfg), Ok(2));
        assert_eq!(child.syscalls, parent.syscalls);
    }

    #[cfg(feature = "syscall_nesting")]
    #[test]
    fn deeper_nesting_than_configured_fails_without_writing() {
        let profile = ArchProfile::CortexM;
        let mut parent = XcptContext::default();
        for n in 0..3 {
            parent.syscalls.push(profile.continuation(0x100 * (n + 1), 0xffff_fff9));
        }
        let cfg = VforkConfig::for_profile(profile).with_syscall_nesting(true, 2);
        let mut child = ArchProfile::CortexM.initial_state(0x0800_0100);
        let before = child.clone();
        assert_eq!(
            populate_context(&mut child, &snapshot(), 0x3000_0fc0, 0x3000_0fe0, &parent, &cfg),
            Err(VforkError::NestingOverflow { pending: 3, max: 2 })
        );
        assert_eq!(child, before);
    }

    #[test]
    fn disabled_nesting_leaves_child_without_records() {
        let profile = ArchProfile::CortexM;
        let mut parent = XcptContext::default();
        parent.syscalls.push(profile.continuation(0x100, 0xffff_fff9));
        let cfg = VforkConfig::for_profile(profile).with_syscall_nesting(false, 2);
        let mut child = XcptContext::default();
        assert_eq!(populate_context(&mut child, &snapshot(), 0, 0, &parent, &cfg), Ok(0));
        assert!(child.syscalls.is_empty());
    }
}
