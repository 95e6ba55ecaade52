// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for stack relocation and context transfer
//! OWNERS: @kernel-sched-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Utilization arithmetic and frame-pointer rebasing
//!   - Byte-exact copy of the live stack slice
//!   - Child result register and continuation records after a full transfer
//!
//! TEST_SCENARIOS:
//!   - utilization_is_top_minus_sp(): any sp below top yields top - sp > 0
//!   - fp_inside_keeps_offset_from_top(): in-range fp keeps its distance from the top
//!   - fp_outside_is_untouched(): out-of-range fp passes through
//!   - copy_is_byte_identical(): exactly `used` bytes land below the child top
//!   - child_observes_zero_and_same_continuations(): R0 == 0, records equal in order; deeper
//!     nesting than configured aborts with NestingOverflow

use alloc::vec::Vec;

use proptest::prelude::*;

use super::*;
use crate::arch::{ArchProfile, XcptContext, REG_A1, REG_FP, REG_SP};
use crate::stack::pool::{SharedStackPool, StackPool};
use crate::stack::StackRegion;
use crate::task::table::TaskTable;
use crate::types::{TaskFlags, TaskType};

const TOP: usize = 0x2000_1000;
const SIZE: usize = 4096;

fn arb_profile() -> impl Strategy<Value = ArchProfile> {
    prop_oneof![
        Just(ArchProfile::CortexM),
        any::<bool>().prop_map(|kernel_build| ArchProfile::CortexA { kernel_build }),
        any::<bool>().prop_map(|protected_build| ArchProfile::CortexR { protected_build }),
    ]
}

proptest! {
    #[test]
    fn utilization_is_top_minus_sp(top in 1usize..usize::MAX, gap in 1usize..0x10_0000) {
        let sp = top.saturating_sub(gap);
        prop_assert_eq!(stack_utilization(top, sp), Some(top - sp));
    }

    #[test]
    fn fp_inside_keeps_offset_from_top(offset in 0usize..=SIZE + 7, child_top in 0x4000_0000usize..0x5000_0000) {
        let new_fp = rebase_frame_pointer(TOP - offset, TOP, SIZE + 7, child_top);
        prop_assert_eq!(child_top - new_fp, offset);
    }

    #[test]
    fn fp_outside_is_untouched(fp in any::<usize>(), child_top in 0x4000_0000usize..0x5000_0000) {
        prop_assume!(fp < TOP - (SIZE + 7) || fp > TOP);
        prop_assert_eq!(rebase_frame_pointer(fp, TOP, SIZE + 7, child_top), fp);
    }

    #[test]
    fn copy_is_byte_identical(data in proptest::collection::vec(any::<u8>(), 1..=SIZE)) {
        let used = data.len();
        let mut src = StackRegion::new(TOP - SIZE, SIZE, 8).unwrap();
        src.bytes_mut(TOP - used, used).unwrap().copy_from_slice(&data);
        let mut dst = StackRegion::new(0x4000_0000, SIZE + 7, 8).unwrap();

        let new_sp = copy_live_stack(&src, TOP - used, used, &mut dst).unwrap();

        prop_assert_eq!(new_sp, dst.adjusted_top() - used);
        prop_assert_eq!(dst.bytes(new_sp, used).unwrap(), &data[..]);
        if new_sp > dst.alloc_base() {
            prop_assert_eq!(dst.bytes(dst.alloc_base(), new_sp - dst.alloc_base()).unwrap().iter().filter(|b| **b != 0).count(), 0);
        }
    }

    #[test]
    fn child_observes_zero_and_same_continuations(
        profile in arb_profile(),
        used in 1usize..=SIZE,
        parent_r0 in any::<usize>(),
        callee_saved in proptest::array::uniform7(any::<usize>()),
        records in proptest::collection::vec((any::<usize>(), any::<usize>()), 0..=4),
    ) {
        let pool = SharedStackPool::new(StackPool::new(0x3000_0000, 0x3010_0000, 8));
        let mut table = TaskTable::new(8, pool.clone(), profile);
        let stack = StackRegion::new(TOP - SIZE, SIZE, 8).unwrap();
        let mut parent_ctx = XcptContext::default();
        parent_ctx.set_reg(REG_A1, parent_r0);
        parent_ctx.syscalls = records.iter().map(|(ret, raw)| profile.continuation(*ret & !1, *raw)).collect::<Vec<_>>();
        let parent = table.create_task(TaskFlags::empty(), stack, parent_ctx).unwrap();
        let ctx = VforkContext { callee_saved, fp: TOP - used / 2, sp: TOP - used, lr: 0x0800_0101 };
        let config = VforkConfig::for_profile(profile);

        let mut stacks = pool.clone();
        let result = {
            let mut env = VforkEnv::new(&mut table, &mut stacks);
            arch_vfork(&parent, &ctx, &config, &mut env)
        };
        if config.syscall_nesting && records.len() > config.max_nested_syscalls {
            prop_assert_eq!(
                result,
                Err(VforkError::NestingOverflow { pending: records.len(), max: config.max_nested_syscalls })
            );
            prop_assert_eq!(table.abort_count(), 1);
            return Ok(());
        }
        let pid = result.unwrap();

        let child = table.task(pid).unwrap();
        let regs = child.context();
        let child_top = child.stack().adjusted_top();
        prop_assert_eq!(regs.reg(REG_A1), 0);
        prop_assert_eq!(regs.reg(REG_SP), child_top - used);
        prop_assert_eq!(child_top - regs.reg(REG_FP), used / 2);
        if config.syscall_nesting {
            prop_assert_eq!(&regs.syscalls, &parent.context().syscalls);
        } else {
            prop_assert!(regs.syscalls.is_empty());
        }
        prop_assert_eq!(child.task_type(), TaskType::Task);
    }
}
