// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Child stack provisioning and live-stack relocation
//! OWNERS: @kernel-sched-team
//! PUBLIC API: stack_utilization, rebase_frame_pointer, copy_live_stack, allocate_child_stack,
//!             relocate_live_stack, Relocation
//! INVARIANTS: Parent stack is only read; exactly one allocation per call; 0 < used <= size;
//!             fp is rebased only when it provably points into the parent stack

use crate::config::VforkConfig;
use crate::context::VforkContext;
use crate::stack::pool::StackAllocator;
use crate::stack::{StackError, StackRegion};
use crate::task::{ChildState, ChildTask, TaskError, TaskRecord};

use super::VforkError;

/// Result of a successful relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Bytes requested from the allocator.
    pub stack_size: usize,
    /// Live bytes copied from the parent.
    pub used: usize,
    pub parent_top: usize,
    pub child_top: usize,
    pub new_sp: usize,
    pub new_fp: usize,
}

/// Bytes in use between `sp` and the adjusted top, if `sp` lies below the top.
#[inline]
pub const fn stack_utilization(adjusted_top: usize, sp: usize) -> Option<usize> {
    if sp < adjusted_top {
        Some(adjusted_top - sp)
    } else {
        None
    }
}

/// Moves `fp` into the child stack when it lies in `[parent_top - stack_size, parent_top]`.
///
/// The distance from the top is preserved; any other value passes through unchanged.
#[inline]
pub const fn rebase_frame_pointer(
    fp: usize,
    parent_top: usize,
    stack_size: usize,
    child_top: usize,
) -> usize {
    let bottom = parent_top.saturating_sub(stack_size);
    if fp >= bottom && fp <= parent_top {
        child_top.wrapping_sub(parent_top - fp)
    } else {
        fp
    }
}

/// Copies `[sp, sp + used)` of `src` to the top of `dst` and returns the child stack pointer.
pub fn copy_live_stack(
    src: &StackRegion,
    sp: usize,
    used: usize,
    dst: &mut StackRegion,
) -> Result<usize, StackError> {
    let new_sp = dst.adjusted_top().checked_sub(used).ok_or(StackError::Overflow)?;
    let live = src.bytes(sp, used)?;
    dst.bytes_mut(new_sp, used)?.copy_from_slice(live);
    Ok(new_sp)
}

/// Allocates the child stack and attaches it. Returns the size requested from the allocator.
pub fn allocate_child_stack(
    parent: &TaskRecord,
    child: &mut ChildTask,
    stacks: &mut dyn StackAllocator,
    config: &VforkConfig,
) -> Result<usize, VforkError> {
    if child.state() != ChildState::Allocated {
        return Err(VforkError::InvalidState(TaskError::InvalidStateTransition {
            from: child.state(),
            to: ChildState::StackProvisioned,
        }));
    }

    let stack_size = parent
        .stack()
        .adjusted_size()
        .checked_add(config.stack_alignment - 1)
        .ok_or(VforkError::Relocation(StackError::Overflow))?;

    let region = stacks
        .allocate_stack(stack_size, parent.task_type())
        .map_err(VforkError::OutOfMemory)?;
    if let Err((err, region)) = child.attach_stack(region) {
        stacks.release_stack(region);
        return Err(VforkError::InvalidState(err));
    }
    Ok(stack_size)
}

/// Relocates the parent's live stack into the stack already attached to `child`.
///
/// On error the child owns the new stack; the caller aborts it.
pub fn relocate_live_stack(
    parent: &TaskRecord,
    context: &VforkContext,
    child: &mut ChildTask,
    stack_size: usize,
) -> Result<Relocation, VforkError> {
    let parent_stack = parent.stack();
    let parent_top = parent_stack.adjusted_top();
    let used = match stack_utilization(parent_top, context.sp) {
        Some(used) if used <= parent_stack.adjusted_size() => used,
        _ => {
            return Err(VforkError::InconsistentStack {
                adjusted_top: parent_top,
                sp: context.sp,
                used: (parent_top as isize).wrapping_sub(context.sp as isize),
            })
        }
    };

    let child_stack = child
        .stack_mut()
        .ok_or(VforkError::InvalidState(TaskError::MissingStack))?;
    let child_top = child_stack.adjusted_top();
    let new_sp =
        copy_live_stack(parent_stack, context.sp, used, child_stack).map_err(VforkError::Relocation)?;
    let new_fp = rebase_frame_pointer(context.fp, parent_top, stack_size, child_top);

    Ok(Relocation { stack_size, used, parent_top, child_top, new_sp, new_fp })
}
