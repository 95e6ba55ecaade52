// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Stack allocation collaborator and a bounded reference pool
//! OWNERS: @kernel-mm-team
//! PUBLIC API: StackAllocator, StackAllocError, StackPool, SharedStackPool, STACK_GUARD_BYTES
//! DEPENDS_ON: spin::Mutex (SharedStackPool)
//! INVARIANTS: Allocations never leave [window_base, window_limit); user stacks keep a guard
//!             gap below them; in_use accounting matches live regions

use alloc::sync::Arc;
use core::fmt;

use spin::Mutex;

use super::{align_down, StackRegion};
use crate::types::TaskType;

/// Unmapped gap kept below task and pthread stacks.
pub const STACK_GUARD_BYTES: usize = 4096;

#[must_use = "stack allocation errors must be handled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAllocError {
    /// Window has no room left for the request.
    Exhausted { requested: usize },
    /// Zero-sized or overflowing request.
    InvalidSize,
}

impl fmt::Display for StackAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested } => write!(f, "no room for a {requested}-byte stack"),
            Self::InvalidSize => f.write_str("invalid stack size"),
        }
    }
}

/// Memory-allocation collaborator used by the stack relocator.
pub trait StackAllocator {
    /// Allocates a zeroed stack of at least `size` bytes using `ttype` placement policy.
    fn allocate_stack(&mut self, size: usize, ttype: TaskType) -> Result<StackRegion, StackAllocError>;

    /// Returns a region obtained from [`StackAllocator::allocate_stack`].
    fn release_stack(&mut self, region: StackRegion);
}

#[derive(Debug, Clone, Copy)]
struct LastAllocation {
    base: usize,
    prev_cursor: usize,
}

/// Descending bump pool over a virtual stack window.
#[derive(Debug)]
pub struct StackPool {
    window_base: usize,
    window_limit: usize,
    alignment: usize,
    cursor: usize,
    in_use: usize,
    live: usize,
    last: Option<LastAllocation>,
    #[cfg(feature = "failpoints")]
    fail_next: bool,
}

impl StackPool {
    /// Creates a pool handing out stacks from `[base, limit)`, growing downwards.
    ///
    /// `alignment` must be a power of two.
    pub const fn new(base: usize, limit: usize, alignment: usize) -> Self {
        Self {
            window_base: base,
            window_limit: limit,
            alignment,
            cursor: align_down(limit, alignment),
            in_use: 0,
            live: 0,
            last: None,
            #[cfg(feature = "failpoints")]
            fail_next: false,
        }
    }

    /// Bytes currently held by live stacks.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Number of live stacks.
    pub fn live_stacks(&self) -> usize {
        self.live
    }

    /// Bytes still available below the cursor.
    pub fn remaining(&self) -> usize {
        self.cursor.saturating_sub(self.window_base)
    }

    pub fn window(&self) -> (usize, usize) {
        (self.window_base, self.window_limit)
    }

    /// Forces the next allocation to fail with [`StackAllocError::Exhausted`].
    #[cfg(feature = "failpoints")]
    pub fn fail_next_allocation(&mut self) {
        self.fail_next = true;
    }

    const fn guard_for(ttype: TaskType) -> usize {
        match ttype {
            TaskType::Kernel => 0,
            TaskType::Task | TaskType::Pthread => STACK_GUARD_BYTES,
        }
    }
}

impl StackAllocator for StackPool {
    fn allocate_stack(&mut self, size: usize, ttype: TaskType) -> Result<StackRegion, StackAllocError> {
        if size == 0 {
            return Err(StackAllocError::InvalidSize);
        }
        #[cfg(feature = "failpoints")]
        if core::mem::take(&mut self.fail_next) {
            return Err(StackAllocError::Exhausted { requested: size });
        }

        let exhausted = StackAllocError::Exhausted { requested: size };
        let base = self.cursor.checked_sub(size).ok_or(exhausted)?;
        let base = align_down(base, self.alignment);
        let floor = base.checked_sub(Self::guard_for(ttype)).ok_or(exhausted)?;
        if floor < self.window_base {
            return Err(exhausted);
        }

        let region = StackRegion::new(base, self.cursor - base, self.alignment)
            .map_err(|_| StackAllocError::InvalidSize)?;
        self.last = Some(LastAllocation { base, prev_cursor: self.cursor });
        self.cursor = floor;
        self.in_use += region.alloc_size();
        self.live += 1;
        Ok(region)
    }

    fn release_stack(&mut self, region: StackRegion) {
        self.in_use = self.in_use.saturating_sub(region.alloc_size());
        self.live = self.live.saturating_sub(1);
        if let Some(last) = self.last {
            if last.base == region.alloc_base() {
                self.cursor = last.prev_cursor;
                self.last = None;
            }
        }
    }
}

/// Pool shared between the task table and callers that allocate stacks directly.
#[derive(Clone)]
pub struct SharedStackPool {
    inner: Arc<Mutex<StackPool>>,
}

impl SharedStackPool {
    pub fn new(pool: StackPool) -> Self {
        Self { inner: Arc::new(Mutex::new(pool)) }
    }

    /// Runs `f` with the pool locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut StackPool) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl StackAllocator for SharedStackPool {
    fn allocate_stack(&mut self, size: usize, ttype: TaskType) -> Result<StackRegion, StackAllocError> {
        self.inner.lock().allocate_stack(size, ttype)
    }

    fn release_stack(&mut self, region: StackRegion) {
        self.inner.lock().release_stack(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x2000_0000;
    const LIMIT: usize = 0x2001_0000;

    #[test]
    fn allocates_downwards_with_guard_gap() {
        let mut pool = StackPool::new(BASE, LIMIT, 8);
        let first = pool.allocate_stack(1024, TaskType::Task).unwrap();
        assert_eq!(first.adjusted_top(), LIMIT);
        assert_eq!(first.alloc_base(), LIMIT - 1024);
        let second = pool.allocate_stack(1024, TaskType::Task).unwrap();
        assert_eq!(second.adjusted_top(), first.alloc_base() - STACK_GUARD_BYTES);
        assert_eq!(pool.live_stacks(), 2);
        assert_eq!(pool.in_use(), 2048);
    }

    #[test]
    fn kernel_stacks_are_packed() {
        let mut pool = StackPool::new(BASE, LIMIT, 8);
        let first = pool.allocate_stack(512, TaskType::Kernel).unwrap();
        let second = pool.allocate_stack(512, TaskType::Kernel).unwrap();
        assert_eq!(second.adjusted_top(), first.alloc_base());
    }

    #[test]
    fn odd_sizes_are_rounded_to_alignment() {
        let mut pool = StackPool::new(BASE, LIMIT, 8);
        let region = pool.allocate_stack(4103, TaskType::Kernel).unwrap();
        assert_eq!(region.alloc_base() % 8, 0);
        assert!(region.adjusted_size() >= 4103);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut pool = StackPool::new(BASE, BASE + 8192, 8);
        assert_eq!(
            pool.allocate_stack(8192, TaskType::Task).unwrap_err(),
            StackAllocError::Exhausted { requested: 8192 }
        );
        assert_eq!(pool.allocate_stack(0, TaskType::Task).unwrap_err(), StackAllocError::InvalidSize);
        assert_eq!(pool.live_stacks(), 0);
    }

    #[test]
    fn releasing_latest_stack_rolls_cursor_back() {
        let mut pool = StackPool::new(BASE, LIMIT, 8);
        let before = pool.remaining();
        let region = pool.allocate_stack(2048, TaskType::Pthread).unwrap();
        assert!(pool.remaining() < before);
        pool.release_stack(region);
        assert_eq!(pool.remaining(), before);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn shared_pool_sees_same_state() {
        let pool = SharedStackPool::new(StackPool::new(BASE, LIMIT, 8));
        let mut handle = pool.clone();
        let region = handle.allocate_stack(256, TaskType::Task).unwrap();
        assert_eq!(pool.with(|p| p.live_stacks()), 1);
        handle.release_stack(region);
        assert_eq!(pool.with(|p| p.live_stacks()), 0);
    }

    #[cfg(feature = "failpoints")]
    #[test]
    fn failpoint_denies_one_allocation() {
        let mut pool = StackPool::new(BASE, LIMIT, 8);
        pool.fail_next_allocation();
        assert!(pool.allocate_stack(256, TaskType::Task).is_err());
        assert!(pool.allocate_stack(256, TaskType::Task).is_ok());
    }
}
