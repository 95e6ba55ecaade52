// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Architecture half of the NEURON `vfork` primitive
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit + proptest (vfork::tests_prop) + host integration (tests/vfork_flow.rs)
//! PUBLIC API: arch_vfork, VforkEnv, VforkContext, TaskRecord, ChildTask, TaskLifecycle, StackAllocator
//! DEPENDS_ON: bitflags, spin, static_assertions
//! INVARIANTS: Child never published before stack + saved context are complete; child R0 stays 0;
//!             parent stack is read-only during the transfer; one stack allocation per call
//!
//! The calling-convention stub captures the parent's callee-saved registers into a
//! [`VforkContext`] and calls [`arch_vfork`]. The core allocates a stack for the child,
//! relocates the live part of the parent's stack into it, fills in the child's saved
//! register file and hands the record to [`TaskLifecycle::start`]. Every failure before the
//! hand-off goes through [`TaskLifecycle::abort`].

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

extern crate alloc;

pub mod diag;
pub use diag::log;

pub mod arch;
pub mod config;
pub mod context;
pub mod errno;
pub mod sched;
pub mod stack;
pub mod task;
pub mod types;
pub mod vfork;

pub use arch::{ArchProfile, ResumeState, SyscallContinuation, XcptContext};
pub use config::{ConfigError, VforkConfig};
pub use context::VforkContext;
pub use errno::{Errno, SyscallReturn};
pub use stack::pool::{SharedStackPool, StackAllocError, StackAllocator, StackPool};
pub use stack::{StackError, StackRegion};
pub use task::table::TaskTable;
pub use task::{ChildState, ChildTask, SetupError, StartError, TaskError, TaskLifecycle, TaskRecord};
pub use types::{Pid, TaskFlags, TaskType};
pub use vfork::{arch_vfork, syscall_return, VforkEnv, VforkError, VforkFailReason};
