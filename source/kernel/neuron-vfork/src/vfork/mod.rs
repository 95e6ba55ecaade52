// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Launch/abort coordinator of the vfork context transfer
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Scenario tests (vfork::tests) + proptest (vfork::tests_prop) + tests/vfork_flow.rs
//! PUBLIC API: arch_vfork, VforkEnv, VforkError, VforkFailReason, syscall_return
//! DEPENDS_ON: task::TaskLifecycle, stack::pool::StackAllocator, diag
//! INVARIANTS: setup -> provision -> populate -> start; every failure after setup aborts the
//!             child exactly once; start owns its own abort; the child is never published early

pub mod populate;
pub mod relocate;

#[cfg(test)]
mod tests_prop;

use core::fmt;

use crate::config::{ConfigError, VforkConfig};
use crate::context::VforkContext;
#[cfg(feature = "heapinfo")]
use crate::diag::heapinfo::StackAccounting;
use crate::diag::trace::{TraceRing, VforkTrace};
use crate::errno::{Errno, SyscallReturn};
use crate::stack::pool::{StackAllocError, StackAllocator};
use crate::stack::StackError;
use crate::task::{ChildTask, SetupError, StartError, TaskError, TaskLifecycle, TaskRecord};
use crate::types::Pid;

pub use populate::populate_context;
pub use relocate::{
    allocate_child_stack, copy_live_stack, rebase_frame_pointer, relocate_live_stack, stack_utilization,
    Relocation,
};

/// Why a vfork attempt failed.
#[must_use = "vfork errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VforkError {
    Config(ConfigError),
    /// Task-management collaborator could not create the child.
    Setup(SetupError),
    /// Stack allocator could not provide the child stack.
    OutOfMemory(StackAllocError),
    /// Parent's recorded stack bounds disagree with its stack pointer.
    InconsistentStack { adjusted_top: usize, sp: usize, used: isize },
    /// Child stack too small for the live bytes.
    Relocation(StackError),
    /// Parent holds more pending continuation records than the kernel nests.
    NestingOverflow { pending: usize, max: usize },
    /// Child record was not in the expected construction state.
    InvalidState(TaskError),
    /// Start operation rejected the child; it already aborted it.
    Start(StartError),
}

impl VforkError {
    /// Cause stored in the caller's error state.
    pub const fn errno(&self) -> Errno {
        match self {
            Self::Config(_) | Self::InvalidState(_) => Errno::EINVAL,
            Self::Setup(SetupError::NoFreeSlots) => Errno::EAGAIN,
            Self::Setup(SetupError::InvalidEntryPoint) => Errno::EINVAL,
            Self::OutOfMemory(_) => Errno::ENOMEM,
            Self::InconsistentStack { .. } | Self::Relocation(_) | Self::NestingOverflow { .. } => {
                Errno::EFAULT
            }
            Self::Start(StartError::QueueFull { .. }) => Errno::EAGAIN,
            Self::Start(_) => Errno::EINVAL,
        }
    }

    /// Internal-consistency faults; the kernel's fault policy should halt on these.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InconsistentStack { .. } | Self::Relocation(_) | Self::NestingOverflow { .. }
        )
    }

    pub const fn fail_reason(&self) -> VforkFailReason {
        match self {
            Self::Config(_) => VforkFailReason::InvalidConfig,
            Self::Setup(SetupError::NoFreeSlots) => VforkFailReason::NoTaskSlot,
            Self::Setup(SetupError::InvalidEntryPoint) => VforkFailReason::InvalidEntry,
            Self::OutOfMemory(_) => VforkFailReason::OutOfMemory,
            Self::InconsistentStack { .. } | Self::Relocation(_) => {
                VforkFailReason::StackInconsistent
            }
            Self::NestingOverflow { .. } => VforkFailReason::NestingOverflow,
            Self::InvalidState(_) => VforkFailReason::InvalidState,
            Self::Start(_) => VforkFailReason::StartRejected,
        }
    }
}

impl fmt::Display for VforkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid config: {err}"),
            Self::Setup(err) => write!(f, "setup failed: {err}"),
            Self::OutOfMemory(err) => write!(f, "stack allocation failed: {err}"),
            Self::InconsistentStack { adjusted_top, sp, used } => write!(
                f,
                "stack bounds disagree with sp: top={adjusted_top:#x} sp={sp:#x} used={used}"
            ),
            Self::Relocation(err) => write!(f, "relocation failed: {err}"),
            Self::NestingOverflow { pending, max } => {
                write!(f, "{pending} pending syscalls exceed nesting depth {max}")
            }
            Self::InvalidState(err) => write!(f, "{err}"),
            Self::Start(err) => write!(f, "start failed: {err}"),
        }
    }
}

/// Stable failure taxonomy for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VforkFailReason {
    Unknown,
    InvalidConfig,
    NoTaskSlot,
    InvalidEntry,
    OutOfMemory,
    StackInconsistent,
    InvalidState,
    StartRejected,
    NestingOverflow,
}

impl VforkFailReason {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::InvalidConfig => 1,
            Self::NoTaskSlot => 2,
            Self::InvalidEntry => 3,
            Self::OutOfMemory => 4,
            Self::StackInconsistent => 5,
            Self::InvalidState => 6,
            Self::StartRejected => 7,
            Self::NestingOverflow => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InvalidConfig => "config",
            Self::NoTaskSlot => "no-slot",
            Self::InvalidEntry => "entry",
            Self::OutOfMemory => "oom",
            Self::StackInconsistent => "stack",
            Self::InvalidState => "state",
            Self::StartRejected => "start",
            Self::NestingOverflow => "nesting",
        }
    }
}

/// Collaborators used by one [`arch_vfork`] call.
pub struct VforkEnv<'a> {
    pub tasks: &'a mut dyn TaskLifecycle,
    pub stacks: &'a mut dyn StackAllocator,
    pub trace: Option<&'a mut TraceRing>,
    #[cfg(feature = "heapinfo")]
    pub accounting: Option<&'a mut dyn StackAccounting>,
}

impl<'a> VforkEnv<'a> {
    pub fn new(tasks: &'a mut dyn TaskLifecycle, stacks: &'a mut dyn StackAllocator) -> Self {
        Self {
            tasks,
            stacks,
            trace: None,
            #[cfg(feature = "heapinfo")]
            accounting: None,
        }
    }

    pub fn with_trace(mut self, trace: &'a mut TraceRing) -> Self {
        self.trace = Some(trace);
        self
    }

    #[cfg(feature = "heapinfo")]
    pub fn with_accounting(mut self, accounting: &'a mut dyn StackAccounting) -> Self {
        self.accounting = Some(accounting);
        self
    }
}

fn abort_child(tasks: &mut dyn TaskLifecycle, child: ChildTask, err: VforkError) -> VforkError {
    crate::log_error!(
        target: "vfork",
        "child pid={} aborted in state {}: {} ({})",
        child.pid(),
        child.state(),
        err,
        err.fail_reason().label()
    );
    tasks.abort(child, err.errno());
    err
}

/// Creates a child of `parent` that resumes at the `vfork` call site.
///
/// `context` is the register snapshot taken by the calling-convention stub. On success the
/// parent receives the child's PID; the child's saved R0 stays zero, so it observes `0` from
/// the same call once scheduled.
///
/// The child shares the parent's data until it calls `_exit` or `exec`. Until then it may
/// only store the return value of `vfork`; touching anything else or calling any other
/// function is undefined behavior of the surrounding API and is not checked here.
pub fn arch_vfork(
    parent: &TaskRecord,
    context: &VforkContext,
    config: &VforkConfig,
    env: &mut VforkEnv<'_>,
) -> Result<Pid, VforkError> {
    if let Err(err) = config.validate() {
        crate::log_error!(target: "vfork", "rejected config: {}", err);
        return Err(VforkError::Config(err));
    }

    crate::log_debug!(
        target: "vfork",
        "vfork context [{:#x}]: r4..r10={:x?} fp={:#x} sp={:#x} lr={:#x}",
        context as *const VforkContext as usize,
        context.callee_saved,
        context.fp,
        context.sp,
        context.lr
    );

    let mut child = match env.tasks.setup(parent, context.entry_point()) {
        Ok(child) => child,
        Err(err) => {
            crate::log_error!(target: "vfork", "setup failed parent={}: {}", parent.pid(), err);
            return Err(VforkError::Setup(err));
        }
    };
    crate::log_debug!(target: "vfork", "parent={} child={}", parent.pid(), child.pid());

    let stack_size = match relocate::allocate_child_stack(parent, &mut child, &mut *env.stacks, config) {
        Ok(size) => size,
        Err(err) => return Err(abort_child(&mut *env.tasks, child, err)),
    };

    #[cfg(feature = "heapinfo")]
    if let (Some(accounting), Some(stack)) = (env.accounting.as_deref_mut(), child.stack()) {
        accounting.exclude_stack(stack);
        accounting.set_stack_owner(stack, child.pid());
    }

    let reloc = match relocate::relocate_live_stack(parent, context, &mut child, stack_size) {
        Ok(reloc) => reloc,
        Err(err) => return Err(abort_child(&mut *env.tasks, child, err)),
    };
    crate::log_debug!(
        target: "vfork",
        "stack size={} used={} parent top={:#x} sp={:#x} fp={:#x} child top={:#x} sp={:#x} fp={:#x}",
        reloc.stack_size,
        reloc.used,
        reloc.parent_top,
        context.sp,
        context.fp,
        reloc.child_top,
        reloc.new_sp,
        reloc.new_fp
    );

    let populated = populate_context(
        child.context_mut(),
        context,
        reloc.new_sp,
        reloc.new_fp,
        parent.context(),
        config,
    );
    let nsyscalls = match populated {
        Ok(n) => n,
        Err(err) => return Err(abort_child(&mut *env.tasks, child, err)),
    };
    if let Err(err) = child.mark_populated() {
        return Err(abort_child(&mut *env.tasks, child, VforkError::InvalidState(err)));
    }

    if let Some(trace) = env.trace.as_deref_mut() {
        trace.record(VforkTrace {
            seq: 0,
            parent: parent.pid(),
            child: child.pid(),
            stack_size: reloc.stack_size,
            used: reloc.used,
            parent_top: reloc.parent_top,
            sp: context.sp,
            fp: context.fp,
            child_top: reloc.child_top,
            new_sp: reloc.new_sp,
            new_fp: reloc.new_fp,
            nsyscalls,
        });
    }

    let pid = child.pid();
    env.tasks.start(child).map_err(|err| {
        crate::log_error!(target: "vfork", "start failed child={}: {}", pid, err);
        VforkError::Start(err)
    })
}

/// Converts an [`arch_vfork`] result into what the syscall stub returns to the parent.
pub fn syscall_return(result: &Result<Pid, VforkError>) -> SyscallReturn {
    match result {
        Ok(pid) => SyscallReturn::ok(pid.as_raw() as isize),
        Err(err) => SyscallReturn::err(err.errno()),
    }
}
