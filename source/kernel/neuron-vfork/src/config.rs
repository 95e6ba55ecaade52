// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Build-time knobs of the vfork core as a runtime value
//! OWNERS: @kernel-team
//! PUBLIC API: VforkConfig, ConfigError, STACK_ALIGNMENT
//! INVARIANTS: stack_alignment is a non-zero power of two; nesting implies a non-zero depth

use core::fmt;

use static_assertions::const_assert;

use crate::arch::ArchProfile;

/// Alignment of the initial stack pointer required by the ARM procedure call standard.
pub const STACK_ALIGNMENT: usize = 8;

/// Deepest privileged-call nesting the kernel supports by default.
pub const MAX_NESTED_SYSCALLS: usize = 2;

const_assert!(STACK_ALIGNMENT.is_power_of_two());
const_assert!(MAX_NESTED_SYSCALLS > 0);

#[must_use = "configuration errors must be handled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Alignment is zero or not a power of two.
    BadAlignment { alignment: usize },
    /// Continuation duplication is enabled with room for zero records.
    NoNestingDepth,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAlignment { alignment } => {
                write!(f, "stack alignment {alignment} is not a power of two")
            }
            Self::NoNestingDepth => f.write_str("syscall nesting enabled with zero depth"),
        }
    }
}

/// Parameters of one vfork core instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VforkConfig {
    pub profile: ArchProfile,
    pub stack_alignment: usize,
    /// Duplicate pending continuation records into the child.
    pub syscall_nesting: bool,
    /// Deepest continuation list a parent may hold; deeper lists are an internal fault.
    pub max_nested_syscalls: usize,
}

impl Default for VforkConfig {
    fn default() -> Self {
        Self::for_profile(ArchProfile::CortexM)
    }
}

impl VforkConfig {
    pub const fn for_profile(profile: ArchProfile) -> Self {
        Self {
            profile,
            stack_alignment: STACK_ALIGNMENT,
            syscall_nesting: cfg!(feature = "syscall_nesting"),
            max_nested_syscalls: MAX_NESTED_SYSCALLS,
        }
    }

    pub const fn with_alignment(mut self, alignment: usize) -> Self {
        self.stack_alignment = alignment;
        self
    }

    pub const fn with_syscall_nesting(mut self, enabled: bool, max_depth: usize) -> Self {
        self.syscall_nesting = enabled;
        self.max_nested_syscalls = max_depth;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.stack_alignment.is_power_of_two() {
            return Err(ConfigError::BadAlignment { alignment: self.stack_alignment });
        }
        if self.syscall_nesting && self.max_nested_syscalls == 0 {
            return Err(ConfigError::NoNestingDepth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(VforkConfig::default().validate(), Ok(()));
        assert_eq!(VforkConfig::default().stack_alignment, 8);
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        for alignment in [0, 3, 12] {
            let cfg = VforkConfig::default().with_alignment(alignment);
            assert_eq!(cfg.validate(), Err(ConfigError::BadAlignment { alignment }));
        }
    }

    #[test]
    fn nesting_needs_depth() {
        let cfg = VforkConfig::default().with_syscall_nesting(true, 0);
        assert_eq!(cfg.validate(), Err(ConfigError::NoNestingDepth));
        let cfg = VforkConfig::default().with_syscall_nesting(false, 0);
        assert_eq!(cfg.validate(), Ok(()));
    }
}
