// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Diagnostic stack accounting for memory-usage reports
//! OWNERS: @kernel-mm-team
//! PUBLIC API: StackAccounting, StackUsageRegistry, StackUsage
//! INVARIANTS: Observational only; never fails and never feeds back into allocation

use alloc::vec::Vec;

use crate::stack::StackRegion;
use crate::types::Pid;

/// Registrar informed about every newly created task stack.
pub trait StackAccounting {
    /// Drops the region from the generic heap statistics.
    fn exclude_stack(&mut self, region: &StackRegion);

    /// Attributes the region to `owner`.
    fn set_stack_owner(&mut self, region: &StackRegion, owner: Pid);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackUsage {
    pub owner: Option<Pid>,
    pub base: usize,
    pub size: usize,
}

/// In-memory registry backing `heapinfo` style reports.
#[derive(Debug, Default)]
pub struct StackUsageRegistry {
    entries: Vec<StackUsage>,
}

impl StackUsageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[StackUsage] {
        &self.entries
    }

    pub fn owner_of(&self, base: usize) -> Option<Pid> {
        self.entries.iter().find(|e| e.base == base).and_then(|e| e.owner)
    }

    /// Bytes held by all registered stacks.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Forgets the stack at `base`, e.g. after its task was reaped.
    pub fn forget(&mut self, base: usize) {
        self.entries.retain(|e| e.base != base);
    }

    fn entry_mut(&mut self, region: &StackRegion) -> &mut StackUsage {
        let base = region.alloc_base();
        match self.entries.iter().position(|e| e.base == base) {
            Some(idx) => &mut self.entries[idx],
            None => {
                self.entries.push(StackUsage { owner: None, base, size: region.alloc_size() });
                let last = self.entries.len() - 1;
                &mut self.entries[last]
            }
        }
    }
}

impl StackAccounting for StackUsageRegistry {
    fn exclude_stack(&mut self, region: &StackRegion) {
        let entry = self.entry_mut(region);
        entry.size = region.alloc_size();
    }

    fn set_stack_owner(&mut self, region: &StackRegion, owner: Pid) {
        self.entry_mut(region).owner = Some(owner);
    }
}
