// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Task stack regions addressed by their kernel virtual addresses
//! OWNERS: @kernel-mm-team
//! PUBLIC API: StackRegion (new/bytes/bytes_mut/read_word/write_word), StackError, align_down
//! DEPENDS_ON: alloc (backing buffer)
//! INVARIANTS: Every access stays within [alloc_base, adjusted_top); adjusted_top is aligned
//!             and exclusive; backing memory starts zeroed

pub mod pool;

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

const WORD: usize = core::mem::size_of::<usize>();

/// Rounds `value` down to a multiple of `alignment` (a power of two).
#[inline]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    value & !(alignment - 1)
}

#[must_use = "stack access errors must be handled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// Access of `len` bytes at `addr` leaves the region.
    OutOfBounds { addr: usize, len: usize },
    /// Address arithmetic wrapped.
    Overflow,
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { addr, len } => {
                write!(f, "stack access of {len} bytes at {addr:#x} out of bounds")
            }
            Self::Overflow => f.write_str("stack address overflow"),
        }
    }
}

/// Contiguous stack owned by one task.
///
/// The buffer models the memory at `[alloc_base, alloc_base + alloc_size)`. The usable part
/// ends at `adjusted_top`, the end rounded down to the stack alignment; stacks grow down
/// from there.
pub struct StackRegion {
    base: usize,
    mem: Box<[u8]>,
    adj_top: usize,
}

impl StackRegion {
    /// Creates a zero-filled region of `size` bytes at virtual address `base`.
    pub fn new(base: usize, size: usize, alignment: usize) -> Result<Self, StackError> {
        if !alignment.is_power_of_two() {
            return Err(StackError::Overflow);
        }
        let end = base.checked_add(size).ok_or(StackError::Overflow)?;
        let adj_top = align_down(end, alignment).max(base);
        Ok(Self { base, mem: vec![0u8; size].into_boxed_slice(), adj_top })
    }

    #[inline]
    pub fn alloc_base(&self) -> usize {
        self.base
    }

    #[inline]
    pub fn alloc_size(&self) -> usize {
        self.mem.len()
    }

    /// First address above the usable stack.
    #[inline]
    pub fn adjusted_top(&self) -> usize {
        self.adj_top
    }

    /// Bytes between the allocation base and the adjusted top.
    #[inline]
    pub fn adjusted_size(&self) -> usize {
        self.adj_top - self.base
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.adj_top
    }

    fn offset(&self, addr: usize, len: usize) -> Result<usize, StackError> {
        let end = addr.checked_add(len).ok_or(StackError::Overflow)?;
        if addr < self.base || end > self.adj_top {
            return Err(StackError::OutOfBounds { addr, len });
        }
        Ok(addr - self.base)
    }

    pub fn bytes(&self, addr: usize, len: usize) -> Result<&[u8], StackError> {
        let start = self.offset(addr, len)?;
        self.mem.get(start..start + len).ok_or(StackError::OutOfBounds { addr, len })
    }

    pub fn bytes_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8], StackError> {
        let start = self.offset(addr, len)?;
        self.mem.get_mut(start..start + len).ok_or(StackError::OutOfBounds { addr, len })
    }

    pub fn read_word(&self, addr: usize) -> Result<usize, StackError> {
        let mut raw = [0u8; WORD];
        raw.copy_from_slice(self.bytes(addr, WORD)?);
        Ok(usize::from_ne_bytes(raw))
    }

    pub fn write_word(&mut self, addr: usize, value: usize) -> Result<(), StackError> {
        self.bytes_mut(addr, WORD)?.copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }
}

impl fmt::Debug for StackRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackRegion")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &self.alloc_size())
            .field("adjusted_top", &format_args!("{:#x}", self.adj_top))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjusted_top_is_aligned_down() {
        let region = StackRegion::new(0x1000, 4099, 8).unwrap();
        assert_eq!(region.adjusted_top(), 0x2000);
        assert_eq!(region.adjusted_size(), 4096);
        assert_eq!(region.alloc_size(), 4099);
        assert!(region.contains(0x1fff));
        assert!(!region.contains(0x2000));
    }

    #[test]
    fn accesses_past_adjusted_top_are_rejected() {
        let mut region = StackRegion::new(0x1000, 64, 8).unwrap();
        assert_eq!(
            region.bytes(0x1038, 16),
            Err(StackError::OutOfBounds { addr: 0x1038, len: 16 })
        );
        assert!(region.bytes_mut(0x0ff8, 8).is_err());
        assert_eq!(region.bytes(usize::MAX, 2), Err(StackError::Overflow));
    }

    #[test]
    fn words_roundtrip_and_memory_starts_zeroed() {
        let mut region = StackRegion::new(0x8000, 256, 8).unwrap();
        assert_eq!(region.read_word(0x8010).unwrap(), 0);
        region.write_word(0x8010, 0xdead_beef).unwrap();
        assert_eq!(region.read_word(0x8010).unwrap(), 0xdead_beef);
    }

    #[test]
    fn wrapping_region_is_rejected() {
        assert_eq!(StackRegion::new(usize::MAX - 4, 16, 8).unwrap_err(), StackError::Overflow);
    }
}
