//! Physical word address type.
//!
//! This module defines a single strong type for the addresses flowing through
//! the memory hierarchy. Unlike a conventional CPU model, this simulator does
//! not perform virtual-to-physical translation itself (the front-end already
//! hands the core physical word addresses); `Address` exists purely so block
//! alignment and set-indexing arithmetic can't be confused with a raw `u64`
//! byte count or cycle count elsewhere in the code.

/// A physical word address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

impl Address {
    /// Wraps a raw 64-bit value as an `Address`.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Returns the block-aligned address for the given `block_size`.
    ///
    /// `block_size` must be a power of two; this is enforced at cache
    /// construction time (see [`crate::cache::Cache::new`]).
    #[inline(always)]
    pub fn block_aligned(&self, block_size: u64) -> Address {
        Address(self.0 & !(block_size - 1))
    }

    /// Returns the byte offset of this address within its containing block.
    #[inline(always)]
    pub fn block_offset(&self, block_size: u64) -> u64 {
        self.0 & (block_size - 1)
    }

    /// Returns `true` if `self` and `other` fall in the same `block_size`-aligned block.
    #[inline(always)]
    pub fn same_block(&self, other: Address, block_size: u64) -> bool {
        self.block_aligned(block_size) == other.block_aligned(block_size)
    }
}

impl From<u64> for Address {
    fn from(v: u64) -> Self {
        Address(v)
    }
}
