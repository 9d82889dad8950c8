//! Stable MSI coherence states (spec.md §3 `CacheBlockInfo.coherence_state`).
//!
//! These are the steady-state values a block rests in between protocol
//! transactions. Transient in-flight states (waiting for a forwarded reply,
//! waiting for acknowledgements) belong to the cache controller's own state
//! machine, not to the block itself — a block is always I/S/E/M at rest.

/// Coherence state of a resident or invalid cache block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsiState {
    /// Not present / not valid.
    Invalid,
    /// Shared: readable, may be cached elsewhere, not writable without upgrade.
    Shared,
    /// Exclusive: readable and writable, guaranteed sole cached copy, clean.
    Exclusive,
    /// Modified: readable and writable, sole cached copy, dirty relative to DRAM.
    Modified,
}

impl MsiState {
    /// Whether the block holds valid data.
    pub fn is_valid(self) -> bool {
        !matches!(self, MsiState::Invalid)
    }

    /// Whether a load may be serviced locally in this state.
    pub fn can_read(self) -> bool {
        matches!(self, MsiState::Shared | MsiState::Exclusive | MsiState::Modified)
    }

    /// Whether a store may be serviced locally without a coherence transaction.
    pub fn can_write(self) -> bool {
        matches!(self, MsiState::Exclusive | MsiState::Modified)
    }
}

impl Default for MsiState {
    fn default() -> Self {
        MsiState::Invalid
    }
}
