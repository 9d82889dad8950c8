//! Memory access kind and accounting-mode classification.
//!
//! Mirrors the teacher's `common/data.rs` `AccessType` enum (there:
//! Fetch/Read/Write for MMU permission checks); here the same shape instead
//! distinguishes the three operations a cache line access can perform
//! (spec.md §4.B) and the seven `modeled` dispatch modes the core façade
//! uses to decide how heavily to account a given access (spec.md §4.I step 9).

/// The operation performed on a single cache line (spec.md §4.B).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemOpKind {
    /// A demand load; updates replacement metadata and may trigger prefetch.
    Load,
    /// A demand store; marks the line dirty and may trigger a coherence upgrade.
    Store,
    /// A non-destructive probe; does not update replacement metadata or state.
    Peek,
}

impl MemOpKind {
    /// Whether this kind corresponds to a write for coherence purposes.
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, MemOpKind::Store)
    }
}

/// Accounting-mode dispatch for [`crate::core_facade::CoreFacade::access_memory`]
/// (spec.md §4.I step 9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modeled {
    /// No timing or counter accounting performed.
    None,
    /// Update hit/miss counters only.
    Count,
    /// As `Count`, plus inject a TLB-miss timing instruction on TLB miss.
    CountTlbTime,
    /// Inject a `MemAccessInstruction` carrying the measured shmem latency.
    Time,
    /// As `Time`, but the injected instruction is a memory fence boundary.
    Fenced,
    /// Push a full `DynamicInstructionInfo` record for offline interval-model replay.
    DynInfo,
}
