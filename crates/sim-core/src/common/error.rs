//! Cross-component error type.
//!
//! Mirrors the teacher's `common/error.rs` (there: `Trap`, a closed enum of
//! RISC-V exceptions implementing `Display`/`Error` by hand). This spec's
//! error surface (spec.md §7) is five kinds instead of RISC-V trap causes, so
//! it is expressed with `thiserror` — already a declared dependency of the
//! crate — rather than a hand-rolled `Display` impl, since none of the five
//! variants need the teacher's per-variant formatting logic.
//!
//! Per spec.md §7's "fail fast" policy, `SimError` is reserved for the
//! recoverable/boundary cases (configuration validation, syscall args
//! outside the modeled subset). Protocol violations and trace desync are
//! *assertion* failures — the simulation state is no longer trustworthy —
//! and are raised with `panic!`/`assert!` at the point of detection rather
//! than threaded through `Result`, matching the teacher's approach of using
//! Rust's built-in unwinding for "this should never happen" conditions.

use thiserror::Error;

/// Cross-component fallible-boundary error (spec.md §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Configuration is invalid: unknown replacement/prefetcher policy, a
    /// non-power-of-two cache size, or a negative/zero timing parameter.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A coherence protocol invariant was violated in a way a caller could
    /// plausibly recover from (e.g. a caller retrying with a different
    /// network id after a bus admission failure). Most protocol violations
    /// are instead raised via `panic!` — see the module doc above.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The dyninfo queue underflowed/overflowed relative to the basic-block
    /// queue, or a memory response carried a size that didn't match its
    /// request.
    #[error("trace desynchronization: {0}")]
    TraceDesync(String),

    /// A syscall argument fell outside the modeled subset (spec.md §7); the
    /// caller should fall back to native execution or synthesize a negative
    /// errno, not treat this as fatal.
    #[error("syscall argument outside modeled subset: {0}")]
    SyscallUnmodeled(String),

    /// A queue model's bound was exceeded. Spec.md §7 notes this "never
    /// reached in practice because queue models bound delay by their
    /// window" — retained as a defensive `Result` rather than a panic so a
    /// pathological configuration (window size 0) degrades instead of
    /// aborting the whole simulation.
    #[error("queue model overflow: {0}")]
    QueueOverflow(String),
}

/// Convenience alias used at component boundaries.
pub type SimResult<T> = Result<T, SimError>;
