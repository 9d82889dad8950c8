//! Common utilities and types used throughout the simulation core.
//!
//! This module provides fundamental building blocks shared across every
//! component of the simulator. It includes:
//! 1. **Address type:** A physical word address with block-alignment helpers.
//! 2. **Constants:** System-wide constants for block sizing and simulation control.
//! 3. **Memory access kinds:** Load/store/peek classification and the `Modeled`
//!    accounting-mode dispatch used by the core façade.
//! 4. **Hit location:** `HitWhere`, the deepest level a request reached.
//! 5. **Error handling:** `SimError`, the cross-component fallible-boundary type.

/// Physical word address type and block-alignment helpers.
pub mod address;

/// System-wide constants (block sizing, simulation thresholds).
pub mod constants;

/// Memory access kind and `Modeled` accounting-mode classification.
pub mod access;

/// Hit-location classification (`HitWhere`) with "closer is smaller" ordering.
pub mod hit_where;

/// Cross-component error type and the fail-fast policy it encodes.
pub mod error;

/// Stable MSI coherence states for resident cache blocks.
pub mod coherence;

pub use access::{MemOpKind, Modeled};
pub use address::Address;
pub use coherence::MsiState;
pub use error::SimError;
pub use hit_where::HitWhere;
