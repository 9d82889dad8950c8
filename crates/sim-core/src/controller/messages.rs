//! Coherence protocol message shapes (spec.md §4.E, §4.F).
//!
//! No teacher file models a coherence protocol directly; this enum set is
//! new, shaped like the rest of the crate's message-style enums (e.g.
//! `common::access::MemOpKind`) rather than as a class hierarchy.

use crate::common::Address;

/// A request issued upstream from a cache controller to its next level (or
/// from the LLC to the directory).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamRequest {
    /// Requests shared (read) access to a block.
    GetShared(Address),
    /// Requests exclusive (read-write) access to a block not currently held.
    GetExclusive(Address),
    /// Requests an upgrade from shared to exclusive for a block already held.
    Upgrade(Address),
}

impl UpstreamRequest {
    /// The block address this request targets.
    pub fn addr(&self) -> Address {
        match self {
            UpstreamRequest::GetShared(a) | UpstreamRequest::GetExclusive(a) | UpstreamRequest::Upgrade(a) => *a,
        }
    }
}

/// A reply flowing downstream in response to an `UpstreamRequest`.
#[derive(Clone, Debug)]
pub enum DownstreamReply {
    /// Grants exclusive ownership with the block's current data.
    ExRep { addr: Address, data: Vec<u8> },
    /// Grants shared access with the block's current data.
    ShRep { addr: Address, data: Vec<u8> },
}

impl DownstreamReply {
    pub fn addr(&self) -> Address {
        match self {
            DownstreamReply::ExRep { addr, .. } | DownstreamReply::ShRep { addr, .. } => *addr,
        }
    }
}

/// A request the directory (or a cache holding a block) sends to a sharer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharerRequest {
    /// Invalidate the block; reply with `InvRep`.
    InvReq(Address),
    /// Write back dirty data and invalidate; reply with `FlushRep`.
    FlushReq(Address),
    /// Write back dirty data but retain the block in `Shared`; reply with `WbRep`.
    WbReq(Address),
}

impl SharerRequest {
    pub fn addr(&self) -> Address {
        match self {
            SharerRequest::InvReq(a) | SharerRequest::FlushReq(a) | SharerRequest::WbReq(a) => *a,
        }
    }
}

/// A sharer's reply to a `SharerRequest`.
#[derive(Clone, Debug)]
pub enum SharerReply {
    InvRep { addr: Address },
    FlushRep { addr: Address, data: Vec<u8> },
    WbRep { addr: Address, data: Vec<u8> },
}

impl SharerReply {
    pub fn addr(&self) -> Address {
        match self {
            SharerReply::InvRep { addr, .. } | SharerReply::FlushRep { addr, .. } | SharerReply::WbRep { addr, .. } => {
                *addr
            }
        }
    }
}
