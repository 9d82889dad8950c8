//! Set-associative cache storage (spec.md §4.B).
//!
//! Grounded on the teacher's `core/units/cache/mod.rs` `CacheSim`: a flat
//! `Vec` of line slots indexed by `set * ways + way`, one replacement-policy
//! instance per cache, `access`/`install_line` as the two entry points. This
//! generalizes that shape to carry coherence state per block, a lock per
//! set (the teacher's simulator is single-threaded and needs none), and the
//! three entry points spec.md names directly: `access_single_line`,
//! `insert_single_line`, `invalidate_single_line`.

use std::sync::Mutex;

use crate::common::{Address, MemOpKind, MsiState};

pub mod policies;

use policies::ReplacementPolicy;

/// Metadata and payload for one resident (or invalid) cache block.
pub struct CacheBlockInfo {
    /// Block-aligned tag (full address of the block, not shifted).
    pub tag: Address,
    /// Stable MSI coherence state.
    pub coherence_state: MsiState,
    /// Whether this block's content differs from the next level / DRAM.
    pub dirty: bool,
    /// Whether this block was installed by a prefetcher rather than a demand access.
    pub prefetched: bool,
    /// The block's raw payload, `block_size` bytes.
    pub data: Vec<u8>,
}

impl CacheBlockInfo {
    fn invalid(block_size: usize) -> Self {
        Self {
            tag: Address::new(0),
            coherence_state: MsiState::Invalid,
            dirty: false,
            prefetched: false,
            data: vec![0u8; block_size],
        }
    }
}

/// One congruence class: a fixed number of block slots plus the lock
/// guarding them. Spec.md §3: "Invariant: at most one slot per tag; empty
/// slots hold the invalid state."
struct CacheSet {
    blocks: Vec<CacheBlockInfo>,
}

/// A set-associative cache level.
///
/// Per-set locks (not a single global lock) let independent sets be
/// accessed concurrently by different cores, matching the lock hierarchy
/// spec.md §5 describes (per-set lock is the innermost of the three tiers).
pub struct Cache {
    name: String,
    block_size: usize,
    num_sets: usize,
    associativity: usize,
    enabled: bool,
    sets: Vec<Mutex<CacheSet>>,
    policy: Mutex<ReplacementPolicy>,
}

/// What an eviction sink receives when `insert_single_line` replaces a
/// valid block.
pub struct Eviction {
    pub addr: Address,
    pub coherence_state: MsiState,
    pub dirty: bool,
    pub payload: Vec<u8>,
}

impl Cache {
    /// Constructs a cache level. `block_size`, `num_sets`, and `associativity`
    /// must satisfy `num_sets * associativity * block_size = total_size`
    /// (spec.md §3); this is the caller's responsibility to arrange via
    /// configuration, not enforced here beyond the power-of-two requirement
    /// on `block_size`.
    pub fn new(
        name: impl Into<String>,
        block_size: usize,
        num_sets: usize,
        associativity: usize,
        policy: ReplacementPolicy,
    ) -> Self {
        assert!(block_size.is_power_of_two(), "block_size must be a power of two");
        let sets = (0..num_sets)
            .map(|_| {
                Mutex::new(CacheSet {
                    blocks: (0..associativity).map(|_| CacheBlockInfo::invalid(block_size)).collect(),
                })
            })
            .collect();
        Self {
            name: name.into(),
            block_size,
            num_sets,
            associativity,
            enabled: true,
            sets,
            policy: Mutex::new(policy),
        }
    }

    /// This cache's configured name (used in logging and stats keys).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this cache is enabled; disabled caches are bypassed entirely
    /// by the controller holding them (spec.md §3 `Cache.enabled`).
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_index(&self, addr: Address) -> usize {
        let block_num = addr.val() / self.block_size as u64;
        (block_num % self.num_sets as u64) as usize
    }

    /// Looks up `addr`'s containing block. On hit, updates replacement
    /// metadata (unless `kind` is `Peek`) and, if `buf` is provided, moves
    /// bytes between `buf` and the block's payload at `addr`'s block offset:
    /// `Load` copies block → buf, `Store` copies buf → block and marks the
    /// block dirty. Returns `None` on miss.
    pub fn access_single_line(
        &self,
        addr: Address,
        kind: MemOpKind,
        buf: Option<&mut [u8]>,
    ) -> Option<MsiState> {
        if !self.enabled {
            return None;
        }
        let set_idx = self.set_index(addr);
        let tag = addr.block_aligned(self.block_size as u64);
        let mut set = self.sets[set_idx].lock().unwrap();
        let way = set.blocks.iter().position(|b| b.coherence_state.is_valid() && b.tag == tag)?;

        if let Some(buf) = buf {
            let offset = addr.block_offset(self.block_size as u64) as usize;
            let block = &mut set.blocks[way];
            let len = buf.len();
            match kind {
                MemOpKind::Load | MemOpKind::Peek => {
                    buf.copy_from_slice(&block.data[offset..offset + len]);
                }
                MemOpKind::Store => {
                    block.data[offset..offset + len].copy_from_slice(buf);
                    block.dirty = true;
                }
            }
        } else if kind.is_write() {
            set.blocks[way].dirty = true;
        }

        if !matches!(kind, MemOpKind::Peek) {
            self.policy.lock().unwrap().on_access(set_idx, way);
        }
        Some(set.blocks[way].coherence_state)
    }

    /// Installs a new block at `addr`, evicting the replacement policy's
    /// chosen victim within the same set. If the victim held valid data, its
    /// `(addr, coherence_state, dirty, payload)` is handed to `eviction_sink`
    /// before being overwritten — callers use this to flush dirty data or
    /// notify sharers, neither of which this module knows about.
    pub fn insert_single_line(
        &self,
        addr: Address,
        fill_buf: &[u8],
        initial_state: MsiState,
        mut eviction_sink: impl FnMut(Eviction),
    ) {
        assert_eq!(fill_buf.len(), self.block_size, "fill_buf must be exactly one block");
        let set_idx = self.set_index(addr);
        let tag = addr.block_aligned(self.block_size as u64);
        let mut set = self.sets[set_idx].lock().unwrap();
        let way = self.policy.lock().unwrap().pick_victim(set_idx);

        let victim = &set.blocks[way];
        if victim.coherence_state.is_valid() {
            eviction_sink(Eviction {
                addr: victim.tag,
                coherence_state: victim.coherence_state,
                dirty: victim.dirty,
                payload: victim.data.clone(),
            });
        }

        set.blocks[way] = CacheBlockInfo {
            tag,
            coherence_state: initial_state,
            dirty: false,
            prefetched: false,
            data: fill_buf.to_vec(),
        };
        self.policy.lock().unwrap().on_insert(set_idx, way);
    }

    /// Installs a freshly-fetched block at `addr`, as `insert_single_line`
    /// does, and in the same step moves `buf`'s bytes to/from it — without
    /// registering a replacement-policy touch the way `access_single_line`
    /// would. A demand fill is not itself a re-reference; only a later hit
    /// should count as one, which is what gives policies like SRRIP their
    /// scan resistance (a filled-and-used line still ages like any other
    /// fresh insert, rather than looking as hot as a repeated hit).
    pub fn fill_single_line(
        &self,
        addr: Address,
        kind: MemOpKind,
        buf: Option<&mut [u8]>,
        fill_buf: &[u8],
        initial_state: MsiState,
        eviction_sink: impl FnMut(Eviction),
    ) {
        self.insert_single_line(addr, fill_buf, initial_state, eviction_sink);
        let set_idx = self.set_index(addr);
        let tag = addr.block_aligned(self.block_size as u64);
        let mut set = self.sets[set_idx].lock().unwrap();
        let Some(way) = set.blocks.iter().position(|b| b.coherence_state.is_valid() && b.tag == tag) else {
            return;
        };
        if let Some(buf) = buf {
            let offset = addr.block_offset(self.block_size as u64) as usize;
            let len = buf.len();
            match kind {
                MemOpKind::Load | MemOpKind::Peek => buf.copy_from_slice(&set.blocks[way].data[offset..offset + len]),
                MemOpKind::Store => {
                    set.blocks[way].data[offset..offset + len].copy_from_slice(buf);
                    set.blocks[way].dirty = true;
                }
            }
        } else if kind.is_write() {
            set.blocks[way].dirty = true;
        }
    }

    /// Marks `addr`'s block invalid, returning whether it had previously
    /// been valid. Used both by explicit invalidation requests and by the
    /// controller when downgrading a line it no longer needs.
    pub fn invalidate_single_line(&self, addr: Address) -> bool {
        let set_idx = self.set_index(addr);
        let tag = addr.block_aligned(self.block_size as u64);
        let mut set = self.sets[set_idx].lock().unwrap();
        match set.blocks.iter().position(|b| b.coherence_state.is_valid() && b.tag == tag) {
            Some(way) => {
                set.blocks[way].coherence_state = MsiState::Invalid;
                set.blocks[way].dirty = false;
                true
            }
            None => false,
        }
    }

    /// Overwrites the coherence state of `addr`'s resident block (used for
    /// silent store upgrades `E -> M` and for installing directory-granted
    /// states after a coherence transaction completes). No-op on miss.
    pub fn set_coherence_state(&self, addr: Address, state: MsiState) {
        let set_idx = self.set_index(addr);
        let tag = addr.block_aligned(self.block_size as u64);
        let mut set = self.sets[set_idx].lock().unwrap();
        if let Some(way) = set.blocks.iter().position(|b| b.coherence_state.is_valid() && b.tag == tag) {
            set.blocks[way].coherence_state = state;
        }
    }

    /// Returns whether `addr` currently has a valid resident block, and if
    /// so its coherence state, without disturbing replacement metadata.
    pub fn peek_state(&self, addr: Address) -> Option<MsiState> {
        self.access_single_line(addr, MemOpKind::Peek, None)
    }

    /// Number of ways (associativity) this cache was built with.
    pub fn associativity(&self) -> usize {
        self.associativity
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}
