//! Inline cache sites
//!
//! Each site remembers the results of previous resolutions keyed by the
//! receiver's structure (plus, for `instanceof`, the resolved prototype
//! object). Entries that depend on more than the receiver's structure carry
//! watchpoints; when one fires, the table evicts the entry it guards.
//!
//! Sites move through the usual states:
//! Uninitialized → Monomorphic → Polymorphic → Megamorphic. A megamorphic
//! site never caches again and every access takes the slow path.

use smallvec::SmallVec;

use crate::config::RuntimeConfig;
use crate::object::ObjectId;
use crate::structure::StructureId;
use crate::value::{PropertyKey, Value};
use crate::watchpoint::{WatchpointId, WatchpointObserver};

/// Handle to a cache site
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IcSiteId(pub(crate) u32);

/// Identifies one committed (or pending) entry of one site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheEntryRef {
    /// Site
    pub site: IcSiteId,
    /// Unique per entry; evictions for stale stamps are ignored
    pub stamp: u64,
}

/// Operation a site caches
#[derive(Clone, Debug)]
pub enum IcKind {
    /// `obj.key`
    GetById(PropertyKey),
    /// `lhs instanceof rhs`, with the sites used to read
    /// `rhs[Symbol.hasInstance]` and `rhs.prototype`
    InstanceOf {
        /// Site for `rhs.prototype`
        prototype_site: IcSiteId,
        /// Site for `rhs[Symbol.hasInstance]`
        has_instance_site: IcSiteId,
    },
}

/// How a cached property read produces its value
#[derive(Clone, Debug, PartialEq)]
pub enum GetByIdHandler {
    /// Own data property at `offset`
    OwnData {
        /// Slot offset
        offset: u32,
    },
    /// Own accessor at `offset`; the getter is read from the slot
    OwnAccessor {
        /// Slot offset
        offset: u32,
    },
    /// Data property on a prototype, held by value
    PrototypeConstant {
        /// The value
        value: Value,
    },
    /// Accessor on a prototype
    PrototypeAccessor {
        /// Getter, if any
        getter: Option<Value>,
    },
    /// Not found anywhere on the chain
    Absent,
}

/// Cached outcome of a resolution
#[derive(Clone, Debug, PartialEq)]
pub enum CachedResult {
    /// Property read
    Get(GetByIdHandler),
    /// `instanceof` answer
    InstanceOf(bool),
}

/// One cached resolution
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Receiver structure the entry was validated against
    pub structure: StructureId,
    /// Resolved `prototype` object (only for `instanceof`)
    pub prototype: Option<ObjectId>,
    /// Result
    pub result: CachedResult,
    pub(crate) stamp: u64,
    pub(crate) watchpoints: SmallVec<[WatchpointId; 4]>,
}

impl CacheEntry {
    pub(crate) fn new(
        structure: StructureId,
        prototype: Option<ObjectId>,
        result: CachedResult,
        stamp: u64,
        watchpoints: SmallVec<[WatchpointId; 4]>,
    ) -> Self {
        Self {
            structure,
            prototype,
            result,
            stamp,
            watchpoints,
        }
    }

    #[inline]
    fn matches(&self, structure: StructureId, prototype: Option<ObjectId>) -> bool {
        self.structure == structure && self.prototype == prototype
    }

    /// Watchpoints guarding this entry
    pub fn watchpoints(&self) -> &[WatchpointId] {
        &self.watchpoints
    }
}

/// State of an Inline Cache (IC)
#[derive(Clone, Debug, Default)]
pub enum InlineCacheState {
    /// Initial state: no information cached
    #[default]
    Uninitialized,
    /// Single entry
    Monomorphic(CacheEntry),
    /// Several entries, most recently used first
    Polymorphic(Vec<CacheEntry>),
    /// Too many shapes or too many misses: always take the slow path
    Megamorphic,
}

impl InlineCacheState {
    fn take_entries(&mut self) -> Vec<CacheEntry> {
        match std::mem::take(self) {
            Self::Monomorphic(entry) => vec![entry],
            Self::Polymorphic(entries) => entries,
            Self::Uninitialized | Self::Megamorphic => Vec::new(),
        }
    }
}

/// A call-site-local cache
#[derive(Debug)]
pub struct InlineCacheSite {
    kind: IcKind,
    state: InlineCacheState,
    hit_count: u32,
    miss_count: u32,
}

impl InlineCacheSite {
    fn new(kind: IcKind) -> Self {
        Self {
            kind,
            state: InlineCacheState::Uninitialized,
            hit_count: 0,
            miss_count: 0,
        }
    }

    /// Operation this site caches
    pub fn kind(&self) -> &IcKind {
        &self.kind
    }

    /// Current state
    pub fn state(&self) -> &InlineCacheState {
        &self.state
    }

    /// Fast-path hits so far
    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    /// Slow-path resolutions so far
    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    /// True once the site gave up caching
    pub fn is_megamorphic(&self) -> bool {
        matches!(self.state, InlineCacheState::Megamorphic)
    }

    /// Number of live entries
    pub fn entry_count(&self) -> usize {
        match &self.state {
            InlineCacheState::Monomorphic(_) => 1,
            InlineCacheState::Polymorphic(entries) => entries.len(),
            InlineCacheState::Uninitialized | InlineCacheState::Megamorphic => 0,
        }
    }

    fn lookup(
        &mut self,
        structure: StructureId,
        prototype: Option<ObjectId>,
    ) -> Option<CachedResult> {
        let found = match &mut self.state {
            InlineCacheState::Monomorphic(entry) if entry.matches(structure, prototype) => {
                Some(entry.result.clone())
            }
            InlineCacheState::Polymorphic(entries) => {
                let index = entries.iter().position(|e| e.matches(structure, prototype))?;
                // MRU reordering
                if index != 0 {
                    entries.swap(0, index);
                }
                Some(entries[0].result.clone())
            }
            _ => None,
        };
        if found.is_some() {
            self.hit_count = self.hit_count.saturating_add(1);
        }
        found
    }
}

/// All cache sites of a realm
#[derive(Debug, Default)]
pub struct InlineCacheTable {
    sites: Vec<InlineCacheSite>,
    next_stamp: u64,
}

impl InlineCacheTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new site
    pub fn create_site(&mut self, kind: IcKind) -> IcSiteId {
        let id = IcSiteId(self.sites.len() as u32);
        self.sites.push(InlineCacheSite::new(kind));
        id
    }

    /// Get a site
    pub fn site(&self, id: IcSiteId) -> &InlineCacheSite {
        &self.sites[id.0 as usize]
    }

    /// Number of sites
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no site exists
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Fast path: cached result for `(structure, prototype)`, if any.
    pub fn lookup(
        &mut self,
        id: IcSiteId,
        structure: StructureId,
        prototype: Option<ObjectId>,
    ) -> Option<CachedResult> {
        self.sites[id.0 as usize].lookup(structure, prototype)
    }

    /// Count a slow-path resolution.
    pub fn record_miss(&mut self, id: IcSiteId) {
        let site = &mut self.sites[id.0 as usize];
        site.miss_count = site.miss_count.saturating_add(1);
    }

    /// Whether the site still accepts new entries.
    pub fn accepts_entries(&self, id: IcSiteId) -> bool {
        !self.site(id).is_megamorphic()
    }

    /// Fresh stamp for a pending entry.
    pub fn next_stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Install `entry` and return the watchpoints of entries that were
    /// displaced (or of `entry` itself if the site went megamorphic). The
    /// caller must retire them.
    pub fn commit(
        &mut self,
        id: IcSiteId,
        entry: CacheEntry,
        config: &RuntimeConfig,
    ) -> SmallVec<[WatchpointId; 4]> {
        let site = &mut self.sites[id.0 as usize];
        let mut displaced: SmallVec<[WatchpointId; 4]> = SmallVec::new();

        if site.is_megamorphic() {
            displaced.extend(entry.watchpoints);
            return displaced;
        }

        let mut entries = site.state.take_entries();
        entries.retain(|e| {
            if e.matches(entry.structure, entry.prototype) {
                displaced.extend(e.watchpoints.iter().copied());
                false
            } else {
                true
            }
        });

        let too_many_misses = site.miss_count >= config.megamorphic_miss_threshold;
        if too_many_misses || entries.len() >= config.max_polymorphic_entries {
            for old in entries {
                displaced.extend(old.watchpoints);
            }
            displaced.extend(entry.watchpoints);
            site.state = InlineCacheState::Megamorphic;
            tracing::debug!(
                target: "otter::ic",
                site = id.0,
                misses = site.miss_count,
                "inline cache went megamorphic"
            );
            return displaced;
        }

        entries.insert(0, entry);
        site.state = if entries.len() == 1 {
            InlineCacheState::Monomorphic(entries.remove(0))
        } else {
            InlineCacheState::Polymorphic(entries)
        };
        displaced
    }

    /// Remove the entry with `stamp` from `id`, if still present.
    pub fn evict(&mut self, id: IcSiteId, stamp: u64) -> Option<CacheEntry> {
        let site = &mut self.sites[id.0 as usize];
        match &mut site.state {
            InlineCacheState::Monomorphic(entry) => {
                if entry.stamp != stamp {
                    return None;
                }
                site.state.take_entries().pop()
            }
            InlineCacheState::Polymorphic(entries) => {
                let index = entries.iter().position(|e| e.stamp == stamp)?;
                let evicted = entries.remove(index);
                if entries.len() == 1 {
                    let last = entries.remove(0);
                    site.state = InlineCacheState::Monomorphic(last);
                }
                Some(evicted)
            }
            _ => None,
        }
    }
}

impl WatchpointObserver for InlineCacheTable {
    fn watchpoint_fired(&mut self, owner: CacheEntryRef) -> SmallVec<[WatchpointId; 4]> {
        match self.evict(owner.site, owner.stamp) {
            Some(entry) => {
                tracing::trace!(
                    target: "otter::ic",
                    site = owner.site.0,
                    stamp = owner.stamp,
                    "cache entry evicted"
                );
                entry.watchpoints
            }
            None => SmallVec::new(),
        }
    }
}
