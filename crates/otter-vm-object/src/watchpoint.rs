//! Watchpoints: one-shot invalidatable assumptions.
//!
//! A cache entry that relies on something it cannot check cheaply on every
//! hit (a prototype's layout, a prototype link, the value of a prototype
//! property) registers a watchpoint for it. Whoever breaks the assumption
//! fires the matching watchpoints, and the owning cache entries are evicted
//! synchronously, before `fire` returns. Invalidation is never deferred:
//! the mutation may be happening inside a proxy trap in the middle of
//! another resolution, and any cache consulted after that point must
//! already see the eviction.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::inline_cache::CacheEntryRef;
use crate::object::ObjectId;
use crate::structure::StructureId;
use crate::value::PropertyKey;

/// What kind of assumption a watchpoint guards
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchpointKind {
    /// No object leaves the structure
    StructureStability,
    /// The object's prototype link is not reassigned
    PrototypeChainStability,
    /// The data property's value is not overwritten in place
    PropertyReplacement,
}

/// What a watchpoint is about
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WatchSubject {
    /// A structure
    Structure(StructureId),
    /// An object
    Object(ObjectId),
    /// One property of one object
    Property(ObjectId, PropertyKey),
}

/// Watchpoint state; `Invalidated` is terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchpointState {
    /// Assumption holds
    Valid,
    /// Assumption was broken (or the owner gave it up)
    Invalidated,
}

/// Handle to a watchpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchpointId(u32);

/// A `{subject, kind, state}` triple plus the cache entry it protects
#[derive(Clone, Debug)]
pub struct Watchpoint {
    /// Subject
    pub subject: WatchSubject,
    /// Kind
    pub kind: WatchpointKind,
    /// State
    pub state: WatchpointState,
    /// Entry to evict when fired
    pub owner: Option<CacheEntryRef>,
}

/// Receives notifications for fired watchpoints.
pub trait WatchpointObserver {
    /// Called synchronously while firing. Returns the owner's other
    /// watchpoints, which are retired since the entry they guarded is gone.
    fn watchpoint_fired(&mut self, owner: CacheEntryRef) -> SmallVec<[WatchpointId; 4]>;
}

/// Registry of all watchpoints, indexed by `(subject, kind)`
#[derive(Debug, Default)]
pub struct WatchpointSet {
    watchpoints: Vec<Watchpoint>,
    registry: FxHashMap<(WatchSubject, WatchpointKind), SmallVec<[WatchpointId; 2]>>,
}

impl WatchpointSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, valid watchpoint with no owner.
    pub fn watch(&mut self, subject: WatchSubject, kind: WatchpointKind) -> WatchpointId {
        self.register(subject, kind, None)
    }

    /// Register a new, valid watchpoint protecting a cache entry.
    pub fn watch_for(
        &mut self,
        subject: WatchSubject,
        kind: WatchpointKind,
        owner: CacheEntryRef,
    ) -> WatchpointId {
        self.register(subject, kind, Some(owner))
    }

    fn register(
        &mut self,
        subject: WatchSubject,
        kind: WatchpointKind,
        owner: Option<CacheEntryRef>,
    ) -> WatchpointId {
        let id = WatchpointId(self.watchpoints.len() as u32);
        self.watchpoints.push(Watchpoint {
            subject: subject.clone(),
            kind,
            state: WatchpointState::Valid,
            owner,
        });
        self.registry.entry((subject, kind)).or_default().push(id);
        id
    }

    /// Get a watchpoint
    pub fn get(&self, id: WatchpointId) -> &Watchpoint {
        &self.watchpoints[id.0 as usize]
    }

    /// Current state
    #[inline]
    pub fn state(&self, id: WatchpointId) -> WatchpointState {
        self.get(id).state
    }

    /// True while the watchpoint has not fired
    #[inline]
    pub fn is_valid(&self, id: WatchpointId) -> bool {
        self.state(id) == WatchpointState::Valid
    }

    /// Whether anything is watching `(subject, kind)`.
    #[inline]
    pub fn is_watched(&self, subject: &WatchSubject, kind: WatchpointKind) -> bool {
        !self.registry.is_empty() && self.registry.contains_key(&(subject.clone(), kind))
    }

    /// Invalidate every valid watchpoint on `(subject, kind)` and notify the
    /// owners before returning. Returns how many were invalidated; firing an
    /// already invalidated watchpoint is a no-op.
    pub fn fire(
        &mut self,
        subject: &WatchSubject,
        kind: WatchpointKind,
        observer: &mut dyn WatchpointObserver,
    ) -> usize {
        let Some(ids) = self.registry.remove(&(subject.clone(), kind)) else {
            return 0;
        };

        let mut fired = 0;
        for id in ids {
            let watchpoint = &mut self.watchpoints[id.0 as usize];
            if watchpoint.state == WatchpointState::Invalidated {
                continue;
            }
            watchpoint.state = WatchpointState::Invalidated;
            fired += 1;

            if let Some(owner) = watchpoint.owner {
                let siblings = observer.watchpoint_fired(owner);
                self.retire(&siblings);
            }
        }

        if fired > 0 {
            tracing::debug!(
                target: "otter::watchpoint",
                subject = ?subject,
                kind = ?kind,
                fired,
                "watchpoints fired"
            );
        }
        fired
    }

    /// Invalidate watchpoints without notifying anyone. Used when the entry
    /// they would protect is dropped or never committed.
    pub fn retire(&mut self, ids: &[WatchpointId]) {
        for &id in ids {
            let watchpoint = &mut self.watchpoints[id.0 as usize];
            if watchpoint.state == WatchpointState::Invalidated {
                continue;
            }
            watchpoint.state = WatchpointState::Invalidated;
            let key = (watchpoint.subject.clone(), watchpoint.kind);
            if let Some(bucket) = self.registry.get_mut(&key) {
                bucket.retain(|w| *w != id);
                if bucket.is_empty() {
                    self.registry.remove(&key);
                }
            }
        }
    }

    /// Number of watchpoints ever created
    pub fn len(&self) -> usize {
        self.watchpoints.len()
    }

    /// True when no watchpoint was ever created
    pub fn is_empty(&self) -> bool {
        self.watchpoints.is_empty()
    }

    /// Number of watchpoints still valid
    pub fn valid_count(&self) -> usize {
        self.watchpoints
            .iter()
            .filter(|w| w.state == WatchpointState::Valid)
            .count()
    }
}
