//! Realm counters
//!
//! Observation only: nothing in the object model reads these back.

use serde::Serialize;

/// Counters maintained by a [`crate::Realm`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RealmStats {
    /// `[[GetPrototypeOf]]` operations performed (ordinary and proxied)
    pub prototype_reads: u64,
    /// Proxy handler functions actually called
    pub trap_invocations: u64,
    /// Cache fast-path hits
    pub ic_hits: u64,
    /// Cache slow-path resolutions
    pub ic_misses: u64,
    /// Watchpoints invalidated by firing
    pub watchpoints_fired: u64,
    /// Objects moved to a new structure
    pub structure_transitions: u64,
}
