//! `instanceof` (ES2026 §13.10.2 InstanceofOperator, §7.3.21
//! OrdinaryHasInstance).
//!
//! The chain walk re-reads every link through `[[GetPrototypeOf]]`, so a
//! proxy on the chain runs its trap on every evaluation. Results are cached
//! per site only when the walk never crossed a proxy: such a walk runs no
//! user code, and `PrototypeChainStability` on every object whose link was
//! read keeps the answer honest.

use smallvec::SmallVec;

use crate::error::{VmError, VmResult};
use crate::inline_cache::{CacheEntryRef, CachedResult, IcKind, IcSiteId};
use crate::object::ObjectId;
use crate::realm::Realm;
use crate::value::{PropertyKey, Value};
use crate::watchpoint::{WatchSubject, WatchpointId, WatchpointKind};

/// Sites used by one cached `instanceof` expression
#[derive(Clone, Copy)]
struct InstanceOfSites {
    site: IcSiteId,
    prototype_site: IcSiteId,
    has_instance_site: IcSiteId,
}

/// Transient state of one chain walk
#[derive(Debug)]
pub struct ChainWalk {
    /// Whether the prototype was found
    pub found: bool,
    /// Objects whose prototype link was read, in order
    pub visited: SmallVec<[ObjectId; 8]>,
    /// Whether any visited object was a proxy
    pub crossed_proxy: bool,
}

impl Realm {
    /// Allocate a cache site for one `instanceof` expression, together with
    /// the sites it uses to read `rhs[Symbol.hasInstance]` and
    /// `rhs.prototype`.
    pub fn create_instance_of_site(&mut self) -> IcSiteId {
        let prototype_site = self.create_get_by_id_site(PropertyKey::string("prototype"));
        let has_instance_site = self.create_get_by_id_site(PropertyKey::has_instance());
        self.caches.create_site(IcKind::InstanceOf {
            prototype_site,
            has_instance_site,
        })
    }

    /// `lhs instanceof rhs`, uncached
    pub fn has_instance(&mut self, lhs: &Value, rhs: &Value) -> VmResult<bool> {
        self.instance_of_operator(None, lhs, rhs)
    }

    /// `lhs instanceof rhs` through cache site `site` (see
    /// [`Realm::create_instance_of_site`]). Returns exactly what
    /// [`Realm::has_instance`] would.
    pub fn instance_of(&mut self, site: IcSiteId, lhs: &Value, rhs: &Value) -> VmResult<bool> {
        let IcKind::InstanceOf {
            prototype_site,
            has_instance_site,
        } = *self.caches.site(site).kind()
        else {
            return Err(VmError::type_error("Cache site does not cache instanceof"));
        };
        let sites = InstanceOfSites {
            site,
            prototype_site,
            has_instance_site,
        };
        self.instance_of_operator(Some(sites), lhs, rhs)
    }

    /// OrdinaryHasInstance(constructor, value), uncached
    pub fn ordinary_has_instance(&mut self, constructor: &Value, value: &Value) -> VmResult<bool> {
        if !self.is_callable(constructor) {
            return Ok(false);
        }
        let Some(ctor) = constructor.as_object() else {
            return Ok(false);
        };
        self.ordinary_has_instance_impl(None, ctor, value)
    }

    fn instance_of_operator(
        &mut self,
        sites: Option<InstanceOfSites>,
        lhs: &Value,
        rhs: &Value,
    ) -> VmResult<bool> {
        let Some(ctor) = rhs.as_object() else {
            return Err(VmError::type_error(format!(
                "Right-hand side of 'instanceof' is not an object (got {})",
                rhs.type_name()
            )));
        };

        let handler = match sites {
            Some(sites) => self.get_by_id(sites.has_instance_site, rhs)?,
            None => self.get_property(ctor, &PropertyKey::has_instance())?,
        };
        if !handler.is_nullish() {
            if !self.is_callable(&handler) {
                return Err(VmError::type_error("Symbol.hasInstance is not a function"));
            }
            let result = self.call(&handler, rhs.clone(), std::slice::from_ref(lhs))?;
            return Ok(result.to_boolean());
        }

        if !self.is_callable(rhs) {
            return Err(VmError::type_error(
                "Right-hand side of 'instanceof' is not callable",
            ));
        }
        self.ordinary_has_instance_impl(sites, ctor, lhs)
    }

    fn ordinary_has_instance_impl(
        &mut self,
        sites: Option<InstanceOfSites>,
        ctor: ObjectId,
        lhs: &Value,
    ) -> VmResult<bool> {
        let Some(object) = lhs.as_object() else {
            return Ok(false);
        };

        let prototype = match sites {
            Some(sites) => self.get_by_id(sites.prototype_site, &Value::object(ctor))?,
            None => self.get_property(ctor, &PropertyKey::string("prototype"))?,
        };
        let Some(prototype) = prototype.as_object() else {
            return Err(VmError::type_error(format!(
                "Function has non-object prototype '{}' in instanceof check",
                prototype
            )));
        };

        match sites {
            Some(sites) if self.config.inline_caches_enabled && !self.is_proxy(object) => {
                self.cached_chain_lookup(sites.site, object, prototype)
            }
            _ => Ok(self.walk_prototype_chain(object, prototype)?.found),
        }
    }

    fn cached_chain_lookup(
        &mut self,
        site: IcSiteId,
        object: ObjectId,
        prototype: ObjectId,
    ) -> VmResult<bool> {
        let structure = self.structure_of(object);
        if let Some(CachedResult::InstanceOf(answer)) =
            self.caches.lookup(site, structure, Some(prototype))
        {
            self.stats.ic_hits += 1;
            tracing::trace!(target: "otter::ic", site = ?site, answer, "instanceof hit");
            return Ok(answer);
        }

        self.stats.ic_misses += 1;
        self.caches.record_miss(site);

        let walk = self.walk_prototype_chain(object, prototype)?;
        if walk.crossed_proxy || !self.caches.accepts_entries(site) {
            return Ok(walk.found);
        }

        // The first link is covered by the structure key.
        let stamp = self.caches.next_stamp();
        let owner = CacheEntryRef { site, stamp };
        let watchpoints: SmallVec<[WatchpointId; 4]> = walk.visited[1..]
            .iter()
            .map(|&link| {
                self.watchpoints.watch_for(
                    WatchSubject::Object(link),
                    WatchpointKind::PrototypeChainStability,
                    owner,
                )
            })
            .collect();

        self.commit_pending(
            site,
            structure,
            object,
            Some(prototype),
            CachedResult::InstanceOf(walk.found),
            stamp,
            watchpoints,
        );
        Ok(walk.found)
    }

    /// Walk `object`'s chain looking for `prototype`, reading every link
    /// through `[[GetPrototypeOf]]`.
    ///
    /// Fails with a RangeError once `max_prototype_chain_length` links have
    /// been read.
    pub fn walk_prototype_chain(&mut self, object: ObjectId, prototype: ObjectId) -> VmResult<ChainWalk> {
        let mut walk = ChainWalk {
            found: false,
            visited: SmallVec::new(),
            crossed_proxy: false,
        };
        let mut current = object;
        loop {
            if walk.visited.len() >= self.config.max_prototype_chain_length {
                return Err(VmError::range_error(format!(
                    "Prototype chain exceeds maximum length of {} in instanceof check",
                    self.config.max_prototype_chain_length
                )));
            }
            walk.crossed_proxy |= self.is_proxy(current);
            walk.visited.push(current);

            match self.get_prototype_of(current)? {
                None => return Ok(walk),
                Some(next) if next == prototype => {
                    walk.found = true;
                    return Ok(walk);
                }
                Some(next) => current = next,
            }
        }
    }
}
