//! Cached named property reads (`obj.key`).
//!
//! A miss plans the access by walking the receiver's chain without running
//! user code, registers the watchpoints the plan depends on, then performs
//! it. Performing it may call a getter, and the getter may invalidate the
//! plan; the entry is only committed if every watchpoint is still valid and
//! the receiver kept its structure.

use smallvec::SmallVec;

use crate::error::{VmError, VmResult};
use crate::inline_cache::{CacheEntry, CacheEntryRef, CachedResult, GetByIdHandler, IcKind, IcSiteId};
use crate::object::{ObjectId, Slot};
use crate::realm::Realm;
use crate::structure::{PropertyKind, StructureId};
use crate::value::{PropertyKey, Value};
use crate::watchpoint::{WatchSubject, WatchpointId, WatchpointKind};

/// A cacheable way to perform one read, plus what it assumes
struct GetByIdPlan {
    handler: GetByIdHandler,
    watches: SmallVec<[(WatchSubject, WatchpointKind); 4]>,
}

impl Realm {
    /// Allocate a cache site for reads of `key`
    pub fn create_get_by_id_site(&mut self, key: impl Into<PropertyKey>) -> IcSiteId {
        self.caches.create_site(IcKind::GetById(key.into()))
    }

    /// `base.key` through cache site `site`.
    ///
    /// Returns exactly what [`Realm::get_value`] would return.
    pub fn get_by_id(&mut self, site: IcSiteId, base: &Value) -> VmResult<Value> {
        let key = match self.caches.site(site).kind() {
            IcKind::GetById(key) => key.clone(),
            IcKind::InstanceOf { .. } => {
                return Err(VmError::type_error("Cache site does not cache property reads"));
            }
        };

        let Some(receiver) = base.as_object() else {
            return self.get_value(base, &key);
        };
        if !self.config().inline_caches_enabled || self.is_proxy(receiver) {
            return self.get(receiver, &key, base);
        }

        let structure = self.structure_of(receiver);
        if let Some(CachedResult::Get(handler)) = self.caches.lookup(site, structure, None) {
            self.stats.ic_hits += 1;
            tracing::trace!(target: "otter::ic", site = ?site, key = %key, "get_by_id hit");
            return self.run_get_handler(receiver, base, handler);
        }

        self.stats.ic_misses += 1;
        self.caches.record_miss(site);
        tracing::trace!(target: "otter::ic", site = ?site, key = %key, "get_by_id miss");

        let plan = match self.plan_get_by_id(receiver, &key) {
            Some(plan) if self.caches.accepts_entries(site) => plan,
            _ => return self.get(receiver, &key, base),
        };

        let stamp = self.caches.next_stamp();
        let owner = CacheEntryRef { site, stamp };
        let watchpoints: SmallVec<[WatchpointId; 4]> = plan
            .watches
            .into_iter()
            .map(|(subject, kind)| self.watchpoints.watch_for(subject, kind, owner))
            .collect();

        let value = match self.run_get_handler(receiver, base, plan.handler.clone()) {
            Ok(value) => value,
            Err(err) => {
                self.watchpoints.retire(&watchpoints);
                return Err(err);
            }
        };

        self.commit_pending(site, structure, receiver, None, CachedResult::Get(plan.handler), stamp, watchpoints);
        Ok(value)
    }

    /// Install a pending entry if nothing it depends on changed while it was
    /// being resolved; otherwise drop it.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn commit_pending(
        &mut self,
        site: IcSiteId,
        structure: StructureId,
        receiver: ObjectId,
        prototype: Option<ObjectId>,
        result: CachedResult,
        stamp: u64,
        watchpoints: SmallVec<[WatchpointId; 4]>,
    ) {
        let intact = self.structure_of(receiver) == structure
            && watchpoints.iter().all(|id| self.watchpoints.is_valid(*id));
        if !intact {
            tracing::trace!(target: "otter::ic", site = ?site, "pending entry invalidated during resolution");
            self.watchpoints.retire(&watchpoints);
            return;
        }

        let entry = CacheEntry::new(structure, prototype, result, stamp, watchpoints);
        let displaced = self.caches.commit(site, entry, &self.config);
        self.watchpoints.retire(&displaced);
        tracing::trace!(target: "otter::ic", site = ?site, stamp, "cache entry committed");
    }

    /// Work out how `receiver.key` resolves and what that depends on.
    /// Returns None when the chain crosses a proxy or is too long.
    fn plan_get_by_id(&self, receiver: ObjectId, key: &PropertyKey) -> Option<GetByIdPlan> {
        let structure = self.structure_of(receiver);
        if let Some(layout) = self.structures.layout_of(structure, key) {
            let handler = match layout.kind {
                PropertyKind::Data => GetByIdHandler::OwnData { offset: layout.offset },
                PropertyKind::Accessor => GetByIdHandler::OwnAccessor { offset: layout.offset },
            };
            return Some(GetByIdPlan {
                handler,
                watches: SmallVec::new(),
            });
        }

        let mut watches = SmallVec::new();
        let mut current = receiver;
        let mut depth = 0;
        loop {
            let Some(holder) = self.ordinary_prototype_of(current) else {
                return Some(GetByIdPlan {
                    handler: GetByIdHandler::Absent,
                    watches,
                });
            };
            depth += 1;
            if self.is_proxy(holder) || depth > self.config().max_prototype_chain_length {
                return None;
            }

            let holder_structure = self.structure_of(holder);
            watches.push((
                WatchSubject::Structure(holder_structure),
                WatchpointKind::StructureStability,
            ));

            if let Some(layout) = self.structures.layout_of(holder_structure, key) {
                watches.push((
                    WatchSubject::Property(holder, key.clone()),
                    WatchpointKind::PropertyReplacement,
                ));
                let handler = match self.object(holder).slot(layout.offset) {
                    Some(Slot::Accessor { get, .. }) => GetByIdHandler::PrototypeAccessor { getter: get.clone() },
                    Some(Slot::Data(value)) => GetByIdHandler::PrototypeConstant { value: value.clone() },
                    None => GetByIdHandler::PrototypeConstant {
                        value: Value::undefined(),
                    },
                };
                return Some(GetByIdPlan { handler, watches });
            }
            current = holder;
        }
    }

    fn run_get_handler(
        &mut self,
        receiver: ObjectId,
        base: &Value,
        handler: GetByIdHandler,
    ) -> VmResult<Value> {
        match handler {
            GetByIdHandler::OwnData { offset } => Ok(match self.object(receiver).slot(offset) {
                Some(Slot::Data(value)) => value.clone(),
                _ => Value::undefined(),
            }),
            GetByIdHandler::OwnAccessor { offset } => {
                let getter = match self.object(receiver).slot(offset) {
                    Some(Slot::Accessor { get: Some(getter), .. }) => getter.clone(),
                    _ => return Ok(Value::undefined()),
                };
                self.call(&getter, base.clone(), &[])
            }
            GetByIdHandler::PrototypeConstant { value } => Ok(value),
            GetByIdHandler::PrototypeAccessor { getter: Some(getter) } => {
                self.call(&getter, base.clone(), &[])
            }
            GetByIdHandler::PrototypeAccessor { getter: None } | GetByIdHandler::Absent => {
                Ok(Value::undefined())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline_cache::InlineCacheState;
    use crate::object::{PropertyAttributes, PropertyDescriptor};

    fn key(s: &str) -> PropertyKey {
        PropertyKey::string(s)
    }

    #[test]
    fn test_own_data_hit_reads_current_slot() {
        let mut realm = Realm::new();
        let o = realm.create_object();
        realm.set_property(o, &key("f"), Value::int32(42)).unwrap();
        let site = realm.create_get_by_id_site("f");

        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(42));
        realm.set_property(o, &key("f"), Value::int32(7)).unwrap();
        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(7));
        assert_eq!(realm.stats().ic_hits, 1);
        assert_eq!(realm.stats().ic_misses, 1);
    }

    #[test]
    fn test_prototype_constant_invalidated_by_overwrite() {
        let mut realm = Realm::new();
        let proto = realm.create_object();
        realm.set_property(proto, &key("m"), Value::int32(1)).unwrap();
        let o = realm.create_object_with_prototype(Some(proto));
        let site = realm.create_get_by_id_site("m");

        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(1));
        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(1));
        assert_eq!(realm.stats().ic_hits, 1);

        realm.set_property(proto, &key("m"), Value::int32(2)).unwrap();
        assert_eq!(realm.caches().site(site).entry_count(), 0);
        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(2));
    }

    #[test]
    fn test_absent_invalidated_when_prototype_gains_property() {
        let mut realm = Realm::new();
        let proto = realm.create_object();
        let o = realm.create_object_with_prototype(Some(proto));
        let site = realm.create_get_by_id_site("late");

        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::undefined());
        let op = realm.object_prototype();
        realm.set_property(op, &key("late"), Value::int32(5)).unwrap();
        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(5));
    }

    #[test]
    fn test_own_accessor_calls_getter_each_time() {
        let mut realm = Realm::new();
        let o = realm.create_object();
        realm.set_property(o, &key("n"), Value::int32(0)).unwrap();
        let getter = realm.create_function("get", |realm, this, _| {
            let this = this.as_object().unwrap();
            let n = realm.get_property(this, &PropertyKey::string("n"))?;
            let next = Value::number(n.as_number().unwrap() + 1.0);
            realm.set_property(this, &PropertyKey::string("n"), next.clone())?;
            Ok(next)
        });
        realm.define_getter(o, &key("tick"), Value::object(getter)).unwrap();
        let site = realm.create_get_by_id_site("tick");

        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(1));
        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(2));
        assert_eq!(realm.stats().ic_hits, 1);
    }

    #[test]
    fn test_getter_that_breaks_its_own_plan_is_not_committed() {
        let mut realm = Realm::new();
        let proto = realm.create_object();
        let getter = realm.create_function("get", move |realm, _, _| {
            realm.define_property(
                proto,
                &PropertyKey::string("v"),
                PropertyDescriptor::data_with_attrs(Value::int32(10), PropertyAttributes::data()),
            )?;
            Ok(Value::int32(1))
        });
        realm.define_getter(proto, &key("v"), Value::object(getter)).unwrap();
        let o = realm.create_object_with_prototype(Some(proto));
        let site = realm.create_get_by_id_site("v");

        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(1));
        assert!(matches!(realm.caches().site(site).state(), InlineCacheState::Uninitialized));
        assert_eq!(realm.get_by_id(site, &Value::object(o)).unwrap(), Value::int32(10));
    }

    #[test]
    fn test_throwing_getter_commits_nothing() {
        let mut realm = Realm::new();
        let o = realm.create_object();
        let getter = realm.create_function("get", |_, _, _| {
            Err(VmError::exception(Value::string("boom")))
        });
        realm.define_getter(o, &key("bad"), Value::object(getter)).unwrap();
        let site = realm.create_get_by_id_site("bad");

        let err = realm.get_by_id(site, &Value::object(o)).unwrap_err();
        assert_eq!(err.thrown_value(), Some(&Value::string("boom")));
        assert_eq!(realm.caches().site(site).entry_count(), 0);
        assert_eq!(realm.watchpoints().valid_count(), 0);
    }

    #[test]
    fn test_proxy_receiver_is_never_cached() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm.set_property(target, &key("x"), Value::int32(3)).unwrap();
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();
        let site = realm.create_get_by_id_site("x");

        for _ in 0..3 {
            assert_eq!(realm.get_by_id(site, &Value::object(proxy)).unwrap(), Value::int32(3));
        }
        assert_eq!(realm.caches().site(site).entry_count(), 0);
    }

    #[test]
    fn test_primitive_base() {
        let mut realm = Realm::new();
        let site = realm.create_get_by_id_site("x");
        assert!(realm.get_by_id(site, &Value::undefined()).unwrap_err().is_type_error());
        assert_eq!(realm.get_by_id(site, &Value::int32(1)).unwrap(), Value::undefined());
    }
}
