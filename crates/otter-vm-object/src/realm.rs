//! The realm: object heap plus the tables every operation shares.
//!
//! All object operations go through [`Realm`], which owns the heap, the
//! structure table, the watchpoint set and the inline cache table. Any
//! mutation that can break a cached assumption fires the matching
//! watchpoints before returning:
//!
//! - an object leaving structure `S` fires `StructureStability` on `S`
//! - reassigning an object's prototype also fires `PrototypeChainStability`
//!   on that object
//! - overwriting a watched data slot in place fires `PropertyReplacement`
//!
//! Native functions receive `&mut Realm` and may re-enter any operation,
//! including from inside a proxy trap that is itself part of a cached
//! resolution.

use crate::config::RuntimeConfig;
use crate::error::{VmError, VmResult};
use crate::inline_cache::InlineCacheTable;
use crate::object::{
    NativeFunction, ObjectId, ObjectKind, ObjectRecord, PropertyAttributes, PropertyDescriptor,
    Slot,
};
use crate::proxy::JsProxy;
use crate::proxy_operations::{self, ProxyStep};
use crate::stats::RealmStats;
use crate::structure::{PropertyKind, StructureId, StructureTable, TransitionEdit};
use crate::value::{PropertyKey, Value};
use crate::watchpoint::{WatchSubject, WatchpointKind, WatchpointSet};

/// An isolated object world
pub struct Realm {
    objects: Vec<ObjectRecord>,
    pub(crate) structures: StructureTable,
    pub(crate) watchpoints: WatchpointSet,
    pub(crate) caches: InlineCacheTable,
    pub(crate) config: RuntimeConfig,
    pub(crate) stats: RealmStats,
    object_prototype: ObjectId,
    function_prototype: ObjectId,
    call_depth: usize,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("objects", &self.objects.len())
            .field("structures", &self.structures.len())
            .field("watchpoints", &self.watchpoints.len())
            .field("cache_sites", &self.caches.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Realm {
    /// Create a realm with the default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a realm with `Object.prototype` and `Function.prototype`
    /// intrinsics
    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut realm = Self {
            objects: Vec::new(),
            structures: StructureTable::new(),
            watchpoints: WatchpointSet::new(),
            caches: InlineCacheTable::new(),
            config,
            stats: RealmStats::default(),
            object_prototype: ObjectId(0),
            function_prototype: ObjectId(0),
            call_depth: 0,
        };

        let root = realm.structures.root(None);
        realm.object_prototype = realm.alloc(root, ObjectKind::Ordinary);
        realm.mark_as_prototype(realm.object_prototype);

        let function_root = realm.structures.root(Some(realm.object_prototype));
        realm.function_prototype = realm.alloc(
            function_root,
            ObjectKind::Function(NativeFunction::new("", |_, _, _| Ok(Value::undefined()))),
        );
        realm.mark_as_prototype(realm.function_prototype);

        realm.stats = RealmStats::default();
        realm
    }

    /// Configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Counters
    pub fn stats(&self) -> RealmStats {
        self.stats
    }

    /// Zero all counters
    pub fn reset_stats(&mut self) {
        self.stats = RealmStats::default();
    }

    /// Structure table
    pub fn structures(&self) -> &StructureTable {
        &self.structures
    }

    /// Watchpoint set
    pub fn watchpoints(&self) -> &WatchpointSet {
        &self.watchpoints
    }

    /// Inline cache table
    pub fn caches(&self) -> &InlineCacheTable {
        &self.caches
    }

    /// `Object.prototype`
    pub fn object_prototype(&self) -> ObjectId {
        self.object_prototype
    }

    /// `Function.prototype`
    pub fn function_prototype(&self) -> ObjectId {
        self.function_prototype
    }

    /// Number of objects allocated
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Get an object record
    #[inline]
    pub fn object(&self, id: ObjectId) -> &ObjectRecord {
        &self.objects[id.index()]
    }

    #[inline]
    fn object_mut(&mut self, id: ObjectId) -> &mut ObjectRecord {
        &mut self.objects[id.index()]
    }

    /// Current structure of an object
    #[inline]
    pub fn structure_of(&self, id: ObjectId) -> StructureId {
        self.object(id).structure
    }

    /// Whether `id` is a proxy
    #[inline]
    pub fn is_proxy(&self, id: ObjectId) -> bool {
        self.object(id).is_proxy()
    }

    // ---- allocation ----

    fn alloc(&mut self, structure: StructureId, kind: ObjectKind) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectRecord::new(structure, kind));
        id
    }

    fn alloc_with_prototype(&mut self, prototype: Option<ObjectId>, kind: ObjectKind) -> ObjectId {
        if let Some(proto) = prototype {
            self.mark_as_prototype(proto);
        }
        let root = self.structures.root(prototype);
        self.alloc(root, kind)
    }

    /// Create an ordinary object inheriting from `Object.prototype`
    pub fn create_object(&mut self) -> ObjectId {
        self.create_object_with_prototype(Some(self.object_prototype))
    }

    /// Create an ordinary object with the given prototype
    pub fn create_object_with_prototype(&mut self, prototype: Option<ObjectId>) -> ObjectId {
        self.alloc_with_prototype(prototype, ObjectKind::Ordinary)
    }

    /// Create a native function inheriting from `Function.prototype`
    pub fn create_function<F>(&mut self, name: &str, func: F) -> ObjectId
    where
        F: Fn(&mut Realm, &Value, &[Value]) -> VmResult<Value> + 'static,
    {
        let kind = ObjectKind::Function(NativeFunction::new(name, func));
        self.alloc_with_prototype(Some(self.function_prototype), kind)
    }

    /// Create a constructor: a function with a fresh `prototype` object whose
    /// `constructor` points back at the function.
    pub fn create_constructor<F>(&mut self, name: &str, func: F) -> ObjectId
    where
        F: Fn(&mut Realm, &Value, &[Value]) -> VmResult<Value> + 'static,
    {
        let ctor = self.create_function(name, func);
        let prototype = self.create_object();
        self.define_own_data(
            prototype,
            &PropertyKey::string("constructor"),
            Value::object(ctor),
            PropertyAttributes::hidden(),
        );
        self.define_own_data(
            ctor,
            &PropertyKey::string("prototype"),
            Value::object(prototype),
            PropertyAttributes {
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        ctor
    }

    /// `new Proxy(target, handler)`
    pub fn create_proxy(&mut self, target: &Value, handler: &Value) -> VmResult<ObjectId> {
        let (Some(target), Some(handler)) = (target.as_object(), handler.as_object()) else {
            return Err(VmError::type_error(
                "Cannot create proxy with a non-object as target or handler",
            ));
        };
        let root = self.structures.root(None);
        Ok(self.alloc(root, ObjectKind::Proxy(JsProxy::new(target, handler))))
    }

    /// `Proxy.revocable(target, handler)`: the proxy and its revoke function
    pub fn create_revocable_proxy(
        &mut self,
        target: &Value,
        handler: &Value,
    ) -> VmResult<(ObjectId, ObjectId)> {
        let proxy = self.create_proxy(target, handler)?;
        let revoke = self.create_function("revoke", move |realm, _, _| {
            realm.revoke_proxy(proxy);
            Ok(Value::undefined())
        });
        Ok((proxy, revoke))
    }

    /// Revoke a proxy; later operations on it throw a TypeError
    pub fn revoke_proxy(&mut self, proxy: ObjectId) {
        if let Some(p) = self.object_mut(proxy).as_proxy_mut() {
            p.revoke();
            tracing::debug!(target: "otter::proxy", proxy = %proxy, "proxy revoked");
        }
    }

    // ---- calls ----

    /// IsCallable. A proxy is callable when its target is.
    pub fn is_callable(&self, value: &Value) -> bool {
        let Some(mut id) = value.as_object() else {
            return false;
        };
        loop {
            match self.object(id).kind() {
                ObjectKind::Function(_) => return true,
                ObjectKind::Ordinary => return false,
                ObjectKind::Proxy(proxy) => id = proxy.target_raw(),
            }
        }
    }

    /// Call `callee` with `this` and `args`.
    ///
    /// Calling a proxy calls its target. Nested calls deeper than
    /// `max_call_depth` fail with [`VmError::StackOverflow`].
    pub fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let Some(id) = callee.as_object() else {
            return Err(VmError::type_error(format!("{} is not a function", callee)));
        };
        let func = match self.object(id).kind() {
            ObjectKind::Function(f) => f.func.clone(),
            ObjectKind::Proxy(proxy) => {
                let target = proxy
                    .target()
                    .ok_or_else(|| VmError::type_error("Cannot perform 'apply' on a revoked proxy"))?;
                return self.call(&Value::object(target), this, args);
            }
            ObjectKind::Ordinary => {
                return Err(VmError::type_error(format!(
                    "{} is not a function",
                    callee.type_name()
                )));
            }
        };

        if self.call_depth >= self.config.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        self.call_depth += 1;
        let result = func(self, &this, args);
        self.call_depth -= 1;
        result
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        let Some(ctor) = callee.as_object().filter(|_| self.is_callable(callee)) else {
            return Err(VmError::type_error(format!(
                "{} is not a constructor",
                callee.type_name()
            )));
        };
        let prototype = self
            .get_property(ctor, &PropertyKey::string("prototype"))?
            .as_object()
            .unwrap_or(self.object_prototype);
        let instance = self.create_object_with_prototype(Some(prototype));
        let result = self.call(callee, Value::object(instance), args)?;
        if result.is_object() {
            Ok(result)
        } else {
            Ok(Value::object(instance))
        }
    }

    // ---- structure transitions and watchpoints ----

    /// Give `id` a structure of its own the first time it serves as a
    /// prototype, so watching that structure only concerns this object.
    fn mark_as_prototype(&mut self, id: ObjectId) {
        let record = self.object(id);
        if record.is_prototype || record.is_proxy() {
            return;
        }
        self.object_mut(id).is_prototype = true;
        self.transition_object(id, TransitionEdit::BecomePrototype(id));
    }

    /// Move `id` along `edit`, firing the watchpoints the move breaks.
    pub(crate) fn transition_object(&mut self, id: ObjectId, edit: TransitionEdit) -> StructureId {
        let from = self.structure_of(id);
        let prototype_changed = matches!(edit, TransitionEdit::SetPrototype(_));
        let to = self.structures.transition(from, edit);
        if to == from {
            return from;
        }

        let slot_count = self.structures.get(to).slot_count() as usize;
        let record = self.object_mut(id);
        record.structure = to;
        if record.slots.len() < slot_count {
            record.slots.resize(slot_count, Slot::hole());
        }
        self.stats.structure_transitions += 1;

        self.fire(WatchSubject::Structure(from), WatchpointKind::StructureStability);
        if prototype_changed {
            self.fire(WatchSubject::Object(id), WatchpointKind::PrototypeChainStability);
        }
        to
    }

    /// Fire `(subject, kind)`; owning cache entries are evicted before this
    /// returns.
    pub(crate) fn fire(&mut self, subject: WatchSubject, kind: WatchpointKind) {
        if !self.watchpoints.is_watched(&subject, kind) {
            return;
        }
        let fired = self.watchpoints.fire(&subject, kind, &mut self.caches);
        self.stats.watchpoints_fired += fired as u64;
    }

    /// Store into an existing slot.
    fn write_slot(&mut self, id: ObjectId, key: &PropertyKey, offset: u32, slot: Slot) {
        self.object_mut(id).set_slot(offset, slot);
        self.fire(
            WatchSubject::Property(id, key.clone()),
            WatchpointKind::PropertyReplacement,
        );
    }

    /// Count one more link followed by a lookup that started at another
    /// object, failing once the chain bound is exceeded.
    fn follow_link(&self, depth: &mut usize) -> VmResult<()> {
        *depth += 1;
        if *depth > self.config.max_prototype_chain_length {
            return Err(self.chain_too_long());
        }
        Ok(())
    }

    fn chain_too_long(&self) -> VmError {
        VmError::range_error(format!(
            "Prototype chain exceeds maximum length of {}",
            self.config.max_prototype_chain_length
        ))
    }

    // ---- ordinary internal methods ----

    /// Own property of an ordinary object (proxies have none of their own)
    pub(crate) fn ordinary_get_own_property(
        &self,
        id: ObjectId,
        key: &PropertyKey,
    ) -> Option<PropertyDescriptor> {
        let record = self.object(id);
        let layout = self.structures.layout_of(record.structure, key)?;
        Some(match record.slot(layout.offset) {
            Some(Slot::Accessor { get, set }) => PropertyDescriptor::Accessor {
                get: get.clone(),
                set: set.clone(),
                attributes: layout.attributes,
            },
            Some(Slot::Data(value)) => PropertyDescriptor::data_with_attrs(value.clone(), layout.attributes),
            None => PropertyDescriptor::data_with_attrs(Value::undefined(), layout.attributes),
        })
    }

    /// Prototype recorded in the structure of an ordinary object.
    #[inline]
    pub(crate) fn ordinary_prototype_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.structures.get(self.structure_of(id)).prototype()
    }

    /// Add or update an own data property of an ordinary object without
    /// going through traps. Returns false if the definition was rejected.
    pub fn define_own_data(
        &mut self,
        id: ObjectId,
        key: &PropertyKey,
        value: Value,
        attributes: PropertyAttributes,
    ) -> bool {
        self.ordinary_define_own_property(id, key, PropertyDescriptor::data_with_attrs(value, attributes))
    }

    fn ordinary_define_own_property(
        &mut self,
        id: ObjectId,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> bool {
        let structure = self.structure_of(id);
        let kind = if desc.is_accessor() {
            PropertyKind::Accessor
        } else {
            PropertyKind::Data
        };
        let attributes = desc.attributes();

        let Some(layout) = self.structures.layout_of(structure, key) else {
            if !self.structures.get(structure).is_extensible() {
                return false;
            }
            let next = self.transition_object(
                id,
                TransitionEdit::AddProperty {
                    key: key.clone(),
                    kind,
                    attributes,
                },
            );
            let Some(layout) = self.structures.layout_of(next, key) else {
                return false;
            };
            self.object_mut(id).set_slot(layout.offset, Slot::from_descriptor(&desc));
            return true;
        };

        if !layout.attributes.configurable {
            let current = self.ordinary_get_own_property(id, key);
            if !current.is_some_and(|current| compatible_with_non_configurable(&current, &desc)) {
                return false;
            }
        }

        if layout.kind != kind || layout.attributes != attributes {
            self.transition_object(
                id,
                TransitionEdit::Reconfigure {
                    key: key.clone(),
                    kind,
                    attributes,
                },
            );
        }
        self.write_slot(id, key, layout.offset, Slot::from_descriptor(&desc));
        true
    }

    // ---- object operations (proxy aware) ----

    /// `[[GetPrototypeOf]]`
    pub fn get_prototype_of(&mut self, id: ObjectId) -> VmResult<Option<ObjectId>> {
        self.stats.prototype_reads += 1;
        self.forward_prototype_of(id)
    }

    /// `[[GetPrototypeOf]]` reached from a proxy's own `[[GetPrototypeOf]]`,
    /// which has already been counted.
    pub(crate) fn forward_prototype_of(&mut self, id: ObjectId) -> VmResult<Option<ObjectId>> {
        if self.is_proxy(id) {
            return proxy_operations::proxy_get_prototype_of(self, id);
        }
        Ok(self.ordinary_prototype_of(id))
    }

    /// `[[SetPrototypeOf]]`. Returns false for non-extensible objects and
    /// for assignments that would close a cycle.
    pub fn set_prototype_of(&mut self, id: ObjectId, prototype: Option<ObjectId>) -> VmResult<bool> {
        if let Some(proxy) = self.object(id).as_proxy() {
            let target = proxy
                .target()
                .ok_or_else(|| VmError::type_error("Cannot perform 'setPrototypeOf' on a revoked proxy"))?;
            return self.set_prototype_of(target, prototype);
        }

        let structure = self.structures.get(self.structure_of(id));
        if structure.prototype() == prototype {
            return Ok(true);
        }
        if !structure.is_extensible() {
            return Ok(false);
        }

        let mut cursor = prototype;
        while let Some(candidate) = cursor {
            if candidate == id {
                return Ok(false);
            }
            if self.is_proxy(candidate) {
                break;
            }
            cursor = self.ordinary_prototype_of(candidate);
        }

        if let Some(proto) = prototype {
            self.mark_as_prototype(proto);
        }
        self.transition_object(id, TransitionEdit::SetPrototype(prototype));
        tracing::debug!(target: "otter::structure", object = %id, "prototype reassigned");
        Ok(true)
    }

    /// `[[GetOwnProperty]]`. Proxies report their target's own property.
    pub fn get_own_property(
        &mut self,
        id: ObjectId,
        key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        let mut current = id;
        let mut depth = 0;
        while let Some(proxy) = self.object(current).as_proxy() {
            current = proxy
                .target()
                .ok_or_else(|| VmError::type_error("Cannot perform 'getOwnPropertyDescriptor' on a revoked proxy"))?;
            depth += 1;
            if depth > self.config.max_prototype_chain_length {
                return Err(self.chain_too_long());
            }
        }
        Ok(self.ordinary_get_own_property(current, key))
    }

    /// Own property keys in insertion order. Proxies report their target's.
    pub fn own_keys(&self, id: ObjectId) -> Vec<PropertyKey> {
        let mut current = id;
        while let Some(proxy) = self.object(current).as_proxy() {
            current = proxy.target_raw();
        }
        self.structures
            .get(self.structure_of(current))
            .own_keys()
            .to_vec()
    }

    /// `obj[key]`
    pub fn get_property(&mut self, id: ObjectId, key: &PropertyKey) -> VmResult<Value> {
        self.get(id, key, &Value::object(id))
    }

    /// `[[Get]]` with an explicit receiver
    pub fn get(&mut self, id: ObjectId, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
        let mut current = id;
        let mut depth = 0;
        loop {
            if self.is_proxy(current) {
                match proxy_operations::proxy_get_step(self, current, key, receiver)? {
                    ProxyStep::Trapped(value) => return Ok(value),
                    ProxyStep::Forward(target) => {
                        self.follow_link(&mut depth)?;
                        current = target;
                        continue;
                    }
                }
            }

            let record = self.object(current);
            if let Some(layout) = self.structures.layout_of(record.structure, key) {
                return match record.slot(layout.offset).cloned() {
                    Some(Slot::Accessor { get: Some(getter), .. }) => {
                        self.call(&getter, receiver.clone(), &[])
                    }
                    Some(Slot::Accessor { get: None, .. }) | None => Ok(Value::undefined()),
                    Some(Slot::Data(value)) => Ok(value),
                };
            }

            match self.ordinary_prototype_of(current) {
                Some(next) => {
                    self.follow_link(&mut depth)?;
                    current = next;
                }
                None => return Ok(Value::undefined()),
            }
        }
    }

    /// `value[key]` for any base value; primitives other than null and
    /// undefined read through `Object.prototype`.
    pub fn get_value(&mut self, base: &Value, key: &PropertyKey) -> VmResult<Value> {
        match base {
            Value::Object(id) => self.get(*id, key, base),
            Value::Undefined | Value::Null => Err(VmError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                base, key
            ))),
            _ => self.get(self.object_prototype, key, base),
        }
    }

    /// `obj[key] = value`
    pub fn set_property(&mut self, id: ObjectId, key: &PropertyKey, value: Value) -> VmResult<bool> {
        self.set(id, key, value, &Value::object(id))
    }

    /// `[[Set]]` with an explicit receiver
    pub fn set(
        &mut self,
        id: ObjectId,
        key: &PropertyKey,
        value: Value,
        receiver: &Value,
    ) -> VmResult<bool> {
        let mut current = id;
        let mut depth = 0;
        loop {
            if self.is_proxy(current) {
                match proxy_operations::proxy_set_step(self, current, key, &value, receiver)? {
                    ProxyStep::Trapped(success) => return Ok(success),
                    ProxyStep::Forward(target) => {
                        self.follow_link(&mut depth)?;
                        current = target;
                        continue;
                    }
                }
            }

            match self.ordinary_get_own_property(current, key) {
                Some(PropertyDescriptor::Data { attributes, .. }) => {
                    if !attributes.writable {
                        return Ok(false);
                    }
                    return self.set_on_receiver(key, value, receiver);
                }
                Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => {
                    self.call(&setter, receiver.clone(), &[value])?;
                    return Ok(true);
                }
                Some(PropertyDescriptor::Accessor { set: None, .. }) => return Ok(false),
                None => {}
            }

            match self.ordinary_prototype_of(current) {
                Some(next) => {
                    self.follow_link(&mut depth)?;
                    current = next;
                }
                None => return self.set_on_receiver(key, value, receiver),
            }
        }
    }

    fn set_on_receiver(&mut self, key: &PropertyKey, value: Value, receiver: &Value) -> VmResult<bool> {
        let Some(receiver) = receiver.as_object() else {
            return Ok(false);
        };
        match self.get_own_property(receiver, key)? {
            Some(existing) => {
                if existing.is_accessor() || !existing.is_writable() {
                    return Ok(false);
                }
                let desc = PropertyDescriptor::data_with_attrs(value, existing.attributes());
                self.define_property(receiver, key, desc)
            }
            None => self.define_property(receiver, key, PropertyDescriptor::data(value)),
        }
    }

    /// `[[HasProperty]]`
    pub fn has_property(&mut self, id: ObjectId, key: &PropertyKey) -> VmResult<bool> {
        let mut current = id;
        let mut depth = 0;
        loop {
            if self.is_proxy(current) {
                match proxy_operations::proxy_has_step(self, current, key)? {
                    ProxyStep::Trapped(found) => return Ok(found),
                    ProxyStep::Forward(target) => {
                        self.follow_link(&mut depth)?;
                        current = target;
                        continue;
                    }
                }
            }
            if self.structures.layout_of(self.structure_of(current), key).is_some() {
                return Ok(true);
            }
            match self.ordinary_prototype_of(current) {
                Some(next) => {
                    self.follow_link(&mut depth)?;
                    current = next;
                }
                None => return Ok(false),
            }
        }
    }

    /// `[[DefineOwnProperty]]`
    pub fn define_property(
        &mut self,
        id: ObjectId,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> VmResult<bool> {
        if self.is_proxy(id) {
            return proxy_operations::proxy_define_property(self, id, key, desc);
        }
        Ok(self.ordinary_define_own_property(id, key, desc))
    }

    /// `obj.__defineGetter__(key, getter)`
    pub fn define_getter(&mut self, id: ObjectId, key: &PropertyKey, getter: Value) -> VmResult<bool> {
        if !self.is_callable(&getter) {
            return Err(VmError::type_error("Object.prototype.__defineGetter__: Expecting function"));
        }
        self.define_property(id, key, PropertyDescriptor::accessor(Some(getter), None))
    }

    /// `[[Delete]]`. Deleting leaves a hole in the slot vector.
    pub fn delete_property(&mut self, id: ObjectId, key: &PropertyKey) -> VmResult<bool> {
        if self.is_proxy(id) {
            return proxy_operations::proxy_delete_property(self, id, key);
        }
        let Some(layout) = self.structures.layout_of(self.structure_of(id), key) else {
            return Ok(true);
        };
        if !layout.attributes.configurable {
            return Ok(false);
        }
        self.transition_object(id, TransitionEdit::RemoveProperty(key.clone()));
        self.write_slot(id, key, layout.offset, Slot::hole());
        Ok(true)
    }

    /// `[[IsExtensible]]`
    pub fn is_extensible(&mut self, id: ObjectId) -> VmResult<bool> {
        if let Some(proxy) = self.object(id).as_proxy() {
            let target = proxy
                .target()
                .ok_or_else(|| VmError::type_error("Cannot perform 'isExtensible' on a revoked proxy"))?;
            return self.is_extensible(target);
        }
        Ok(self.structures.get(self.structure_of(id)).is_extensible())
    }

    /// `[[PreventExtensions]]`
    pub fn prevent_extensions(&mut self, id: ObjectId) -> VmResult<bool> {
        if let Some(proxy) = self.object(id).as_proxy() {
            let target = proxy
                .target()
                .ok_or_else(|| VmError::type_error("Cannot perform 'preventExtensions' on a revoked proxy"))?;
            return self.prevent_extensions(target);
        }
        self.transition_object(id, TransitionEdit::PreventExtensions);
        Ok(true)
    }
}

/// ValidateAndApplyPropertyDescriptor for a non-configurable current
/// property, restricted to full descriptors.
fn compatible_with_non_configurable(current: &PropertyDescriptor, desc: &PropertyDescriptor) -> bool {
    let (current_attrs, attrs) = (current.attributes(), desc.attributes());
    if attrs.configurable || attrs.enumerable != current_attrs.enumerable {
        return false;
    }
    match (current, desc) {
        (
            PropertyDescriptor::Data { value: current_value, attributes: current_attrs },
            PropertyDescriptor::Data { value, attributes },
        ) => current_attrs.writable || (!attributes.writable && value.same_value(current_value)),
        (
            PropertyDescriptor::Accessor { get: current_get, set: current_set, .. },
            PropertyDescriptor::Accessor { get, set, .. },
        ) => same_function(current_get, get) && same_function(current_set, set),
        _ => false,
    }
}

fn same_function(a: &Option<Value>, b: &Option<Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_value(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PropertyKey {
        PropertyKey::string(s)
    }

    #[test]
    fn test_intrinsics() {
        let mut realm = Realm::new();
        let op = realm.object_prototype();
        let fp = realm.function_prototype();
        assert_eq!(realm.get_prototype_of(op).unwrap(), None);
        assert_eq!(realm.get_prototype_of(fp).unwrap(), Some(op));
        assert!(realm.is_callable(&Value::object(fp)));
        assert!(realm.object(op).is_prototype());
    }

    #[test]
    fn test_same_history_same_structure() {
        let mut realm = Realm::new();
        let a = realm.create_object();
        let b = realm.create_object();
        realm.set_property(a, &key("x"), Value::int32(1)).unwrap();
        realm.set_property(b, &key("x"), Value::int32(2)).unwrap();
        assert_eq!(realm.structure_of(a), realm.structure_of(b));

        realm.set_property(b, &key("y"), Value::int32(3)).unwrap();
        assert_ne!(realm.structure_of(a), realm.structure_of(b));
    }

    #[test]
    fn test_overwrite_keeps_structure() {
        let mut realm = Realm::new();
        let a = realm.create_object();
        realm.set_property(a, &key("x"), Value::int32(1)).unwrap();
        let before = realm.structure_of(a);
        realm.set_property(a, &key("x"), Value::int32(2)).unwrap();
        assert_eq!(realm.structure_of(a), before);
        assert_eq!(realm.get_property(a, &key("x")).unwrap(), Value::int32(2));
    }

    #[test]
    fn test_delete_leaves_hole_and_readd_gets_new_slot() {
        let mut realm = Realm::new();
        let a = realm.create_object();
        realm.set_property(a, &key("x"), Value::int32(1)).unwrap();
        realm.set_property(a, &key("y"), Value::int32(2)).unwrap();
        assert!(realm.delete_property(a, &key("x")).unwrap());

        let s = realm.structures().get(realm.structure_of(a));
        assert_eq!(s.slot_count(), 2);
        assert_eq!(s.property_count(), 1);
        assert_eq!(realm.get_property(a, &key("x")).unwrap(), Value::undefined());

        realm.set_property(a, &key("x"), Value::int32(9)).unwrap();
        let layout = realm.structures().layout_of(realm.structure_of(a), &key("x")).unwrap();
        assert_eq!(layout.offset, 2);
        assert_eq!(realm.own_keys(a), vec![key("y"), key("x")]);
    }

    #[test]
    fn test_prototype_gets_private_structure() {
        let mut realm = Realm::new();
        let a = realm.create_object();
        let b = realm.create_object();
        realm.set_property(a, &key("x"), Value::int32(1)).unwrap();
        realm.set_property(b, &key("x"), Value::int32(1)).unwrap();
        assert_eq!(realm.structure_of(a), realm.structure_of(b));

        let _child = realm.create_object_with_prototype(Some(a));
        assert_ne!(realm.structure_of(a), realm.structure_of(b));
        assert_eq!(realm.structures().get(realm.structure_of(a)).unique_to(), Some(a));
    }

    #[test]
    fn test_get_walks_prototype_and_calls_getter_with_receiver() {
        let mut realm = Realm::new();
        let proto = realm.create_object();
        let getter = realm.create_function("get", |realm, this, _| {
            let this = this.as_object().unwrap();
            realm.get_property(this, &PropertyKey::string("base"))
        });
        realm.define_getter(proto, &key("derived"), Value::object(getter)).unwrap();

        let child = realm.create_object_with_prototype(Some(proto));
        realm.set_property(child, &key("base"), Value::int32(40)).unwrap();
        assert_eq!(realm.get_property(child, &key("derived")).unwrap(), Value::int32(40));
        assert!(realm.has_property(child, &key("derived")).unwrap());
        assert!(!realm.has_property(child, &key("missing")).unwrap());
    }

    #[test]
    fn test_set_respects_inherited_readonly() {
        let mut realm = Realm::new();
        let proto = realm.create_object();
        realm
            .define_property(
                proto,
                &key("ro"),
                PropertyDescriptor::data_with_attrs(Value::int32(1), PropertyAttributes::frozen()),
            )
            .unwrap();
        let child = realm.create_object_with_prototype(Some(proto));
        assert!(!realm.set_property(child, &key("ro"), Value::int32(2)).unwrap());
        assert_eq!(realm.get_property(child, &key("ro")).unwrap(), Value::int32(1));
    }

    #[test]
    fn test_set_prototype_rejects_cycles_and_non_extensible() {
        let mut realm = Realm::new();
        let a = realm.create_object();
        let b = realm.create_object_with_prototype(Some(a));
        assert!(!realm.set_prototype_of(a, Some(b)).unwrap());
        assert!(!realm.set_prototype_of(a, Some(a)).unwrap());

        let c = realm.create_object();
        realm.prevent_extensions(c).unwrap();
        assert!(!realm.is_extensible(c).unwrap());
        assert!(!realm.set_prototype_of(c, None).unwrap());
        assert!(realm.set_prototype_of(c, Some(realm.object_prototype())).unwrap());
        assert!(!realm.set_property(c, &key("new"), Value::int32(1)).unwrap());
    }

    #[test]
    fn test_non_configurable_cannot_be_deleted_or_redefined() {
        let mut realm = Realm::new();
        let a = realm.create_object();
        realm
            .define_property(
                a,
                &key("k"),
                PropertyDescriptor::data_with_attrs(Value::int32(1), PropertyAttributes::frozen()),
            )
            .unwrap();
        assert!(!realm.delete_property(a, &key("k")).unwrap());
        assert!(!realm
            .define_property(a, &key("k"), PropertyDescriptor::data(Value::int32(2)))
            .unwrap());
        assert!(realm
            .define_property(
                a,
                &key("k"),
                PropertyDescriptor::data_with_attrs(Value::int32(1), PropertyAttributes::frozen()),
            )
            .unwrap());
    }

    #[test]
    fn test_construct_uses_prototype_property() {
        let mut realm = Realm::new();
        let ctor = realm.create_constructor("Foo", |realm, this, _| {
            let this = this.as_object().unwrap();
            realm.set_property(this, &PropertyKey::string("made"), Value::boolean(true))?;
            Ok(Value::undefined())
        });
        let instance = realm.construct(&Value::object(ctor), &[]).unwrap();
        let instance = instance.as_object().unwrap();
        let prototype = realm.get_property(ctor, &key("prototype")).unwrap();
        assert_eq!(Value::from_object(realm.get_prototype_of(instance).unwrap()), prototype);
        assert_eq!(realm.get_property(instance, &key("made")).unwrap(), Value::boolean(true));

        let back = realm
            .get_property(prototype.as_object().unwrap(), &key("constructor"))
            .unwrap();
        assert_eq!(back, Value::object(ctor));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut realm = Realm::with_config(RuntimeConfig {
            max_call_depth: 8,
            ..RuntimeConfig::default()
        });
        let f = realm.create_function("recurse", |realm, this, _| {
            let me = realm.get_value(this, &PropertyKey::string("self"))?;
            realm.call(&me, this.clone(), &[])
        });
        let holder = realm.create_object();
        realm.set_property(holder, &key("self"), Value::object(f)).unwrap();
        let err = realm
            .call(&Value::object(f), Value::object(holder), &[])
            .unwrap_err();
        assert!(matches!(err, VmError::StackOverflow));
    }

    #[test]
    fn test_cycle_through_trapless_proxy_is_range_error() {
        let mut realm = Realm::new();
        let o = realm.create_object();
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(o), &Value::object(handler))
            .unwrap();
        // The cycle check cannot see through the proxy
        assert!(realm.set_prototype_of(o, Some(proxy)).unwrap());

        let missing = key("missing");
        assert!(realm.get_property(o, &missing).unwrap_err().is_range_error());
        assert!(realm.has_property(o, &missing).unwrap_err().is_range_error());
        assert!(realm
            .set_property(o, &missing, Value::int32(1))
            .unwrap_err()
            .is_range_error());
        let site = realm.create_get_by_id_site(missing.clone());
        assert!(realm
            .get_by_id(site, &Value::object(o))
            .unwrap_err()
            .is_range_error());
        assert_eq!(realm.stats().trap_invocations, 0);

        // Own properties still resolve before the cycle is entered
        realm.define_own_data(o, &key("own"), Value::int32(2), PropertyAttributes::data());
        assert_eq!(realm.get_property(o, &key("own")).unwrap(), Value::int32(2));
        assert!(realm.has_property(o, &key("own")).unwrap());
    }

    #[test]
    fn test_trapless_proxy_chain_forwards_get_set_has() {
        let mut realm = Realm::new();
        let base = realm.create_object();
        realm.set_property(base, &key("x"), Value::int32(1)).unwrap();
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(base), &Value::object(handler))
            .unwrap();
        let o = realm.create_object_with_prototype(Some(proxy));

        assert_eq!(realm.get_property(o, &key("x")).unwrap(), Value::int32(1));
        assert!(realm.has_property(o, &key("x")).unwrap());
        // [[Set]] forwarded with o as receiver defines on o, not on base
        assert!(realm.set_property(o, &key("y"), Value::int32(3)).unwrap());
        assert!(realm.get_own_property(o, &key("y")).unwrap().is_some());
        assert!(realm.get_own_property(base, &key("y")).unwrap().is_none());
    }

    #[test]
    fn test_get_value_on_primitives() {
        let mut realm = Realm::new();
        let op = realm.object_prototype();
        realm.set_property(op, &key("shared"), Value::int32(5)).unwrap();
        assert_eq!(
            realm.get_value(&Value::int32(1), &key("shared")).unwrap(),
            Value::int32(5)
        );
        assert!(realm.get_value(&Value::null(), &key("x")).unwrap_err().is_type_error());
    }

    #[test]
    fn test_proxy_creation_requires_objects() {
        let mut realm = Realm::new();
        let o = realm.create_object();
        assert!(realm.create_proxy(&Value::int32(1), &Value::object(o)).is_err());
        assert!(realm.create_proxy(&Value::object(o), &Value::null()).is_err());
    }

    #[test]
    fn test_calling_a_proxy_calls_its_target() {
        let mut realm = Realm::new();
        let f = realm.create_function("f", |_, _, args| Ok(args[0].clone()));
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(f), &Value::object(handler))
            .unwrap();
        assert!(realm.is_callable(&Value::object(proxy)));
        let r = realm
            .call(&Value::object(proxy), Value::undefined(), &[Value::int32(3)])
            .unwrap();
        assert_eq!(r, Value::int32(3));
    }
}
