//! Structures (hidden classes) for property access optimization.
//!
//! A Structure describes the layout of an object: which keys it has, in
//! which slot each one lives, whether the slot holds data or an accessor
//! pair, and which object is the prototype. Structures are immutable once
//! created and shared by every object with the same history of edits.
//!
//! Structures live in an arena addressed by [`StructureId`]. Edges of the
//! transition graph are kept in a hash table keyed by `(source, edit)`, so
//! applying the same edit to the same structure always lands on the same
//! successor.

use rustc_hash::FxHashMap;

use crate::object::{ObjectId, PropertyAttributes};
use crate::value::PropertyKey;

/// Stable index of a structure in the [`StructureTable`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(pub(crate) u32);

impl StructureId {
    /// Index into the arena
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Data or accessor slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Slot holds a value
    Data,
    /// Slot holds a getter/setter pair
    Accessor,
}

/// Where and how a property is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyLayout {
    /// Slot offset in the object's slot vector
    pub offset: u32,
    /// Data or accessor
    pub kind: PropertyKind,
    /// Attributes
    pub attributes: PropertyAttributes,
}

/// An edit that moves an object from one structure to another
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransitionEdit {
    /// Add a new own property in a fresh slot
    AddProperty {
        /// Key
        key: PropertyKey,
        /// Data or accessor
        kind: PropertyKind,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Remove an own property; its slot becomes a hole
    RemoveProperty(PropertyKey),
    /// Change kind or attributes of an existing property, keeping its slot
    Reconfigure {
        /// Key
        key: PropertyKey,
        /// Data or accessor
        kind: PropertyKind,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Reassign the prototype
    SetPrototype(Option<ObjectId>),
    /// Mark non-extensible
    PreventExtensions,
    /// Give the object a structure of its own because it is now used as a
    /// prototype; every successor stays private to that object
    BecomePrototype(ObjectId),
}

/// An immutable object layout
#[derive(Debug)]
pub struct Structure {
    prototype: Option<ObjectId>,
    properties: FxHashMap<PropertyKey, PropertyLayout>,
    /// Keys in insertion order
    keys_ordered: Vec<PropertyKey>,
    /// Number of slots an object of this structure needs, holes included
    slot_count: u32,
    extensible: bool,
    unique_to: Option<ObjectId>,
}

impl Structure {
    fn root(prototype: Option<ObjectId>) -> Self {
        Self {
            prototype,
            properties: FxHashMap::default(),
            keys_ordered: Vec::new(),
            slot_count: 0,
            extensible: true,
            unique_to: None,
        }
    }

    /// The prototype every object of this structure has
    #[inline]
    pub fn prototype(&self) -> Option<ObjectId> {
        self.prototype
    }

    /// Layout of `key`, if present
    #[inline]
    pub fn get(&self, key: &PropertyKey) -> Option<PropertyLayout> {
        self.properties.get(key).copied()
    }

    /// Own keys in insertion order
    pub fn own_keys(&self) -> &[PropertyKey] {
        &self.keys_ordered
    }

    /// Number of live properties
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Number of slots, holes included
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Whether objects of this structure accept new properties
    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    /// The single object that can have this structure, if it is private
    pub fn unique_to(&self) -> Option<ObjectId> {
        self.unique_to
    }

    /// Builds the successor for `edit`, or None when the edit changes nothing.
    fn derive(&self, edit: &TransitionEdit) -> Option<Structure> {
        let mut next = Structure {
            prototype: self.prototype,
            properties: self.properties.clone(),
            keys_ordered: self.keys_ordered.clone(),
            slot_count: self.slot_count,
            extensible: self.extensible,
            unique_to: self.unique_to,
        };

        match edit {
            TransitionEdit::AddProperty {
                key,
                kind,
                attributes,
            }
            | TransitionEdit::Reconfigure {
                key,
                kind,
                attributes,
            } => match self.properties.get(key) {
                Some(existing) => {
                    if existing.kind == *kind && existing.attributes == *attributes {
                        return None;
                    }
                    next.properties.insert(
                        key.clone(),
                        PropertyLayout {
                            offset: existing.offset,
                            kind: *kind,
                            attributes: *attributes,
                        },
                    );
                }
                None => {
                    if matches!(edit, TransitionEdit::Reconfigure { .. }) {
                        return None;
                    }
                    next.properties.insert(
                        key.clone(),
                        PropertyLayout {
                            offset: self.slot_count,
                            kind: *kind,
                            attributes: *attributes,
                        },
                    );
                    next.keys_ordered.push(key.clone());
                    next.slot_count += 1;
                }
            },
            TransitionEdit::RemoveProperty(key) => {
                next.properties.remove(key)?;
                next.keys_ordered.retain(|k| k != key);
            }
            TransitionEdit::SetPrototype(prototype) => {
                if self.prototype == *prototype {
                    return None;
                }
                next.prototype = *prototype;
            }
            TransitionEdit::PreventExtensions => {
                if !self.extensible {
                    return None;
                }
                next.extensible = false;
            }
            TransitionEdit::BecomePrototype(owner) => {
                if self.unique_to.is_some() {
                    return None;
                }
                next.unique_to = Some(*owner);
            }
        }

        Some(next)
    }
}

/// Arena of structures plus the transition graph
#[derive(Debug, Default)]
pub struct StructureTable {
    structures: Vec<Structure>,
    transitions: FxHashMap<(StructureId, TransitionEdit), StructureId>,
    roots: FxHashMap<Option<ObjectId>, StructureId>,
}

impl StructureTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty structure with the given prototype, shared by every caller.
    pub fn root(&mut self, prototype: Option<ObjectId>) -> StructureId {
        if let Some(id) = self.roots.get(&prototype) {
            return *id;
        }
        let id = self.push(Structure::root(prototype));
        self.roots.insert(prototype, id);
        id
    }

    /// Get a structure
    ///
    /// Ids are only minted by this table, so lookups cannot miss.
    #[inline]
    pub fn get(&self, id: StructureId) -> &Structure {
        &self.structures[id.index()]
    }

    /// Structure reached by applying `edit` to `from`.
    ///
    /// Creates the successor on first use and reuses it afterwards. An edit
    /// that changes nothing returns `from` itself.
    pub fn transition(&mut self, from: StructureId, edit: TransitionEdit) -> StructureId {
        let key = (from, edit);
        if let Some(id) = self.transitions.get(&key) {
            return *id;
        }

        let Some(next) = self.get(from).derive(&key.1) else {
            return from;
        };
        let id = self.push(next);
        tracing::trace!(
            target: "otter::structure",
            from = from.0,
            to = id.0,
            edit = ?key.1,
            "structure transition created"
        );
        self.transitions.insert(key, id);
        id
    }

    /// Slot layout of `key` in `structure`, or None when absent.
    #[inline]
    pub fn layout_of(&self, structure: StructureId, key: &PropertyKey) -> Option<PropertyLayout> {
        self.get(structure).get(key)
    }

    /// Number of structures ever created
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// True when no structure exists yet
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    fn push(&mut self, structure: Structure) -> StructureId {
        let id = StructureId(self.structures.len() as u32);
        self.structures.push(structure);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(key: &str) -> TransitionEdit {
        TransitionEdit::AddProperty {
            key: PropertyKey::string(key),
            kind: PropertyKind::Data,
            attributes: PropertyAttributes::data(),
        }
    }

    #[test]
    fn test_root_is_shared_per_prototype() {
        let mut table = StructureTable::new();
        let a = table.root(None);
        let b = table.root(None);
        let c = table.root(Some(ObjectId(7)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get(c).prototype(), Some(ObjectId(7)));
    }

    #[test]
    fn test_transition_sharing() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let s1 = table.transition(root, add("x"));
        let s2 = table.transition(root, add("x"));
        assert_eq!(s1, s2);
        assert_ne!(root, s1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_offsets_follow_insertion() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let s1 = table.transition(root, add("f"));
        let s2 = table.transition(s1, add("g"));
        let key_f = PropertyKey::string("f");
        let key_g = PropertyKey::string("g");
        assert_eq!(table.layout_of(s2, &key_f).map(|l| l.offset), Some(0));
        assert_eq!(table.layout_of(s2, &key_g).map(|l| l.offset), Some(1));
        assert_eq!(table.layout_of(s1, &key_g), None);
        assert_eq!(table.get(s2).own_keys(), &[key_f, key_g]);
    }

    #[test]
    fn test_remove_leaves_hole() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let s1 = table.transition(root, add("f"));
        let s2 = table.transition(s1, TransitionEdit::RemoveProperty(PropertyKey::string("f")));
        assert_ne!(s1, s2);
        assert_eq!(table.get(s2).property_count(), 0);
        assert_eq!(table.get(s2).slot_count(), 1);

        let s3 = table.transition(s2, add("f"));
        assert_eq!(
            table.layout_of(s3, &PropertyKey::string("f")).map(|l| l.offset),
            Some(1)
        );
    }

    #[test]
    fn test_reconfigure_keeps_offset() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let s1 = table.transition(root, add("f"));
        let s2 = table.transition(
            s1,
            TransitionEdit::Reconfigure {
                key: PropertyKey::string("f"),
                kind: PropertyKind::Accessor,
                attributes: PropertyAttributes::accessor(),
            },
        );
        let layout = table.layout_of(s2, &PropertyKey::string("f")).unwrap();
        assert_eq!(layout.offset, 0);
        assert_eq!(layout.kind, PropertyKind::Accessor);
    }

    #[test]
    fn test_noop_edits_return_source() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let s1 = table.transition(root, add("f"));
        assert_eq!(table.transition(s1, add("f")), s1);
        assert_eq!(
            table.transition(root, TransitionEdit::RemoveProperty(PropertyKey::string("f"))),
            root
        );
        assert_eq!(table.transition(root, TransitionEdit::SetPrototype(None)), root);
        let frozen = table.transition(root, TransitionEdit::PreventExtensions);
        assert!(!table.get(frozen).is_extensible());
        assert_eq!(table.transition(frozen, TransitionEdit::PreventExtensions), frozen);
    }

    #[test]
    fn test_become_prototype_is_private() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let shared = table.transition(root, add("f"));
        let a = table.transition(shared, TransitionEdit::BecomePrototype(ObjectId(1)));
        let b = table.transition(shared, TransitionEdit::BecomePrototype(ObjectId(2)));
        assert_ne!(a, b);
        assert_eq!(table.get(a).unique_to(), Some(ObjectId(1)));

        let a2 = table.transition(a, add("g"));
        assert_eq!(table.get(a2).unique_to(), Some(ObjectId(1)));
        assert_eq!(
            table.transition(a2, TransitionEdit::BecomePrototype(ObjectId(1))),
            a2
        );
    }

    #[test]
    fn test_set_prototype_transition() {
        let mut table = StructureTable::new();
        let root = table.root(None);
        let s1 = table.transition(root, add("f"));
        let s2 = table.transition(s1, TransitionEdit::SetPrototype(Some(ObjectId(3))));
        assert_eq!(table.get(s2).prototype(), Some(ObjectId(3)));
        assert_ne!(s2, s1);
        assert!(table.layout_of(s2, &PropertyKey::string("f")).is_some());
    }
}
