//! # Otter VM Object
//!
//! Object model core for the Otter JavaScript runtime.
//!
//! ## Design Principles
//!
//! - **Hidden classes**: objects share immutable structures; adding,
//!   removing or reconfiguring a property moves the object along a
//!   transition graph
//! - **Watchpoints**: assumptions a cache cannot re-check on every hit are
//!   guarded by one-shot watchpoints, fired synchronously at the mutation
//! - **Inline caches**: per-site memo of property reads and `instanceof`
//!   results, Uninitialized → Monomorphic → Polymorphic → Megamorphic
//! - **Proxies**: traps run arbitrary re-entrant code; chains that cross a
//!   proxy are never cached
//!
//! ```
//! use otter_vm_object::{PropertyKey, Realm, Value};
//!
//! let mut realm = Realm::new();
//! let foo = realm.create_constructor("Foo", |_, _, _| Ok(Value::undefined()));
//! let instance = realm.construct(&Value::object(foo), &[]).unwrap();
//!
//! let site = realm.create_instance_of_site();
//! assert!(realm.instance_of(site, &instance, &Value::object(foo)).unwrap());
//!
//! let o = realm.create_object();
//! realm.set_property(o, &PropertyKey::string("f"), Value::int32(42)).unwrap();
//! let get_f = realm.create_get_by_id_site("f");
//! assert_eq!(realm.get_by_id(get_f, &Value::object(o)).unwrap(), Value::int32(42));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod has_instance;
pub mod inline_cache;
pub mod object;
mod property_access;
pub mod proxy;
pub mod proxy_operations;
pub mod realm;
pub mod stats;
pub mod structure;
pub mod value;
pub mod watchpoint;

pub use config::RuntimeConfig;
pub use error::{VmError, VmResult};
pub use has_instance::ChainWalk;
pub use inline_cache::{IcSiteId, InlineCacheState};
pub use object::{ObjectId, PropertyAttributes, PropertyDescriptor};
pub use proxy::ProxyTrap;
pub use realm::Realm;
pub use stats::RealmStats;
pub use structure::StructureId;
pub use value::{PropertyKey, SymbolId, Value};
pub use watchpoint::{WatchSubject, WatchpointKind};
