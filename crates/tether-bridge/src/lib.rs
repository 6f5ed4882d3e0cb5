//! Object bridge between a local process and a foreign managed runtime
//!
//! This crate lets local code work with objects living in a foreign virtual
//! machine as if they were local values:
//! - proxies that read properties and call methods through the foreign runtime
//! - a handle registry that releases each foreign object exactly once
//! - trampolines that turn foreign function handles into callable delegates
//! - iterable, collection and map views over foreign containers
//! - a write-only JSON projection of proxies
//!
//! Everything goes through a `ForeignRuntime` implementation supplied by the
//! embedding layer, and every call into it blocks the calling thread.

pub mod bridge;
pub mod catalog;
pub mod collections;
pub mod config;
pub mod error;
pub mod json;
pub mod proxy;
pub mod registry;
pub mod runtime;
pub mod trampoline;
pub mod tuple;
pub mod value;

#[cfg(test)]
mod test_support;

pub use bridge::Bridge;
pub use catalog::{CatalogRoot, DelegateCatalog, DelegateShape, ModuleInfo};
pub use collections::{CollectionAdapter, IterableAdapter, MapAdapter, MapEntries, ProxyEnumerator};
pub use config::{load_config, BridgeConfig, MapLayout, ResetMode};
pub use error::{BridgeError, Result};
pub use json::{JsonTextWriter, JsonWriter, StructuralSerializer};
pub use proxy::{CallArgs, Dispatch, HoldGuard, LocalInstance, MemberSlot, ObjectProxy, PropertyDescriptor};
pub use registry::HandleState;
pub use runtime::{FieldRef, ForeignRuntime, MethodRef, ObjectShape};
pub use trampoline::{ArgList, Binding, Thunk, Trampoline, TypedCallback};
pub use tuple::TupleAdapter;
pub use value::{ForeignHandle, FromValue, IntoValue, Value};

pub use tether_types::{MemberKey, PropertyKind, TypeTag};
