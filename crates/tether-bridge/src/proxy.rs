//! Object proxies
//!
//! An `ObjectProxy` stands in for one object living in the foreign runtime.
//! Member access resolves in a fixed order, and the first step that claims
//! the name wins:
//!
//! 1. the property descriptor table, dispatched by the descriptor's kind
//! 2. the attached local instance, if any
//! 3. the proxy's own property bag
//!
//! Calls go through the member table, keyed by name plus the classified tags
//! of the arguments.
//!
//! Proxies are cheap handles over a shared inner object. When the last handle
//! goes away the foreign runtime is told to release the object, unless
//! `dispose` already did it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tether_types::{MemberKey, MemberSignature, PropertyKind};

use crate::bridge::Session;
use crate::collections::{CollectionAdapter, IterableAdapter, MapAdapter};
use crate::error::{BridgeError, Result};
use crate::runtime::ObjectShape;
use crate::value::{ForeignHandle, Value};

pub type Getter = Arc<dyn Fn() -> Result<Value> + Send + Sync>;
pub type Setter = Arc<dyn Fn(Value) -> Result<()> + Send + Sync>;
pub type MemberFn = Arc<dyn Fn(CallArgs) -> Result<Value> + Send + Sync>;

/// A typed property: its kind decides how values are converted on the way in
/// and out. Getter and setter always agree on the kind.
#[derive(Clone)]
pub enum PropertyDescriptor {
    /// One of the eight primitives, or `string`
    Primitive {
        kind: PropertyKind,
        get: Getter,
        set: Setter,
    },
    Object {
        get: Getter,
        set: Setter,
    },
    Array {
        get: Getter,
        set: Setter,
    },
}

impl PropertyDescriptor {
    pub fn new<G, S>(kind: PropertyKind, get: G, set: S) -> Self
    where
        G: Fn() -> Result<Value> + Send + Sync + 'static,
        S: Fn(Value) -> Result<()> + Send + Sync + 'static,
    {
        let get: Getter = Arc::new(get);
        let set: Setter = Arc::new(set);
        match kind {
            PropertyKind::Object => PropertyDescriptor::Object { get, set },
            PropertyKind::Array => PropertyDescriptor::Array { get, set },
            kind => PropertyDescriptor::Primitive { kind, get, set },
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyDescriptor::Primitive { kind, .. } => *kind,
            PropertyDescriptor::Object { .. } => PropertyKind::Object,
            PropertyDescriptor::Array { .. } => PropertyKind::Array,
        }
    }

    fn getter(&self) -> &Getter {
        match self {
            PropertyDescriptor::Primitive { get, .. }
            | PropertyDescriptor::Object { get, .. }
            | PropertyDescriptor::Array { get, .. } => get,
        }
    }

    fn setter(&self) -> &Setter {
        match self {
            PropertyDescriptor::Primitive { set, .. }
            | PropertyDescriptor::Object { set, .. }
            | PropertyDescriptor::Array { set, .. } => set,
        }
    }

    /// Bring a value to this descriptor's kind
    fn coerce(&self, value: &Value) -> Result<Value> {
        let kind = self.kind();
        if kind.is_primitive() || !value.fits(kind) {
            value.convert(kind)
        } else {
            Ok(value.clone())
        }
    }

    pub fn read(&self) -> Result<Value> {
        let raw = (self.getter())()?;
        self.coerce(&raw)
    }

    pub fn write(&self, value: &Value) -> Result<()> {
        let converted = self.coerce(value)?;
        (self.setter())(converted)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Arguments handed to a bound member.
///
/// A call without arguments passes `NoArguments`, never an empty `Packed`;
/// callbacks are allowed to tell the two apart.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    NoArguments,
    Packed(Vec<Value>),
}

impl CallArgs {
    pub fn pack(args: &[Value]) -> CallArgs {
        if args.is_empty() {
            CallArgs::NoArguments
        } else {
            CallArgs::Packed(args.to_vec())
        }
    }

    pub fn as_slice(&self) -> &[Value] {
        match self {
            CallArgs::NoArguments => &[],
            CallArgs::Packed(args) => args,
        }
    }

    pub fn is_no_arguments(&self) -> bool {
        matches!(self, CallArgs::NoArguments)
    }
}

/// Outcome of `invoke_member`
#[derive(Debug, Clone)]
pub enum Dispatch {
    Returned(Value),
    /// No member is bound under the call's signature
    NotHandled,
    /// The bound member failed; the failure has been logged
    Failed(BridgeError),
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        !matches!(self, Dispatch::NotHandled)
    }

    /// Returned value, or null for the other outcomes
    pub fn into_value(self) -> Value {
        match self {
            Dispatch::Returned(value) => value,
            Dispatch::NotHandled | Dispatch::Failed(_) => Value::Null,
        }
    }
}

/// Where `try_set_member` stored the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSlot {
    Descriptor,
    Instance,
    Bag,
}

/// Local state wrapped by a proxy and consulted when no descriptor matches
pub trait LocalInstance: Send + Sync {
    /// `Ok(None)` when the instance has no such member
    fn get_member(&self, name: &str) -> Result<Option<Value>>;

    /// `Ok(false)` when the instance has no such member
    fn set_member(&self, name: &str, value: &Value) -> Result<bool>;
}

/// What a class's signatures produce before the proxy exists
#[derive(Default)]
pub(crate) struct ClassLayout {
    pub properties: Vec<(String, PropertyDescriptor)>,
    pub members: Vec<(MemberKey, MemberFn)>,
    pub constructors: Vec<MemberSignature>,
}

struct PropertySlot {
    seq: u64,
    descriptor: PropertyDescriptor,
}

pub(crate) struct ProxyInner {
    handle: ForeignHandle,
    shape: ObjectShape,
    token: u64,
    session: Arc<Session>,
    properties: DashMap<String, PropertySlot>,
    members: DashMap<MemberKey, MemberFn>,
    bag: DashMap<String, Value>,
    instance: OnceCell<Arc<dyn LocalInstance>>,
    constructors: Vec<MemberSignature>,
    next_seq: AtomicU64,
}

impl ProxyInner {
    pub(crate) fn new(
        handle: ForeignHandle,
        shape: ObjectShape,
        token: u64,
        session: Arc<Session>,
        layout: ClassLayout,
    ) -> Self {
        let inner = Self {
            handle,
            shape,
            token,
            session,
            properties: DashMap::new(),
            members: layout.members.into_iter().collect(),
            bag: DashMap::new(),
            instance: OnceCell::new(),
            constructors: layout.constructors,
            next_seq: AtomicU64::new(0),
        };
        for (name, descriptor) in layout.properties {
            inner.define(name, descriptor);
        }
        inner
    }

    fn define(&self, name: String, descriptor: PropertyDescriptor) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        // redefinition keeps the original position
        self.properties
            .entry(name)
            .and_modify(|slot| slot.descriptor = descriptor.clone())
            .or_insert(PropertySlot { seq, descriptor });
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        self.session.finalize_proxy(self.handle.identity, self.token);
    }
}

#[derive(Clone)]
pub struct ObjectProxy {
    inner: Arc<ProxyInner>,
}

impl ObjectProxy {
    pub(crate) fn from_inner(inner: Arc<ProxyInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    pub fn identity(&self) -> i32 {
        self.inner.handle.identity
    }

    pub fn class_name(&self) -> &str {
        &self.inner.handle.class_name
    }

    pub fn foreign_handle(&self) -> &ForeignHandle {
        &self.inner.handle
    }

    pub fn shape(&self) -> ObjectShape {
        self.inner.shape
    }

    pub fn constructors(&self) -> &[MemberSignature] {
        &self.inner.constructors
    }

    /// Whether both handles point at the same proxy instance
    pub fn ptr_eq(a: &ObjectProxy, b: &ObjectProxy) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Descriptor names in definition order
    pub fn property_names(&self) -> Vec<String> {
        let mut named: Vec<(u64, String)> = self
            .inner
            .properties
            .iter()
            .map(|slot| (slot.value().seq, slot.key().clone()))
            .collect();
        named.sort_unstable_by_key(|(seq, _)| *seq);
        named.into_iter().map(|(_, name)| name).collect()
    }

    pub fn property(&self, name: &str) -> Option<PropertyDescriptor> {
        self.inner
            .properties
            .get(name)
            .map(|slot| slot.descriptor.clone())
    }

    /// Install or replace a descriptor. Concurrent definitions of the same
    /// name are last-writer-wins.
    pub fn define_property(&self, name: impl Into<String>, descriptor: PropertyDescriptor) {
        self.inner.define(name.into(), descriptor);
    }

    pub fn bind_member<F>(&self, key: MemberKey, callback: F)
    where
        F: Fn(CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.inner.members.insert(key, Arc::new(callback));
    }

    pub fn has_member(&self, key: &MemberKey) -> bool {
        self.inner.members.contains_key(key)
    }

    /// Attach the local instance used as the second resolution step.
    /// Returns `false` if one is already attached.
    pub fn attach_instance(&self, instance: Arc<dyn LocalInstance>) -> bool {
        self.inner.instance.set(instance).is_ok()
    }

    /// Read a member; unresolved names and failures both read as null
    pub fn get_member(&self, name: &str) -> Value {
        match self.try_get_member(name) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to read '{}' on {}: {}", name, self, e);
                Value::Null
            }
        }
    }

    pub fn try_get_member(&self, name: &str) -> Result<Value> {
        // clone out so the shard lock is not held across the foreign call
        if let Some(descriptor) = self.property(name) {
            return descriptor.read();
        }

        if let Some(instance) = self.inner.instance.get() {
            match instance.get_member(name) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => log::trace!("Instance lookup of '{}' on {} fell through: {}", name, self, e),
            }
        }

        Ok(self
            .inner
            .bag
            .get(name)
            .map(|value| value.clone())
            .unwrap_or(Value::Null))
    }

    /// Write a member; returns `false` (and logs) if the write failed
    pub fn set_member(&self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        match self.try_set_member(name, value) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Failed to write '{}' on {}: {}", name, self, e);
                false
            }
        }
    }

    pub fn try_set_member(&self, name: &str, value: Value) -> Result<MemberSlot> {
        if let Some(descriptor) = self.property(name) {
            descriptor.write(&value)?;
            return Ok(MemberSlot::Descriptor);
        }

        if let Some(instance) = self.inner.instance.get() {
            match instance.set_member(name, &value) {
                Ok(true) => return Ok(MemberSlot::Instance),
                Ok(false) => {}
                Err(e) => log::trace!("Instance write of '{}' on {} fell through: {}", name, self, e),
            }
        }

        self.inner.bag.insert(name.to_string(), value);
        Ok(MemberSlot::Bag)
    }

    /// Member key a call with these arguments resolves to
    pub fn signature_of(&self, name: &str, args: &[Value]) -> MemberKey {
        let runtime = &self.inner.session.runtime;
        MemberKey::new(name, args.iter().map(|arg| runtime.classify(arg)).collect())
    }

    pub fn invoke_member(&self, name: &str, args: &[Value]) -> Dispatch {
        let key = self.signature_of(name, args);
        let callback = match self.inner.members.get(&key) {
            Some(callback) => Arc::clone(callback.value()),
            None => {
                log::debug!("No member {} on {}", key, self);
                return Dispatch::NotHandled;
            }
        };

        match callback(CallArgs::pack(args)) {
            Ok(value) => Dispatch::Returned(value),
            Err(e) => {
                log::error!(
                    "Call to {} on {} failed: {} (args: {})",
                    key,
                    self,
                    e,
                    self.inner.session.render_args(args)
                );
                Dispatch::Failed(e)
            }
        }
    }

    /// Call a member and take its result; null when unbound or failed
    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        self.invoke_member(name, args).into_value()
    }

    /// Call a member that is expected to exist
    pub fn try_call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.invoke_member(name, args) {
            Dispatch::Returned(value) => Ok(value),
            Dispatch::NotHandled => Err(BridgeError::MissingMember {
                handle: self.identity(),
                member: self.signature_of(name, args).to_string(),
            }),
            Dispatch::Failed(e) => Err(e),
        }
    }

    /// Foreign `equals`, falling back to comparing identities when the
    /// foreign side cannot answer
    pub fn equals(&self, other: &Value) -> bool {
        match self.invoke_member("equals", &[Value::erased(other.clone())]) {
            Dispatch::Returned(result) => match result.as_bool() {
                Some(equal) => return equal,
                None => log::warn!("equals on {} returned {:?}, comparing identities", self, result),
            },
            Dispatch::NotHandled | Dispatch::Failed(_) => {
                log::debug!("equals not answered by {}, comparing identities", self)
            }
        }
        self.identity_equals(other)
    }

    fn identity_equals(&self, other: &Value) -> bool {
        if let Some(identity) = other.foreign_identity() {
            return identity == self.identity();
        }
        if other.is_null() {
            return false;
        }
        match self.inner.session.runtime.resolve_identity(other, false) {
            Ok(identity) => identity == self.identity(),
            Err(e) => {
                log::debug!("Cannot resolve identity of {:?}: {}", other, e);
                false
            }
        }
    }

    /// Always the foreign identity
    pub fn hash_code(&self) -> i32 {
        self.identity()
    }

    /// `Class(identity): <foreign toString>`, or the plain form if the
    /// foreign side cannot render itself
    pub fn describe(&self) -> String {
        match self.invoke_member("toString", &[]) {
            Dispatch::Returned(Value::Str(text)) => format!("{}: {}", self, text),
            _ => self.to_string(),
        }
    }

    /// Release the foreign object now. Later drops of this proxy are no-ops.
    /// Returns `false` if it was already released.
    pub fn dispose(&self) -> bool {
        self.inner
            .session
            .release_registration(self.identity(), self.inner.token())
    }

    /// Keep this proxy registered and alive until the guard is dropped
    pub fn hold(&self) -> HoldGuard {
        let session = Arc::clone(&self.inner.session);
        let token = self.inner.token();
        session.proxies.hold(self.identity(), token, Arc::clone(&self.inner));
        log::trace!("Holding {}", self);
        HoldGuard {
            session,
            identity: self.identity(),
            token,
        }
    }

    pub fn as_iterable(&self) -> Option<IterableAdapter> {
        match self.shape() {
            ObjectShape::Iterable | ObjectShape::Collection => Some(IterableAdapter::new(self.clone())),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<CollectionAdapter> {
        match self.shape() {
            ObjectShape::Collection => Some(CollectionAdapter::new(self.clone())),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<MapAdapter> {
        match self.shape() {
            ObjectShape::Map => Some(MapAdapter::new(self.clone())),
            _ => None,
        }
    }
}

impl PartialEq for ObjectProxy {
    fn eq(&self, other: &ObjectProxy) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ObjectProxy {}

impl Hash for ObjectProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for ObjectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class_name(), self.identity())
    }
}

impl fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("class_name", &self.class_name())
            .field("identity", &self.identity())
            .field("shape", &self.shape())
            .finish()
    }
}

/// Pins a proxy in the registry's strong set. Only ever releases its own pin.
pub struct HoldGuard {
    session: Arc<Session>,
    identity: i32,
    token: u64,
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        self.session.proxies.unhold(self.identity, self.token);
        log::trace!("Released hold on {}", self.identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandleState;
    use crate::test_support::{init_logging, MockRuntime};
    use crate::Bridge;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tether_types::TypeTag;

    fn point_bridge() -> (Arc<MockRuntime>, Bridge, ObjectProxy) {
        init_logging();
        let runtime = MockRuntime::new();
        runtime.define_class(
            "geo.Point",
            &["C/geo.Point(II)", "F/x-I", "F/y-I", "F/label-Ljava/lang/String;", "S-F/ORIGIN-Lgeo/Point;", "M/bogus"],
        );
        let handle = runtime.plain("geo.Point", &[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let bridge = Bridge::new(runtime.clone());
        let proxy = bridge.register(handle);
        (runtime, bridge, proxy)
    }

    #[test]
    fn test_fields_become_descriptors() {
        let (_runtime, _bridge, proxy) = point_bridge();
        assert_eq!(proxy.property_names(), vec!["x", "y", "label", "ORIGIN"]);
        assert_eq!(proxy.property("x").unwrap().kind(), PropertyKind::Int);
        assert_eq!(proxy.property("label").unwrap().kind(), PropertyKind::String);
        assert_eq!(proxy.property("ORIGIN").unwrap().kind(), PropertyKind::Object);
        assert_eq!(proxy.constructors().len(), 1);
        assert_eq!(proxy.get_member("x"), Value::Int(1));
    }

    #[test]
    fn test_descriptor_set_converts_to_kind() {
        let (runtime, _bridge, proxy) = point_bridge();
        assert!(proxy.set_member("x", "42"));
        assert_eq!(proxy.get_member("x"), Value::Int(42));
        assert_eq!(runtime.field(proxy.identity(), "x"), Some(Value::Int(42)));

        assert!(proxy.set_member("label", 7));
        assert_eq!(proxy.get_member("label"), Value::Str("7".into()));
    }

    #[test]
    fn test_descriptor_set_rejects_incompatible_values() {
        let (runtime, _bridge, proxy) = point_bridge();
        assert!(!proxy.set_member("x", "not a number"));
        assert!(matches!(
            proxy.try_set_member("x", Value::Long(i64::MAX)),
            Err(BridgeError::Conversion { kind: PropertyKind::Int, .. })
        ));
        assert_eq!(runtime.field(proxy.identity(), "x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_unknown_names_go_to_the_bag() {
        let (runtime, _bridge, proxy) = point_bridge();
        assert_eq!(proxy.get_member("color"), Value::Null);
        assert_eq!(
            proxy.try_set_member("color", Value::Str("red".into())).unwrap(),
            MemberSlot::Bag
        );
        assert_eq!(proxy.get_member("color"), Value::Str("red".into()));
        assert_eq!(runtime.field(proxy.identity(), "color"), None);
    }

    struct Counter {
        hits: AtomicUsize,
        stored: Mutex<Option<Value>>,
    }

    impl LocalInstance for Counter {
        fn get_member(&self, name: &str) -> Result<Option<Value>> {
            match name {
                "hits" => Ok(Some(Value::Long(self.hits.fetch_add(1, Ordering::SeqCst) as i64))),
                "broken" => Err(BridgeError::Foreign("reflection failed".into())),
                _ => Ok(None),
            }
        }

        fn set_member(&self, name: &str, value: &Value) -> Result<bool> {
            match name {
                "stored" => {
                    *self.stored.lock().unwrap() = Some(value.clone());
                    Ok(true)
                }
                "broken" => Err(BridgeError::Foreign("reflection failed".into())),
                _ => Ok(false),
            }
        }
    }

    #[test]
    fn test_instance_sits_between_descriptors_and_bag() {
        let (_runtime, _bridge, proxy) = point_bridge();
        let counter = Arc::new(Counter {
            hits: AtomicUsize::new(0),
            stored: Mutex::new(None),
        });
        assert!(proxy.attach_instance(counter.clone()));
        assert!(!proxy.attach_instance(counter.clone()));

        assert_eq!(proxy.get_member("hits"), Value::Long(0));
        assert_eq!(proxy.get_member("x"), Value::Int(1));
        assert_eq!(proxy.try_set_member("stored", Value::Int(5)).unwrap(), MemberSlot::Instance);
        assert_eq!(*counter.stored.lock().unwrap(), Some(Value::Int(5)));

        // instance failures fall through silently
        assert_eq!(proxy.get_member("broken"), Value::Null);
        assert_eq!(proxy.try_set_member("broken", Value::Int(1)).unwrap(), MemberSlot::Bag);
        assert_eq!(proxy.get_member("broken"), Value::Int(1));
    }

    #[test]
    fn test_dispatch_keys_on_tags_not_values() {
        let (_runtime, _bridge, proxy) = point_bridge();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        proxy.bind_member(MemberKey::new("scale", vec![TypeTag::INT]), move |args| {
            sink.lock().unwrap().push(args.clone());
            Ok(Value::Str("int".into()))
        });
        proxy.bind_member(MemberKey::new("scale", vec![TypeTag::LONG]), |_| {
            Ok(Value::Str("long".into()))
        });

        assert_eq!(proxy.call("scale", &[Value::Int(2)]), Value::Str("int".into()));
        assert_eq!(proxy.call("scale", &[Value::Int(99)]), Value::Str("int".into()));
        assert_eq!(proxy.call("scale", &[Value::Long(2)]), Value::Str("long".into()));
        assert!(matches!(proxy.invoke_member("scale", &[Value::Double(2.0)]), Dispatch::NotHandled));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_zero_argument_calls_pass_the_marker() {
        let (_runtime, _bridge, proxy) = point_bridge();
        proxy.bind_member(MemberKey::nullary("ping"), |args| {
            Ok(Value::Bool(args.is_no_arguments()))
        });
        assert_eq!(proxy.call("ping", &[]), Value::Bool(true));
        assert_eq!(CallArgs::pack(&[Value::Null]), CallArgs::Packed(vec![Value::Null]));
    }

    #[test]
    fn test_failed_member_is_reported_not_raised() {
        let (_runtime, _bridge, proxy) = point_bridge();
        proxy.bind_member(MemberKey::nullary("explode"), |_| {
            Err(BridgeError::Foreign("remote exception".into()))
        });
        assert!(matches!(proxy.invoke_member("explode", &[]), Dispatch::Failed(_)));
        assert_eq!(proxy.call("explode", &[]), Value::Null);
        assert!(matches!(
            proxy.try_call("missing", &[Value::Int(1)]),
            Err(BridgeError::MissingMember { .. })
        ));
    }

    #[test]
    fn test_foreign_methods_are_bound_from_signatures() {
        init_logging();
        let runtime = MockRuntime::new();
        runtime.define_class("app.Greeter", &["M/greet(Ljava/lang/String;)Ljava/lang/String;"]);
        runtime.define_method("app.Greeter", "greet", |args| {
            Ok(Value::Str(format!("hello {}", args[0])))
        });
        let bridge = Bridge::new(runtime.clone());
        let proxy = bridge.register(runtime.plain("app.Greeter", &[]));

        assert_eq!(proxy.call("greet", &[Value::Str("ada".into())]), Value::Str("hello ada".into()));
        assert!(!proxy.invoke_member("greet", &[Value::Int(1)]).is_handled());
    }

    #[test]
    fn test_equals_and_hash_use_identity() {
        let (runtime, bridge, proxy) = point_bridge();
        let other = bridge.register(runtime.plain("geo.Point", &[]));
        assert!(proxy.equals(&Value::Object(proxy.clone())));
        assert!(!proxy.equals(&Value::Object(other.clone())));
        assert!(proxy.equals(&Value::Int(proxy.identity())));
        assert!(!proxy.equals(&Value::Null));
        assert_eq!(proxy.hash_code(), proxy.identity());
        assert_ne!(proxy, other);
    }

    #[test]
    fn test_equals_prefers_foreign_answer() {
        init_logging();
        let runtime = MockRuntime::new();
        runtime.define_class("app.Always", &["M/equals(Ljava/lang/Object;)Z"]);
        runtime.define_method("app.Always", "equals", |_| Ok(Value::Bool(true)));
        let bridge = Bridge::new(runtime.clone());
        let proxy = bridge.register(runtime.plain("app.Always", &[]));
        assert!(proxy.equals(&Value::Str("anything".into())));
    }

    #[test]
    fn test_describe() {
        let (runtime, bridge, proxy) = point_bridge();
        assert_eq!(proxy.describe(), format!("geo.Point({})", proxy.identity()));

        runtime.define_class("app.Named", &["M/toString()Ljava/lang/String;"]);
        runtime.define_method("app.Named", "toString", |_| Ok(Value::Str("named!".into())));
        let named = bridge.register(runtime.plain("app.Named", &[]));
        assert_eq!(named.describe(), format!("app.Named({}): named!", named.identity()));
    }

    #[test]
    fn test_hold_pins_the_proxy() {
        let (runtime, bridge, proxy) = point_bridge();
        let identity = proxy.identity();
        let guard = proxy.hold();
        drop(proxy);
        assert_eq!(bridge.state(identity), HandleState::StronglyHeld);
        assert!(runtime.released().is_empty());
        drop(guard);
        assert_eq!(bridge.state(identity), HandleState::Untracked);
        assert_eq!(runtime.released(), vec![identity]);
    }

    #[test]
    fn test_stale_hold_leaves_new_registration_pinned() {
        init_logging();
        let runtime = MockRuntime::new();
        let bridge = Bridge::new(runtime.clone());
        let handle = runtime.plain("app.Thing", &[]);
        let identity = handle.identity;

        let first = bridge.register(handle.clone());
        let first_guard = first.hold();
        assert!(first.dispose());
        drop(first);

        let second = bridge.register(handle);
        let second_guard = second.hold();
        drop(second);
        drop(first_guard);

        assert_eq!(bridge.state(identity), HandleState::StronglyHeld);
        assert!(bridge.proxy(identity).is_some());
        assert_eq!(runtime.released(), vec![identity]);
        drop(second_guard);
        assert_eq!(bridge.state(identity), HandleState::Untracked);
        assert_eq!(runtime.released(), vec![identity, identity]);
    }

    #[test]
    fn test_hold_from_before_shutdown_does_not_unpin_later_hold() {
        init_logging();
        let runtime = MockRuntime::new();
        let bridge = Bridge::new(runtime.clone());
        let handle = runtime.plain("app.Thing", &[]);
        let identity = handle.identity;

        let stale = bridge.register(handle.clone()).hold();
        assert_eq!(bridge.shutdown(), 1);

        let fresh = bridge.register(handle);
        let fresh_guard = fresh.hold();
        drop(fresh);
        drop(stale);

        assert_eq!(bridge.state(identity), HandleState::StronglyHeld);
        assert_eq!(runtime.released(), vec![identity]);
        drop(fresh_guard);
        assert_eq!(runtime.released(), vec![identity, identity]);
    }
}
