//! The bridge session
//!
//! A `Bridge` owns everything one embedding session needs: the foreign
//! runtime, the configuration, the proxy and trampoline tables and the
//! delegate catalog. Proxies and trampolines keep the session alive through
//! a shared reference, so several independent bridges can coexist.
//!
//! ## Lifecycle
//!
//! The first time a foreign identity is seen, a proxy is built from the
//! class's member signatures and registered weakly. Every later sighting of
//! the same identity returns that proxy for as long as it is alive. When the
//! last local reference goes away (or on `dispose`/`release`), the entry is
//! removed and the foreign side is notified exactly once.

use std::fmt;
use std::sync::Arc;

use tether_types::{parse_class_signatures, MemberKey, MemberSignature, PropertyKind};

use crate::catalog::DelegateCatalog;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::json::StructuralSerializer;
use crate::proxy::{CallArgs, ClassLayout, LocalInstance, MemberFn, ObjectProxy, PropertyDescriptor, ProxyInner};
use crate::registry::{HandleState, Published, WeakTable};
use crate::runtime::{FieldRef, ForeignRuntime, MethodRef};
use crate::trampoline::{Trampoline, TrampolineInner};
use crate::tuple::{tuple_arity, TupleAdapter};
use crate::value::{ForeignHandle, Value};

pub(crate) struct Session {
    pub(crate) runtime: Arc<dyn ForeignRuntime>,
    pub(crate) config: BridgeConfig,
    pub(crate) proxies: WeakTable<ProxyInner>,
    pub(crate) trampolines: WeakTable<TrampolineInner>,
    pub(crate) catalog: DelegateCatalog,
}

impl Session {
    /// Proxy for `handle`, reusing the live one if there is one
    pub(crate) fn wrap(self: &Arc<Self>, handle: ForeignHandle) -> ObjectProxy {
        let identity = handle.identity;
        if let Some(live) = self.proxies.lookup(identity) {
            return ObjectProxy::from_inner(live);
        }

        // building the layout talks to the foreign side, so no table lock is held
        let shape = self.runtime.shape_of(&handle);
        let layout = self.class_layout(&handle);
        let token = self.proxies.next_token();
        let candidate = Arc::new(ProxyInner::new(handle, shape, token, Arc::clone(self), layout));

        match self.proxies.publish(identity, token, &candidate) {
            Published::Inserted => {
                log::debug!("Registered proxy for {} ({:?})", identity, shape);
                ObjectProxy::from_inner(candidate)
            }
            Published::Replaced => {
                // the dying proxy's drop no longer finds its entry
                log::debug!("Registered proxy for {} over a finalizing one", identity);
                self.runtime.release_handle(identity);
                ObjectProxy::from_inner(candidate)
            }
            // the losing candidate's drop finds no entry of its own and stays silent
            Published::Existing(live) => ObjectProxy::from_inner(live),
        }
    }

    /// Turn raw handles into proxies (or tuples), recursing into arrays
    pub(crate) fn lift(self: &Arc<Self>, value: Value) -> Value {
        match value {
            Value::Handle(handle) => {
                let arity = tuple_arity(&handle.class_name);
                let proxy = self.wrap(handle);
                match arity {
                    Some(arity) => match TupleAdapter::read(proxy.clone(), arity) {
                        Ok(tuple) => Value::Tuple(tuple),
                        Err(e) => {
                            log::warn!("Failed to read tuple {}: {}", proxy, e);
                            Value::Object(proxy)
                        }
                    },
                    None => Value::Object(proxy),
                }
            }
            Value::Array(items) => Value::Array(items.into_iter().map(|item| self.lift(item)).collect()),
            Value::Erased(inner) => self.lift(*inner),
            other => other,
        }
    }

    /// Descriptors, member bindings and constructors from the class signatures
    fn class_layout(self: &Arc<Self>, handle: &ForeignHandle) -> ClassLayout {
        let mut layout = ClassLayout::default();
        let signatures = match self.runtime.class_signatures(&handle.class_name) {
            Ok(signatures) => signatures,
            Err(e) => {
                log::warn!("No signatures for {}: {}", handle.class_name, e);
                return layout;
            }
        };

        for parsed in parse_class_signatures(&signatures) {
            match parsed {
                Ok(MemberSignature::Field {
                    name,
                    descriptor,
                    is_static,
                }) => {
                    let Some(kind) = PropertyKind::from_descriptor(&descriptor) else {
                        log::warn!("Field {} of {} has no storable kind", name, handle.class_name);
                        continue;
                    };
                    let field = FieldRef {
                        name: name.clone(),
                        descriptor,
                        is_static,
                    };
                    layout
                        .properties
                        .push((name, self.field_descriptor(handle, field, kind)));
                }
                Ok(MemberSignature::Method {
                    name,
                    params,
                    returns,
                    is_static,
                }) => {
                    let method = MethodRef::new(name.clone(), &params, &returns, is_static);
                    layout
                        .members
                        .push((MemberKey::new(name, params), self.method_binding(handle, method)));
                }
                Ok(constructor @ MemberSignature::Constructor { .. }) => {
                    layout.constructors.push(constructor);
                }
                Err(e) => log::warn!("Skipping signature of {}: {}", handle.class_name, e),
            }
        }
        layout
    }

    fn field_descriptor(self: &Arc<Self>, handle: &ForeignHandle, field: FieldRef, kind: PropertyKind) -> PropertyDescriptor {
        let (reader, writer) = (Arc::clone(self), Arc::clone(self));
        let (read_target, write_target) = (handle.clone(), handle.clone());
        let read_field = field.clone();
        let write_field = field;

        PropertyDescriptor::new(
            kind,
            move || {
                let raw = reader.runtime.get_field(&read_target, &read_field)?;
                Ok(reader.lift(raw))
            },
            move |value| writer.runtime.set_field(&write_target, &write_field, &value),
        )
    }

    fn method_binding(self: &Arc<Self>, handle: &ForeignHandle, method: MethodRef) -> MemberFn {
        let session = Arc::clone(self);
        let target = handle.clone();
        Arc::new(move |args: CallArgs| {
            let raw = session
                .runtime
                .call_method(&target, &method, args.as_slice())
                .map_err(|e| BridgeError::invocation(target.identity, &method.name, &e))?;
            Ok(session.lift(raw))
        })
    }

    /// Drop path of a proxy: remove its own entry and notify once
    pub(crate) fn finalize_proxy(&self, identity: i32, token: u64) {
        if self.release_registration(identity, token) {
            log::trace!("Finalized proxy {}", identity);
        }
    }

    pub(crate) fn release_registration(&self, identity: i32, token: u64) -> bool {
        if !self.proxies.remove(identity, token) {
            return false;
        }
        log::debug!("Releasing foreign handle {}", identity);
        self.runtime.release_handle(identity);
        true
    }

    pub(crate) fn release_trampoline(&self, handle: i32, token: u64) -> bool {
        if !self.trampolines.remove(handle, token) {
            return false;
        }
        log::debug!("Releasing callback handle {}", handle);
        self.runtime.release_handle(handle);
        true
    }

    /// Arguments as they appear in failure logs
    pub(crate) fn render_args(&self, args: &[Value]) -> String {
        if self.config.logging.include_arguments {
            format!("{:?}", args)
        } else {
            format!("<{} argument(s)>", args.len())
        }
    }
}

/// One embedding session
#[derive(Clone)]
pub struct Bridge {
    session: Arc<Session>,
}

impl Bridge {
    pub fn new(runtime: Arc<dyn ForeignRuntime>) -> Self {
        Self::build(runtime, BridgeConfig::shared_default().clone())
    }

    pub fn with_config(runtime: Arc<dyn ForeignRuntime>, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(runtime, config))
    }

    fn build(runtime: Arc<dyn ForeignRuntime>, config: BridgeConfig) -> Self {
        Self {
            session: Arc::new(Session {
                runtime,
                config,
                proxies: WeakTable::new(),
                trampolines: WeakTable::new(),
                catalog: DelegateCatalog::new(),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.session.config
    }

    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.session.runtime
    }

    /// Modules and delegate shapes trampolines are resolved against
    pub fn catalog(&self) -> &DelegateCatalog {
        &self.session.catalog
    }

    /// Proxy for a handle surfaced by the embedding layer
    pub fn register(&self, handle: ForeignHandle) -> ObjectProxy {
        self.session.wrap(handle)
    }

    /// Like `register`, attaching `instance` unless the proxy already has one
    pub fn register_with_instance(&self, handle: ForeignHandle, instance: Arc<dyn LocalInstance>) -> ObjectProxy {
        let proxy = self.session.wrap(handle);
        if !proxy.attach_instance(instance) {
            log::debug!("{} already has a local instance", proxy);
        }
        proxy
    }

    /// Lift a raw value coming from the foreign side
    pub fn lift(&self, value: Value) -> Value {
        self.session.lift(value)
    }

    /// Live proxy for an identity
    pub fn proxy(&self, identity: i32) -> Option<ObjectProxy> {
        self.session.proxies.lookup(identity).map(ObjectProxy::from_inner)
    }

    pub fn state(&self, identity: i32) -> HandleState {
        self.session.proxies.state(identity)
    }

    /// Deterministically release an identity. Proxies still referring to it
    /// stay usable locally but no longer release anything when dropped.
    pub fn release(&self, identity: i32) -> bool {
        if !self.session.proxies.remove_any(identity) {
            return false;
        }
        log::debug!("Releasing foreign handle {}", identity);
        self.session.runtime.release_handle(identity);
        true
    }

    /// Registered proxy identities, including entries whose proxy is being dropped
    pub fn registered_proxies(&self) -> usize {
        self.session.proxies.len()
    }

    /// Bind a foreign function handle to the named local delegate shape.
    /// Resolution failures leave the trampoline inert.
    pub fn trampoline(&self, delegate: &str, handle: i32) -> Trampoline {
        Trampoline::bind(&self.session, delegate, handle)
    }

    /// Like `trampoline`, but resolution failures are returned
    pub fn try_trampoline(&self, delegate: &str, handle: i32) -> Result<Trampoline> {
        let trampoline = self.trampoline(delegate, handle);
        match trampoline.resolution_error() {
            Some(e) => Err(e.clone()),
            None => Ok(trampoline),
        }
    }

    pub fn trampoline_state(&self, handle: i32) -> HandleState {
        self.session.trampolines.state(handle)
    }

    pub fn serializer(&self) -> StructuralSerializer {
        StructuralSerializer::from_config(&self.session.config)
    }

    /// JSON text of a value, using the session's serializer settings
    pub fn to_json(&self, value: &Value) -> String {
        self.serializer().to_json(value)
    }

    /// Release every handle still registered. Returns how many were released.
    pub fn shutdown(&self) -> usize {
        let proxies = self.session.proxies.drain();
        let trampolines = self.session.trampolines.drain();
        for &handle in proxies.iter().chain(trampolines.iter()) {
            self.session.runtime.release_handle(handle);
        }
        let released = proxies.len() + trampolines.len();
        log::debug!("Bridge shut down, {} handle(s) released", released);
        released
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("proxies", &self.session.proxies.len())
            .field("trampolines", &self.session.trampolines.len())
            .field("config", &self.session.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{init_logging, MockRuntime};
    use std::sync::Barrier;
    use std::thread;

    fn setup() -> (Arc<MockRuntime>, Bridge) {
        init_logging();
        let runtime = MockRuntime::new();
        let bridge = Bridge::new(runtime.clone());
        (runtime, bridge)
    }

    #[test]
    fn test_same_identity_same_proxy() {
        let (runtime, bridge) = setup();
        let handle = runtime.plain("app.Thing", &[]);
        let a = bridge.register(handle.clone());
        let b = bridge.register(handle.clone());
        assert!(ObjectProxy::ptr_eq(&a, &b));
        assert_eq!(bridge.state(handle.identity), HandleState::WeaklyTracked);
        assert!(ObjectProxy::ptr_eq(&bridge.proxy(handle.identity).unwrap(), &a));
    }

    #[test]
    fn test_drop_releases_exactly_once() {
        let (runtime, bridge) = setup();
        let handle = runtime.plain("app.Thing", &[]);
        let proxy = bridge.register(handle.clone());
        let copy = proxy.clone();
        drop(proxy);
        assert!(runtime.released().is_empty());
        drop(copy);

        assert_eq!(runtime.released(), vec![handle.identity]);
        assert_eq!(bridge.state(handle.identity), HandleState::Untracked);
        assert!(!bridge.release(handle.identity));
        assert_eq!(runtime.released(), vec![handle.identity]);
    }

    #[test]
    fn test_dispose_then_drop_releases_once() {
        let (runtime, bridge) = setup();
        let handle = runtime.plain("app.Thing", &[]);
        let proxy = bridge.register(handle.clone());
        assert!(proxy.dispose());
        assert!(!proxy.dispose());
        assert_eq!(bridge.state(handle.identity), HandleState::Untracked);
        drop(proxy);
        assert_eq!(runtime.released(), vec![handle.identity]);
    }

    #[test]
    fn test_deterministic_release_then_drop() {
        let (runtime, bridge) = setup();
        let handle = runtime.plain("app.Thing", &[]);
        let proxy = bridge.register(handle.clone());
        assert!(bridge.release(handle.identity));
        drop(proxy);
        assert_eq!(runtime.released(), vec![handle.identity]);
    }

    #[test]
    fn test_reregistration_after_release_gets_a_fresh_proxy() {
        let (runtime, bridge) = setup();
        let handle = runtime.plain("app.Thing", &[]);
        let first = bridge.register(handle.clone());
        first.dispose();
        let second = bridge.register(handle.clone());
        assert!(!ObjectProxy::ptr_eq(&first, &second));
        // the old proxy's drop must not release the new registration
        drop(first);
        assert_eq!(bridge.state(handle.identity), HandleState::WeaklyTracked);
        drop(second);
        assert_eq!(runtime.released(), vec![handle.identity, handle.identity]);
    }

    #[test]
    fn test_concurrent_registration_yields_one_proxy() {
        let (runtime, bridge) = setup();
        let handle = runtime.plain("app.Thing", &[]);
        let proxies: Vec<ObjectProxy> = (0..8)
            .map(|_| {
                let bridge = bridge.clone();
                let handle = handle.clone();
                thread::spawn(move || bridge.register(handle))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|join| join.join().unwrap())
            .collect();
        for proxy in &proxies[1..] {
            assert!(ObjectProxy::ptr_eq(&proxies[0], proxy));
        }
        drop(proxies);
        assert_eq!(runtime.released(), vec![handle.identity]);
    }

    #[test]
    fn test_racing_release_paths_release_once() {
        let (runtime, bridge) = setup();
        for _ in 0..32 {
            let handle = runtime.plain("app.Thing", &[]);
            let identity = handle.identity;
            let proxy = bridge.register(handle);
            let barrier = Arc::new(Barrier::new(4));

            let disposer = {
                let (proxy, barrier) = (proxy.clone(), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    proxy.dispose();
                })
            };
            let releaser = {
                let (bridge, barrier) = (bridge.clone(), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    bridge.release(identity);
                })
            };
            let droppers: Vec<_> = [proxy.clone(), proxy]
                .into_iter()
                .map(|copy| {
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        drop(copy);
                    })
                })
                .collect();
            for join in droppers.into_iter().chain([disposer, releaser]) {
                join.join().unwrap();
            }

            let released = runtime.released().iter().filter(|&&h| h == identity).count();
            assert_eq!(released, 1, "handle {} released {} times", identity, released);
            assert_eq!(bridge.state(identity), HandleState::Untracked);
        }
        assert_eq!(bridge.registered_proxies(), 0);
    }

    #[test]
    fn test_lift_wraps_nested_handles() {
        let (runtime, bridge) = setup();
        let a = runtime.plain("app.A", &[]);
        let b = runtime.plain("app.B", &[]);
        let lifted = bridge.lift(Value::Array(vec![
            Value::Handle(a.clone()),
            Value::Array(vec![Value::Handle(b.clone())]),
            Value::Int(3),
        ]));
        match lifted {
            Value::Array(items) => {
                assert_eq!(items[0].as_proxy().unwrap().class_name(), "app.A");
                match &items[1] {
                    Value::Array(inner) => assert_eq!(inner[0].as_proxy().unwrap().identity(), b.identity),
                    other => panic!("unexpected {:?}", other),
                }
                assert_eq!(items[2], Value::Int(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lift_reads_tuples() {
        let (runtime, bridge) = setup();
        let inner = runtime.plain("app.A", &[]);
        let tuple = runtime.tuple(vec![Value::Int(1), Value::Handle(inner.clone())]);
        match bridge.lift(Value::Handle(tuple)) {
            Value::Tuple(t) => {
                assert_eq!(t.arity(), 2);
                assert_eq!(t.get(0), Some(&Value::Int(1)));
                assert_eq!(t.get(1).and_then(Value::as_proxy).unwrap().identity(), inner.identity);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_object_fields_are_lifted() {
        let (runtime, bridge) = setup();
        runtime.define_class("app.Node", &["F/next-Lapp/Node;", "F/value-I"]);
        let tail = runtime.plain("app.Node", &[("value", Value::Int(2))]);
        let head = runtime.plain("app.Node", &[("value", Value::Int(1)), ("next", Value::Handle(tail.clone()))]);

        let head = bridge.register(head);
        let next = head.get_member("next");
        let next = next.as_proxy().unwrap();
        assert_eq!(next.identity(), tail.identity);
        assert_eq!(next.get_member("value"), Value::Int(2));
        assert!(next.get_member("next").is_null());
    }

    #[test]
    fn test_shutdown_releases_everything_once() {
        let (runtime, bridge) = setup();
        let a = bridge.register(runtime.plain("app.A", &[]));
        let b = bridge.register(runtime.plain("app.B", &[]));
        assert_eq!(bridge.shutdown(), 2);
        drop(a);
        drop(b);
        assert_eq!(runtime.released().len(), 2);
        assert_eq!(bridge.shutdown(), 0);
    }

    #[test]
    fn test_independent_bridges() {
        init_logging();
        let runtime = MockRuntime::new();
        let handle = runtime.plain("app.Thing", &[]);
        let one = Bridge::new(runtime.clone());
        let two = Bridge::new(runtime.clone());
        let a = one.register(handle.clone());
        let b = two.register(handle.clone());
        assert!(!ObjectProxy::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_with_config_validates() {
        init_logging();
        let mut config = BridgeConfig::default();
        config.trampoline.max_arity = 40;
        assert!(Bridge::with_config(MockRuntime::new(), config).is_err());
    }
}
