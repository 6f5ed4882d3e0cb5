//! Container views over foreign iterables, collections and maps
//!
//! The adapters do not check what the foreign object supports. They call
//! `iterator()`, `hasNext()`, `next()` and, for maps, `put`/`get`/
//! `containsKey`/`remove`/`size`/`clear`/`keySet`/`values` and let dispatch
//! report whatever is missing.
//!
//! Iterable and collection adapters are read-only in practice: their
//! counting and mutation methods are structural stubs that never reach the
//! foreign object.

use std::ops::Deref;

use crate::config::ResetMode;
use crate::proxy::{Dispatch, HoldGuard, ObjectProxy};
use crate::value::Value;

/// Single-pass cursor over a foreign iterator
pub struct ProxyEnumerator {
    source: ObjectProxy,
    cursor: Option<ObjectProxy>,
    current: Value,
    started: bool,
    reset_mode: ResetMode,
    _hold: HoldGuard,
}

impl ProxyEnumerator {
    /// Start enumerating `source`, pulling its iterator right away
    pub fn new(source: &ObjectProxy) -> Self {
        let reset_mode = source.session().config.enumerator.reset;
        Self {
            cursor: pull_iterator(source),
            current: Value::Null,
            started: false,
            reset_mode,
            _hold: source.hold(),
            source: source.clone(),
        }
    }

    /// Move to the next element. Returns `false` once the iterator is exhausted.
    pub fn advance(&mut self) -> bool {
        self.started = true;
        let Some(cursor) = &self.cursor else {
            return false;
        };
        if !has_next(cursor) {
            return false;
        }
        self.current = cursor.call("next", &[]);
        true
    }

    /// The element under the cursor; advances once if nothing was read yet
    pub fn current(&mut self) -> &Value {
        if !self.started {
            self.advance();
        }
        &self.current
    }

    /// With the default `ResetMode::Drain` this does not rewind: it consumes
    /// the rest of the iterator, leaving `current` on the last element seen.
    /// `ResetMode::Rewind` pulls a fresh iterator instead.
    pub fn reset(&mut self) {
        match self.reset_mode {
            ResetMode::Drain => {
                if let Some(cursor) = &self.cursor {
                    while has_next(cursor) {
                        self.current = cursor.call("next", &[]);
                    }
                }
            }
            ResetMode::Rewind => {
                self.cursor = pull_iterator(&self.source);
                self.current = Value::Null;
                self.started = false;
            }
        }
    }

    pub fn source(&self) -> &ObjectProxy {
        &self.source
    }
}

impl Iterator for ProxyEnumerator {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.advance() {
            Some(self.current.clone())
        } else {
            None
        }
    }
}

fn pull_iterator(source: &ObjectProxy) -> Option<ObjectProxy> {
    match source.invoke_member("iterator", &[]) {
        Dispatch::Returned(Value::Object(iterator)) => Some(iterator),
        Dispatch::Returned(other) => {
            log::warn!("iterator() on {} returned {:?}", source, other);
            None
        }
        Dispatch::NotHandled => {
            log::warn!("{} has no iterator()", source);
            None
        }
        Dispatch::Failed(_) => None,
    }
}

fn has_next(cursor: &ObjectProxy) -> bool {
    cursor.call("hasNext", &[]).as_bool().unwrap_or(false)
}

macro_rules! structural_stubs {
    ($adapter:ident) => {
        impl $adapter {
            /// Always 0; not connected to the foreign object
            pub fn len(&self) -> usize {
                0
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Always `true`; not connected to the foreign object
            pub fn contains(&self, _item: &Value) -> bool {
                true
            }

            /// No-op
            pub fn add(&self, _item: Value) {}

            /// Always `true`, nothing is removed
            pub fn remove(&self, _item: &Value) -> bool {
                true
            }

            /// No-op
            pub fn clear(&self) {}

            pub fn is_read_only(&self) -> bool {
                false
            }

            pub fn proxy(&self) -> &ObjectProxy {
                &self.proxy
            }

            pub fn iter(&self) -> ProxyEnumerator {
                ProxyEnumerator::new(&self.proxy)
            }
        }

        impl Deref for $adapter {
            type Target = ObjectProxy;

            fn deref(&self) -> &ObjectProxy {
                &self.proxy
            }
        }

        impl IntoIterator for &$adapter {
            type Item = Value;
            type IntoIter = ProxyEnumerator;

            fn into_iter(self) -> ProxyEnumerator {
                self.iter()
            }
        }
    };
}

/// Enumeration-only view of a foreign `Iterable`
#[derive(Debug, Clone)]
pub struct IterableAdapter {
    proxy: ObjectProxy,
}

impl IterableAdapter {
    /// Wrap without checking the proxy's shape
    pub fn new(proxy: ObjectProxy) -> Self {
        Self { proxy }
    }
}

structural_stubs!(IterableAdapter);

/// View of a foreign `Collection`
#[derive(Debug, Clone)]
pub struct CollectionAdapter {
    proxy: ObjectProxy,
}

impl CollectionAdapter {
    /// Wrap without checking the proxy's shape
    pub fn new(proxy: ObjectProxy) -> Self {
        Self { proxy }
    }

    /// No-op
    pub fn copy_to(&self, _target: &mut [Value], _offset: usize) {}
}

structural_stubs!(CollectionAdapter);

/// View of a foreign `Map`. Keys and values are erased to the root object
/// type before crossing, so they match the map's `Object` parameters.
#[derive(Debug, Clone)]
pub struct MapAdapter {
    proxy: ObjectProxy,
}

impl MapAdapter {
    /// Wrap without checking the proxy's shape
    pub fn new(proxy: ObjectProxy) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &ObjectProxy {
        &self.proxy
    }

    /// Value under `key`, null when absent
    pub fn get(&self, key: &Value) -> Value {
        if self.contains_key(key) {
            self.fetch(key)
        } else {
            Value::Null
        }
    }

    /// Value under `key` without checking presence first
    fn fetch(&self, key: &Value) -> Value {
        self.proxy.call("get", &[Value::erased(key.clone())])
    }

    /// Insert or overwrite. Returns `false` if the foreign `put` is missing
    /// or failed.
    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let args = [Value::erased(key.into()), Value::erased(value.into())];
        self.forward("put", &args)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.proxy
            .call("containsKey", &[Value::erased(key.clone())])
            .as_bool()
            .unwrap_or(false)
    }

    /// Remove `key`; `false` if it was not present or the foreign `remove`
    /// did not run
    pub fn remove(&self, key: &Value) -> bool {
        self.contains_key(key) && self.forward("remove", &[Value::erased(key.clone())])
    }

    fn forward(&self, member: &str, args: &[Value]) -> bool {
        match self.proxy.invoke_member(member, args) {
            Dispatch::Returned(_) => true,
            Dispatch::NotHandled => {
                log::warn!("{} has no {}() taking {} argument(s)", self.proxy, member, args.len());
                false
            }
            Dispatch::Failed(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.proxy
            .call("size", &[])
            .as_i64()
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.proxy.invoke_member("clear", &[]);
    }

    /// The foreign key set
    pub fn keys(&self) -> Option<CollectionAdapter> {
        self.view("keySet")
    }

    /// The foreign values collection
    pub fn values(&self) -> Option<CollectionAdapter> {
        self.view("values")
    }

    fn view(&self, member: &str) -> Option<CollectionAdapter> {
        match self.proxy.call(member, &[]) {
            Value::Object(view) => Some(CollectionAdapter::new(view)),
            other => {
                log::warn!("{}() on {} returned {:?}", member, self.proxy, other);
                None
            }
        }
    }

    /// Whether `key` maps to `value`
    pub fn contains_entry(&self, key: &Value, value: &Value) -> bool {
        self.contains_key(key) && self.fetch(key) == *value
    }

    /// Remove `key` only if it maps to `value`
    pub fn remove_entry(&self, key: &Value, value: &Value) -> bool {
        self.contains_entry(key, value) && self.remove(key)
    }

    pub fn is_read_only(&self) -> bool {
        false
    }

    /// Walks the key set and fetches each value with `get`
    pub fn entries(&self) -> MapEntries {
        MapEntries {
            keys: self.keys().map(|keys| keys.iter()),
            map: self.clone(),
            current: None,
            started: false,
        }
    }
}

impl Deref for MapAdapter {
    type Target = ObjectProxy;

    fn deref(&self) -> &ObjectProxy {
        &self.proxy
    }
}

impl IntoIterator for &MapAdapter {
    type Item = (Value, Value);
    type IntoIter = MapEntries;

    fn into_iter(self) -> MapEntries {
        self.entries()
    }
}

/// Cursor over a foreign map's entries: one `next()` for the key and one
/// `get()` for the value, per entry
pub struct MapEntries {
    map: MapAdapter,
    keys: Option<ProxyEnumerator>,
    current: Option<(Value, Value)>,
    started: bool,
}

impl MapEntries {
    pub fn advance(&mut self) -> bool {
        self.started = true;
        let Some(keys) = self.keys.as_mut() else {
            return false;
        };
        if !keys.advance() {
            return false;
        }
        let key = keys.current().clone();
        let value = self.map.fetch(&key);
        self.current = Some((key, value));
        true
    }

    pub fn current(&mut self) -> Option<&(Value, Value)> {
        if !self.started {
            self.advance();
        }
        self.current.as_ref()
    }

    /// Same semantics as `ProxyEnumerator::reset`; draining still fetches
    /// every remaining value
    pub fn reset(&mut self) {
        let Some(mode) = self.keys.as_ref().map(|keys| keys.reset_mode) else {
            return;
        };
        match mode {
            ResetMode::Drain => while self.advance() {},
            ResetMode::Rewind => {
                self.keys = self.map.keys().map(|keys| keys.iter());
                self.current = None;
                self.started = false;
            }
        }
    }
}

impl Iterator for MapEntries {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<(Value, Value)> {
        if self.advance() {
            self.current.clone()
        } else {
            None
        }
    }
}
