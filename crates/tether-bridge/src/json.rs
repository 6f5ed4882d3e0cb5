//! Write-only JSON projection of bridged values
//!
//! The serializer walks a value and drives a `JsonWriter`:
//!
//! - iterables and collections become arrays of their enumerated elements
//! - maps become name/value pairs; by default the pairs sit inside array
//!   brackets (`["k":v]`), with `map_layout = "object"` they form an object
//! - other proxies become objects over their property descriptors, leaving
//!   out names starting with the internal prefix
//! - tuples become `{"Item1":..,"ItemN":..}`
//!
//! Reading JSON back into proxies is not supported.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};

use crate::config::{BridgeConfig, MapLayout};
use crate::error::{BridgeError, Result};
use crate::proxy::{Dispatch, ObjectProxy};
use crate::runtime::ObjectShape;
use crate::tuple::TupleAdapter;
use crate::value::Value;

/// Structural writer primitives the serializer is expressed in
pub trait JsonWriter {
    fn start_array(&mut self);
    fn end_array(&mut self);
    fn start_object(&mut self);
    fn end_object(&mut self);
    fn write_property_name(&mut self, name: &str);
    fn write_scalar(&mut self, value: &serde_json::Value);
}

/// Compact JSON text
#[derive(Debug, Default)]
pub struct JsonTextWriter {
    out: String,
    // one flag per open container: has it written an item yet
    written: Vec<bool>,
    after_name: bool,
}

impl JsonTextWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn begin_item(&mut self) {
        if self.after_name {
            self.after_name = false;
            return;
        }
        if let Some(written) = self.written.last_mut() {
            if *written {
                self.out.push(',');
            }
            *written = true;
        }
    }
}

impl JsonWriter for JsonTextWriter {
    fn start_array(&mut self) {
        self.begin_item();
        self.out.push('[');
        self.written.push(false);
    }

    fn end_array(&mut self) {
        self.written.pop();
        self.out.push(']');
    }

    fn start_object(&mut self) {
        self.begin_item();
        self.out.push('{');
        self.written.push(false);
    }

    fn end_object(&mut self) {
        self.written.pop();
        self.out.push('}');
    }

    fn write_property_name(&mut self, name: &str) {
        self.begin_item();
        self.out
            .push_str(&serde_json::Value::String(name.to_string()).to_string());
        self.out.push(':');
        self.after_name = true;
    }

    fn write_scalar(&mut self, value: &serde_json::Value) {
        self.begin_item();
        self.out.push_str(&value.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct StructuralSerializer {
    internal_prefix: String,
    map_layout: MapLayout,
}

impl Default for StructuralSerializer {
    fn default() -> Self {
        Self::from_config(BridgeConfig::shared_default())
    }
}

impl StructuralSerializer {
    pub fn new(internal_prefix: impl Into<String>, map_layout: MapLayout) -> Self {
        Self {
            internal_prefix: internal_prefix.into(),
            map_layout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.proxy.internal_prefix.clone(), config.serializer.map_layout)
    }

    pub fn to_json(&self, value: &Value) -> String {
        let mut writer = JsonTextWriter::new();
        self.serialize(&mut writer, value);
        writer.into_string()
    }

    pub fn serialize(&self, writer: &mut dyn JsonWriter, value: &Value) {
        let mut path = HashSet::new();
        self.write_value(writer, value, &mut path);
    }

    /// Always fails: proxies cannot be rebuilt from JSON
    pub fn deserialize(&self, _json: &str) -> Result<ObjectProxy> {
        Err(BridgeError::Unsupported("deserializing foreign objects"))
    }

    fn write_value(&self, writer: &mut dyn JsonWriter, value: &Value, path: &mut HashSet<i32>) {
        match value.unerased() {
            Value::Array(items) => {
                writer.start_array();
                for item in items {
                    self.write_value(writer, item, path);
                }
                writer.end_array();
            }
            Value::Object(proxy) => self.write_guarded(writer, proxy, path, |this, writer, path| {
                this.write_proxy(writer, proxy, path)
            }),
            Value::Tuple(tuple) => self.write_guarded(writer, tuple.proxy(), path, |this, writer, path| {
                this.write_tuple(writer, tuple, path)
            }),
            scalar => writer.write_scalar(&scalar_json(scalar)),
        }
    }

    /// Objects already being written further up are written as null
    fn write_guarded<F>(&self, writer: &mut dyn JsonWriter, proxy: &ObjectProxy, path: &mut HashSet<i32>, write: F)
    where
        F: FnOnce(&Self, &mut dyn JsonWriter, &mut HashSet<i32>),
    {
        let identity = proxy.identity();
        if !path.insert(identity) {
            log::warn!("Cycle through {} while serializing, writing null", proxy);
            writer.write_scalar(&serde_json::Value::Null);
            return;
        }
        write(self, writer, path);
        path.remove(&identity);
    }

    fn write_proxy(&self, writer: &mut dyn JsonWriter, proxy: &ObjectProxy, path: &mut HashSet<i32>) {
        match proxy.shape() {
            ObjectShape::Iterable | ObjectShape::Collection => {
                writer.start_array();
                if let Some(iterable) = proxy.as_iterable() {
                    for item in &iterable {
                        self.write_value(writer, &item, path);
                    }
                }
                writer.end_array();
            }
            ObjectShape::Map => {
                let Some(map) = proxy.as_map() else {
                    return writer.write_scalar(&serde_json::Value::Null);
                };
                match self.map_layout {
                    MapLayout::PairsInArray => writer.start_array(),
                    MapLayout::Object => writer.start_object(),
                }
                for (key, value) in &map {
                    writer.write_property_name(&key_name(&key));
                    self.write_value(writer, &value, path);
                }
                match self.map_layout {
                    MapLayout::PairsInArray => writer.end_array(),
                    MapLayout::Object => writer.end_object(),
                }
            }
            ObjectShape::Plain => {
                writer.start_object();
                for name in proxy.property_names() {
                    if name.starts_with(&self.internal_prefix) {
                        continue;
                    }
                    writer.write_property_name(&name);
                    self.write_value(writer, &proxy.get_member(&name), path);
                }
                writer.end_object();
            }
        }
    }

    fn write_tuple(&self, writer: &mut dyn JsonWriter, tuple: &TupleAdapter, path: &mut HashSet<i32>) {
        writer.start_object();
        for (i, item) in tuple.items().iter().enumerate() {
            writer.write_property_name(&format!("Item{}", i + 1));
            self.write_value(writer, item, path);
        }
        writer.end_object();
    }
}

/// Property name for a map key. Foreign keys are named by their own
/// `toString()`, falling back to class and identity when it is not bound.
fn key_name(key: &Value) -> String {
    let proxy = match key.unerased() {
        Value::Object(proxy) => proxy,
        Value::Tuple(tuple) => tuple.proxy(),
        other => return other.to_string(),
    };
    match proxy.invoke_member("toString", &[]) {
        Dispatch::Returned(Value::Str(name)) => name,
        _ => proxy.to_string(),
    }
}

fn scalar_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Byte(v) => Json::from(*v),
        Value::Short(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::Long(v) => Json::from(*v),
        // shortest f32 spelling, not its widened f64 expansion
        Value::Float(v) => v
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(Json::Null, Json::Number),
        Value::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
        Value::Char(c) => Json::String(c.to_string()),
        Value::Str(s) => Json::String(s.clone()),
        // raw handles are not expected here; lifted values never contain them
        Value::Handle(handle) => Json::String(handle.to_string()),
        Value::Array(_) | Value::Object(_) | Value::Tuple(_) | Value::Erased(_) => Json::Null,
    }
}

impl<'de> Deserialize<'de> for ObjectProxy {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> std::result::Result<Self, D::Error> {
        Err(serde::de::Error::custom(BridgeError::Unsupported(
            "deserializing foreign objects",
        )))
    }
}
