//! The foreign runtime as seen by the bridge
//!
//! The bridge never talks to the foreign virtual machine directly. Everything
//! it needs goes through `ForeignRuntime`, which the embedding layer
//! implements on top of its invocation transport. All calls are synchronous
//! and blocking: the calling thread waits until the foreign side returns, and
//! there is no timeout or cancellation.

use tether_types::TypeTag;

use crate::error::{BridgeError, Result};
use crate::value::{ForeignHandle, Value};

/// Container shape of a foreign object, reported when it is first wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectShape {
    #[default]
    Plain,
    /// Only supports `iterator()`
    Iterable,
    /// An iterable collection (`java.util.Collection`)
    Collection,
    /// Key/value map (`java.util.Map`)
    Map,
}

/// A field named by one of the class's `F/` signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub descriptor: TypeTag,
    pub is_static: bool,
}

/// A method named by one of the class's `M/` signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub name: String,
    /// Full descriptor, e.g. `(Ljava/lang/Object;)Z`
    pub descriptor: String,
    pub is_static: bool,
}

impl MethodRef {
    pub fn new(name: impl Into<String>, params: &[TypeTag], returns: &TypeTag, is_static: bool) -> Self {
        let params: String = params.iter().map(TypeTag::as_str).collect();
        Self {
            name: name.into(),
            descriptor: format!("({}){}", params, returns),
            is_static,
        }
    }
}

pub trait ForeignRuntime: Send + Sync {
    /// Call the foreign function registered under `handle`
    fn invoke(&self, handle: i32, args: &[Value]) -> Result<Value>;

    /// Foreign identity of a value the bridge does not already know as a proxy.
    /// With `strict` the runtime must not fall back to a best-effort identity.
    fn resolve_identity(&self, value: &Value, strict: bool) -> Result<i32>;

    /// The local side no longer references `handle`
    fn release_handle(&self, handle: i32);

    /// Signature tag of a value, used to build member keys
    fn classify(&self, value: &Value) -> TypeTag {
        classify(value)
    }

    /// Member signature strings (`F/`, `M/`, `C/`, optionally `S-` prefixed)
    fn class_signatures(&self, _class_name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn shape_of(&self, _handle: &ForeignHandle) -> ObjectShape {
        ObjectShape::Plain
    }

    fn get_field(&self, _target: &ForeignHandle, _field: &FieldRef) -> Result<Value> {
        Err(BridgeError::Unsupported("foreign field access"))
    }

    /// `value` may still contain proxies; see `Value::to_wire`
    fn set_field(&self, _target: &ForeignHandle, _field: &FieldRef, _value: &Value) -> Result<()> {
        Err(BridgeError::Unsupported("foreign field access"))
    }

    fn call_method(&self, _target: &ForeignHandle, _method: &MethodRef, _args: &[Value]) -> Result<Value> {
        Err(BridgeError::Unsupported("foreign method calls"))
    }
}

/// Default classification of boundary values into descriptor tags
pub fn classify(value: &Value) -> TypeTag {
    match value {
        Value::Null | Value::Erased(_) => TypeTag::OBJECT,
        Value::Bool(_) => TypeTag::BOOLEAN,
        Value::Byte(_) => TypeTag::BYTE,
        Value::Char(_) => TypeTag::CHAR,
        Value::Short(_) => TypeTag::SHORT,
        Value::Int(_) => TypeTag::INT,
        Value::Long(_) => TypeTag::LONG,
        Value::Float(_) => TypeTag::FLOAT,
        Value::Double(_) => TypeTag::DOUBLE,
        Value::Str(_) => TypeTag::STRING,
        Value::Array(items) => {
            let mut tags = items.iter().map(classify);
            let element = match tags.next() {
                Some(first) if tags.all(|tag| tag == first) => first,
                _ => TypeTag::OBJECT,
            };
            TypeTag::array_of(&element)
        }
        Value::Handle(handle) => class_tag(&handle.class_name),
        Value::Object(proxy) => class_tag(proxy.class_name()),
        Value::Tuple(tuple) => class_tag(tuple.proxy().class_name()),
    }
}

fn class_tag(class_name: &str) -> TypeTag {
    // array classes already come in descriptor spelling
    if class_name.starts_with('[') {
        TypeTag::new(class_name.replace('.', "/"))
    } else {
        TypeTag::object(class_name)
    }
}
