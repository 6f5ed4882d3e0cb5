//! Values crossing the runtime boundary
//!
//! `Value` is what flows through member reads, writes and calls in both
//! directions. Raw foreign references arrive as `Value::Handle`; the bridge
//! lifts them into `Value::Object` (or `Value::Tuple`) before client code
//! sees them, and `to_wire` lowers them back for transmission.

use std::fmt;

use tether_types::PropertyKind;

use crate::error::{BridgeError, Result};
use crate::proxy::ObjectProxy;
use crate::tuple::TupleAdapter;

/// A reference to an object living in the foreign runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignHandle {
    /// Foreign object identity, stable and unique while the object is alive
    pub identity: i32,
    /// Dotted class name, e.g. `java.util.HashMap`
    pub class_name: String,
}

impl ForeignHandle {
    pub fn new(identity: i32, class_name: impl Into<String>) -> Self {
        Self {
            identity,
            class_name: class_name.into(),
        }
    }
}

impl fmt::Display for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.class_name, self.identity)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    /// Foreign reference that has not been wrapped yet
    Handle(ForeignHandle),
    Object(ObjectProxy),
    Tuple(TupleAdapter),
    /// Classifies as the foreign root object type whatever it holds
    Erased(Box<Value>),
}

impl Value {
    pub fn erased(value: Value) -> Value {
        match value {
            Value::Erased(_) => value,
            other => Value::Erased(Box::new(other)),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Erased(inner) => inner.is_null(),
            _ => false,
        }
    }

    /// Strip any `Erased` wrapper
    pub fn unerased(&self) -> &Value {
        match self {
            Value::Erased(inner) => inner.unerased(),
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.unerased() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral view of any integral value (chars excluded)
    pub fn as_i64(&self) -> Option<i64> {
        match self.unerased() {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.unerased() {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.unerased() {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ObjectProxy> {
        match self.unerased() {
            Value::Object(proxy) => Some(proxy),
            Value::Tuple(tuple) => Some(tuple.proxy()),
            _ => None,
        }
    }

    /// Foreign identity of a handle, proxy or tuple
    pub fn foreign_identity(&self) -> Option<i32> {
        match self.unerased() {
            Value::Handle(handle) => Some(handle.identity),
            other => other.as_proxy().map(ObjectProxy::identity),
        }
    }

    /// Lower proxies and tuples to raw handles, recursively
    pub fn to_wire(&self) -> Value {
        match self {
            Value::Object(proxy) => Value::Handle(proxy.foreign_handle().clone()),
            Value::Tuple(tuple) => Value::Handle(tuple.proxy().foreign_handle().clone()),
            Value::Array(items) => Value::Array(items.iter().map(Value::to_wire).collect()),
            Value::Erased(inner) => Value::Erased(Box::new(inner.to_wire())),
            other => other.clone(),
        }
    }

    /// Default value of a kind: zero, `false`, `'\0'`, or null for references
    pub fn default_for(kind: PropertyKind) -> Value {
        match kind {
            PropertyKind::Bool => Value::Bool(false),
            PropertyKind::Byte => Value::Byte(0),
            PropertyKind::Char => Value::Char('\0'),
            PropertyKind::Short => Value::Short(0),
            PropertyKind::Int => Value::Int(0),
            PropertyKind::Long => Value::Long(0),
            PropertyKind::Float => Value::Float(0.0),
            PropertyKind::Double => Value::Double(0.0),
            PropertyKind::String | PropertyKind::Object | PropertyKind::Array => Value::Null,
        }
    }

    /// Standard conversion to `kind`.
    ///
    /// Numbers widen and narrow with range checks (floating values round
    /// half to even), strings parse, everything renders to `string`,
    /// `object` passes through and `array` accepts only arrays or null.
    pub fn convert(&self, kind: PropertyKind) -> Result<Value> {
        let value = self.unerased();
        let fail = || BridgeError::Conversion {
            kind,
            value: format!("{:?}", value),
        };

        let converted = match kind {
            PropertyKind::Object => value.clone(),
            PropertyKind::Array => match value {
                Value::Array(_) | Value::Null => value.clone(),
                _ => return Err(fail()),
            },
            PropertyKind::String => match value {
                Value::Null => Value::Str(String::new()),
                other => Value::Str(other.to_string()),
            },
            PropertyKind::Bool => match value {
                Value::Null => Value::Bool(false),
                Value::Bool(b) => Value::Bool(*b),
                Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => return Err(fail()),
                },
                Value::Char(_) => return Err(fail()),
                other => Value::Bool(other.as_f64().ok_or_else(fail)? != 0.0),
            },
            PropertyKind::Char => match value {
                Value::Null => Value::Char('\0'),
                Value::Char(c) => Value::Char(*c),
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Value::Char(c),
                        _ => return Err(fail()),
                    }
                }
                other => {
                    let code = other.as_i64().ok_or_else(fail)?;
                    let code = u16::try_from(code).map_err(|_| fail())?;
                    Value::Char(char::from_u32(u32::from(code)).ok_or_else(fail)?)
                }
            },
            PropertyKind::Float => Value::Float(value.to_float().ok_or_else(fail)? as f32),
            PropertyKind::Double => Value::Double(value.to_float().ok_or_else(fail)?),
            PropertyKind::Byte => {
                Value::Byte(u8::try_from(value.to_integral().ok_or_else(fail)?).map_err(|_| fail())?)
            }
            PropertyKind::Short => {
                Value::Short(i16::try_from(value.to_integral().ok_or_else(fail)?).map_err(|_| fail())?)
            }
            PropertyKind::Int => {
                Value::Int(i32::try_from(value.to_integral().ok_or_else(fail)?).map_err(|_| fail())?)
            }
            PropertyKind::Long => {
                Value::Long(i64::try_from(value.to_integral().ok_or_else(fail)?).map_err(|_| fail())?)
            }
        };
        Ok(converted)
    }

    /// Whether this value already has the shape `kind` expects
    pub fn fits(&self, kind: PropertyKind) -> bool {
        matches!(
            (kind, self.unerased()),
            (PropertyKind::Bool, Value::Bool(_))
                | (PropertyKind::Byte, Value::Byte(_))
                | (PropertyKind::Char, Value::Char(_))
                | (PropertyKind::Short, Value::Short(_))
                | (PropertyKind::Int, Value::Int(_))
                | (PropertyKind::Long, Value::Long(_))
                | (PropertyKind::Float, Value::Float(_))
                | (PropertyKind::Double, Value::Double(_))
                | (PropertyKind::String, Value::Str(_))
                | (PropertyKind::Array, Value::Array(_))
                | (PropertyKind::Object, _)
                | (_, Value::Null)
        )
    }

    fn to_integral(&self) -> Option<i128> {
        match self {
            Value::Null => Some(0),
            Value::Bool(b) => Some(i128::from(*b)),
            Value::Char(c) => Some(i128::from(u32::from(*c))),
            Value::Float(_) | Value::Double(_) => {
                let v = self.as_f64()?;
                if !v.is_finite() {
                    return None;
                }
                let rounded = v.round_ties_even();
                // beyond i128 nothing fits any target anyway
                if rounded.abs() > 1e30 {
                    return None;
                }
                Some(rounded as i128)
            }
            Value::Str(s) => s.trim().parse::<i128>().ok(),
            other => other.as_i64().map(i128::from),
        }
    }

    fn to_float(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Char(_) => None,
            other => other.as_f64(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Erased(a), b) => a.as_ref() == b,
            (a, Value::Erased(b)) => a == b.as_ref(),
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (
                Value::Handle(_) | Value::Object(_) | Value::Tuple(_),
                Value::Handle(_) | Value::Object(_) | Value::Tuple(_),
            ) => self.foreign_identity() == other.foreign_identity(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Handle(handle) => write!(f, "{}", handle),
            Value::Object(proxy) => write!(f, "{}", proxy),
            Value::Tuple(tuple) => write!(f, "{}", tuple),
            Value::Erased(inner) => write!(f, "{}", inner),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Value {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    u8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Str,
    Vec<Value> => Array,
    ForeignHandle => Handle,
    ObjectProxy => Object,
    TupleAdapter => Tuple,
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion of a local argument into a boundary value
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl<T: Into<Value>> IntoValue for T {
    fn into_value(self) -> Value {
        self.into()
    }
}

/// Extraction of a local result from a boundary value
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for () {
    fn from_value(_: Value) -> Option<Self> {
        Some(())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

macro_rules! impl_from_value_kind {
    ($($ty:ty => $kind:ident / $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Option<Self> {
                    match value.convert(PropertyKind::$kind).ok()? {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_value_kind! {
    bool => Bool / Bool,
    u8 => Byte / Byte,
    char => Char / Char,
    i16 => Short / Short,
    i32 => Int / Int,
    i64 => Long / Long,
    f32 => Float / Float,
    f64 => Double / Double,
    String => String / Str,
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Option<Self> {
        match value.convert(PropertyKind::Array).ok()? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl FromValue for ObjectProxy {
    fn from_value(value: Value) -> Option<Self> {
        value.as_proxy().cloned()
    }
}
