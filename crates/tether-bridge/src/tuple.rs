//! Fixed-arity tuples read out of foreign `scala.TupleN` objects
//!
//! The components are read once, through `_1()` .. `_N()`, when the tuple is
//! lifted. The backing proxy stays attached and owns the foreign lifetime.

use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::proxy::ObjectProxy;
use crate::value::Value;

pub const MAX_TUPLE_ARITY: usize = 8;

const TUPLE_CLASS_PREFIX: &str = "scala.Tuple";

/// Arity of a tuple class name, `None` for anything else
pub fn tuple_arity(class_name: &str) -> Option<usize> {
    let arity: usize = class_name.strip_prefix(TUPLE_CLASS_PREFIX)?.parse().ok()?;
    (1..=MAX_TUPLE_ARITY).contains(&arity).then_some(arity)
}

#[derive(Clone)]
pub struct TupleAdapter {
    proxy: ObjectProxy,
    items: Arc<[Value]>,
}

impl TupleAdapter {
    pub fn new(proxy: ObjectProxy, items: Vec<Value>) -> Result<Self> {
        if !(1..=MAX_TUPLE_ARITY).contains(&items.len()) {
            return Err(BridgeError::ArityMismatch {
                expected: MAX_TUPLE_ARITY.min(items.len().max(1)),
                actual: items.len(),
            });
        }
        Ok(Self {
            proxy,
            items: items.into(),
        })
    }

    /// Read `arity` components from the foreign tuple
    pub(crate) fn read(proxy: ObjectProxy, arity: usize) -> Result<Self> {
        let items = (1..=arity)
            .map(|i| proxy.try_call(&format!("_{}", i), &[]))
            .collect::<Result<Vec<_>>>()?;
        Self::new(proxy, items)
    }

    pub fn arity(&self) -> usize {
        self.items.len()
    }

    /// Component by zero-based position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn proxy(&self) -> &ObjectProxy {
        &self.proxy
    }

    /// Components as a fixed-size array, if the arity is `N`
    pub fn to_array<const N: usize>(&self) -> Option<[Value; N]> {
        <[Value; N]>::try_from(self.items.to_vec()).ok()
    }

    pub fn hash_code(&self) -> i32 {
        self.proxy.hash_code()
    }
}

impl PartialEq for TupleAdapter {
    fn eq(&self, other: &TupleAdapter) -> bool {
        self.proxy == other.proxy
    }
}

impl fmt::Display for TupleAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for TupleAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleAdapter")
            .field("identity", &self.proxy.identity())
            .field("items", &self.items)
            .finish()
    }
}
