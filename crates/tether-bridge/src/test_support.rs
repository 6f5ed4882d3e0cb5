//! In-memory foreign runtime for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{BridgeError, Result};
use crate::runtime::{FieldRef, ForeignRuntime, MethodRef, ObjectShape};
use crate::tuple::tuple_arity;
use crate::value::{ForeignHandle, Value};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

enum MockObject {
    Plain(HashMap<String, Value>),
    List(Vec<Value>),
    Iterable(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Iter { items: Vec<Value>, pos: usize },
    Tuple(Vec<Value>),
}

enum Outcome {
    Done(Value),
    Spawn(&'static str, MockObject),
}

/// A small foreign heap. Everything stored is lowered to raw handles so the
/// mock never keeps proxies alive.
pub(crate) struct MockRuntime {
    next_id: AtomicI32,
    heap: Mutex<HashMap<i32, (String, MockObject)>>,
    functions: Mutex<HashMap<i32, NativeFn>>,
    classes: Mutex<HashMap<String, Vec<String>>>,
    methods: Mutex<HashMap<(String, String), NativeFn>>,
    released: Mutex<Vec<i32>>,
    calls: Mutex<Vec<(i32, String)>>,
    invocations: Mutex<Vec<(i32, Vec<Value>)>>,
}

fn lower(value: &Value) -> Value {
    value.to_wire().unerased().clone()
}

impl MockRuntime {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(100),
            heap: Mutex::new(HashMap::new()),
            functions: Mutex::new(HashMap::new()),
            classes: Mutex::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
            released: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn alloc(&self, class_name: &str, object: MockObject) -> ForeignHandle {
        let identity = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.heap
            .lock()
            .unwrap()
            .insert(identity, (class_name.to_string(), object));
        ForeignHandle::new(identity, class_name)
    }

    pub(crate) fn plain(&self, class_name: &str, fields: &[(&str, Value)]) -> ForeignHandle {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), lower(value)))
            .collect();
        self.alloc(class_name, MockObject::Plain(fields))
    }

    pub(crate) fn list(&self, items: Vec<Value>) -> ForeignHandle {
        let items = items.iter().map(lower).collect();
        self.alloc("java.util.ArrayList", MockObject::List(items))
    }

    pub(crate) fn iterable(&self, items: Vec<Value>) -> ForeignHandle {
        let items = items.iter().map(lower).collect();
        self.alloc("java.lang.Iterable", MockObject::Iterable(items))
    }

    pub(crate) fn map(&self, entries: Vec<(Value, Value)>) -> ForeignHandle {
        let entries = entries.iter().map(|(k, v)| (lower(k), lower(v))).collect();
        self.alloc("java.util.HashMap", MockObject::Map(entries))
    }

    pub(crate) fn tuple(&self, items: Vec<Value>) -> ForeignHandle {
        let class_name = format!("scala.Tuple{}", items.len());
        let items = items.iter().map(lower).collect();
        self.alloc(&class_name, MockObject::Tuple(items))
    }

    /// Register a foreign function and return its handle
    pub(crate) fn function<F>(&self, f: F) -> i32
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let handle = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.functions.lock().unwrap().insert(handle, Arc::new(f));
        handle
    }

    /// Replace the signatures reported for a class
    pub(crate) fn define_class(&self, class_name: &str, signatures: &[&str]) {
        self.classes.lock().unwrap().insert(
            class_name.to_string(),
            signatures.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub(crate) fn define_method<F>(&self, class_name: &str, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods
            .lock()
            .unwrap()
            .insert((class_name.to_string(), name.to_string()), Arc::new(f));
    }

    /// Stored field value, `None` if the object has no such field
    pub(crate) fn field(&self, identity: i32, name: &str) -> Option<Value> {
        match self.heap.lock().unwrap().get(&identity) {
            Some((_, MockObject::Plain(fields))) => fields.get(name).cloned(),
            _ => None,
        }
    }

    pub(crate) fn released(&self) -> Vec<i32> {
        self.released.lock().unwrap().clone()
    }

    /// Names of the methods called on an object, in call order
    pub(crate) fn method_calls(&self, identity: i32) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == identity)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub(crate) fn invocations(&self) -> Vec<(i32, Vec<Value>)> {
        self.invocations.lock().unwrap().clone()
    }

    fn builtin_signatures(class_name: &str) -> Vec<String> {
        let iterable = ["M/iterator()Ljava/util/Iterator;"];
        let signatures: Vec<&str> = match class_name {
            "java.util.ArrayList" | "java.util.HashMap$KeySet" | "java.util.HashMap$Values" => {
                vec![iterable[0], "M/size()I"]
            }
            "java.lang.Iterable" => iterable.to_vec(),
            "java.util.Iterator" => vec!["M/hasNext()Z", "M/next()Ljava/lang/Object;"],
            "java.util.HashMap" => vec![
                "M/get(Ljava/lang/Object;)Ljava/lang/Object;",
                "M/put(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
                "M/containsKey(Ljava/lang/Object;)Z",
                "M/remove(Ljava/lang/Object;)Ljava/lang/Object;",
                "M/size()I",
                "M/clear()V",
                "M/keySet()Ljava/util/Set;",
                "M/values()Ljava/util/Collection;",
            ],
            other => {
                return match tuple_arity(other) {
                    Some(arity) => (1..=arity)
                        .map(|i| format!("M/_{}()Ljava/lang/Object;", i))
                        .collect(),
                    None => Vec::new(),
                }
            }
        };
        signatures.into_iter().map(String::from).collect()
    }

    fn builtin(&self, identity: i32, name: &str, args: &[Value]) -> Result<Value> {
        let outcome = {
            let mut heap = self.heap.lock().unwrap();
            let (_, object) = heap.get_mut(&identity).ok_or(BridgeError::NoObject(identity))?;
            let missing = || BridgeError::Foreign(format!("NoSuchMethodError: {}", name));
            match (object, name) {
                (MockObject::List(items) | MockObject::Iterable(items), "iterator") => Outcome::Spawn(
                    "java.util.Iterator",
                    MockObject::Iter {
                        items: items.clone(),
                        pos: 0,
                    },
                ),
                (MockObject::List(items), "size") => Outcome::Done(Value::Int(items.len() as i32)),
                (MockObject::Iter { items, pos }, "hasNext") => Outcome::Done(Value::Bool(*pos < items.len())),
                (MockObject::Iter { items, pos }, "next") => {
                    let item = items
                        .get(*pos)
                        .cloned()
                        .ok_or_else(|| BridgeError::Foreign("NoSuchElementException".into()))?;
                    *pos += 1;
                    Outcome::Done(item)
                }
                (MockObject::Map(entries), _) => {
                    let key = args.first().map(lower).unwrap_or(Value::Null);
                    let position = entries.iter().position(|(k, _)| *k == key);
                    match name {
                        "get" => Outcome::Done(position.map_or(Value::Null, |i| entries[i].1.clone())),
                        "containsKey" => Outcome::Done(Value::Bool(position.is_some())),
                        "put" => {
                            let value = args.get(1).map(lower).unwrap_or(Value::Null);
                            match position {
                                Some(i) => Outcome::Done(std::mem::replace(&mut entries[i].1, value)),
                                None => {
                                    entries.push((key, value));
                                    Outcome::Done(Value::Null)
                                }
                            }
                        }
                        "remove" => Outcome::Done(position.map_or(Value::Null, |i| entries.remove(i).1)),
                        "size" => Outcome::Done(Value::Int(entries.len() as i32)),
                        "clear" => {
                            entries.clear();
                            Outcome::Done(Value::Null)
                        }
                        "keySet" => Outcome::Spawn(
                            "java.util.HashMap$KeySet",
                            MockObject::List(entries.iter().map(|(k, _)| k.clone()).collect()),
                        ),
                        "values" => Outcome::Spawn(
                            "java.util.HashMap$Values",
                            MockObject::List(entries.iter().map(|(_, v)| v.clone()).collect()),
                        ),
                        _ => return Err(missing()),
                    }
                }
                (MockObject::Tuple(items), name) => {
                    let index: usize = name
                        .strip_prefix('_')
                        .and_then(|i| i.parse().ok())
                        .ok_or_else(missing)?;
                    let item = index
                        .checked_sub(1)
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or_else(missing)?;
                    Outcome::Done(item)
                }
                _ => return Err(missing()),
            }
        };

        // allocation takes the heap lock again
        match outcome {
            Outcome::Done(value) => Ok(value),
            Outcome::Spawn(class_name, object) => Ok(Value::Handle(self.alloc(class_name, object))),
        }
    }
}

impl ForeignRuntime for MockRuntime {
    fn invoke(&self, handle: i32, args: &[Value]) -> Result<Value> {
        let function = self
            .functions
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .ok_or(BridgeError::NoObject(handle))?;
        let args: Vec<Value> = args.iter().map(lower).collect();
        self.invocations.lock().unwrap().push((handle, args.clone()));
        function(&args)
    }

    fn resolve_identity(&self, value: &Value, strict: bool) -> Result<i32> {
        match (value.unerased(), strict) {
            (Value::Handle(handle), _) => Ok(handle.identity),
            (Value::Int(identity), false) => Ok(*identity),
            (other, _) => Err(BridgeError::Foreign(format!("no identity for {:?}", other))),
        }
    }

    fn release_handle(&self, handle: i32) {
        self.released.lock().unwrap().push(handle);
    }

    fn class_signatures(&self, class_name: &str) -> Result<Vec<String>> {
        if let Some(signatures) = self.classes.lock().unwrap().get(class_name) {
            return Ok(signatures.clone());
        }
        Ok(Self::builtin_signatures(class_name))
    }

    fn shape_of(&self, handle: &ForeignHandle) -> ObjectShape {
        match self.heap.lock().unwrap().get(&handle.identity) {
            Some((_, MockObject::List(_))) => ObjectShape::Collection,
            Some((_, MockObject::Iterable(_))) => ObjectShape::Iterable,
            Some((_, MockObject::Map(_))) => ObjectShape::Map,
            _ => ObjectShape::Plain,
        }
    }

    fn get_field(&self, target: &ForeignHandle, field: &FieldRef) -> Result<Value> {
        match self.heap.lock().unwrap().get(&target.identity) {
            Some((_, MockObject::Plain(fields))) => Ok(fields.get(&field.name).cloned().unwrap_or(Value::Null)),
            Some(_) => Err(BridgeError::Foreign(format!("NoSuchFieldError: {}", field.name))),
            None => Err(BridgeError::NoObject(target.identity)),
        }
    }

    fn set_field(&self, target: &ForeignHandle, field: &FieldRef, value: &Value) -> Result<()> {
        match self.heap.lock().unwrap().get_mut(&target.identity) {
            Some((_, MockObject::Plain(fields))) => {
                fields.insert(field.name.clone(), lower(value));
                Ok(())
            }
            Some(_) => Err(BridgeError::Foreign(format!("NoSuchFieldError: {}", field.name))),
            None => Err(BridgeError::NoObject(target.identity)),
        }
    }

    fn call_method(&self, target: &ForeignHandle, method: &MethodRef, args: &[Value]) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((target.identity, method.name.clone()));
        let args: Vec<Value> = args.iter().map(lower).collect();
        let defined = self
            .methods
            .lock()
            .unwrap()
            .get(&(target.class_name.clone(), method.name.clone()))
            .cloned();
        match defined {
            Some(f) => f(&args),
            None => self.builtin(target.identity, &method.name, &args),
        }
    }
}
