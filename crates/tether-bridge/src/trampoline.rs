//! Callback trampolines
//!
//! The foreign runtime refers to a local callback target by an integer
//! function handle. A `Trampoline` binds such a handle to a local delegate
//! shape looked up in the catalog, and every call, whatever its arity, goes
//! through one dispatch routine: convert the arguments to the shape's
//! parameter kinds, forward them to `ForeignRuntime::invoke`, and lift the
//! result.
//!
//! Failures never unwind into the caller. `call` logs them and returns the
//! shape's default value; `try_call` returns them.
//!
//! A trampoline whose shape cannot be resolved is inert: calling it does
//! nothing and returns null. The resolution error stays available through
//! `resolution_error`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bridge::Session;
use crate::catalog::DelegateShape;
use crate::error::{BridgeError, Result};
use crate::registry::Published;
use crate::value::{FromValue, IntoValue, Value};

/// Dispatch entry selected for a shape: `a{n}` for delegates returning
/// nothing, `f{n}` for delegates returning a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thunk {
    Action(usize),
    Func(usize),
}

impl Thunk {
    pub fn for_shape(shape: &DelegateShape) -> Thunk {
        if shape.is_void() {
            Thunk::Action(shape.arity())
        } else {
            Thunk::Func(shape.arity())
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Thunk::Action(n) | Thunk::Func(n) => n,
        }
    }

    pub fn is_void(self) -> bool {
        matches!(self, Thunk::Action(_))
    }
}

impl fmt::Display for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thunk::Action(n) => write!(f, "a{}", n),
            Thunk::Func(n) => write!(f, "f{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub shape: DelegateShape,
    pub thunk: Thunk,
}

pub(crate) struct TrampolineInner {
    handle: i32,
    delegate: String,
    binding: std::result::Result<Binding, BridgeError>,
    token: u64,
    session: Arc<Session>,
}

impl Drop for TrampolineInner {
    fn drop(&mut self) {
        self.session.release_trampoline(self.handle, self.token);
    }
}

#[derive(Clone)]
pub struct Trampoline {
    inner: Arc<TrampolineInner>,
}

impl Trampoline {
    pub(crate) fn bind(session: &Arc<Session>, delegate: &str, handle: i32) -> Trampoline {
        if let Some(live) = session.trampolines.lookup(handle) {
            if live.delegate == delegate {
                return Trampoline { inner: live };
            }
            log::warn!(
                "Callback handle {} is already bound to {}; {} will not own its release",
                handle,
                live.delegate,
                delegate
            );
            // never published, so dropping it releases nothing
            return Self::build(session, delegate, handle, session.trampolines.next_token());
        }

        let token = session.trampolines.next_token();
        let candidate = Self::build(session, delegate, handle, token);
        match session.trampolines.publish(handle, token, &candidate.inner) {
            Published::Inserted => {
                log::debug!("Registered callback handle {} as {}", handle, delegate);
                candidate
            }
            Published::Replaced => {
                log::debug!("Registered callback handle {} as {} over a finalizing one", handle, delegate);
                session.runtime.release_handle(handle);
                candidate
            }
            Published::Existing(live) if live.delegate == delegate => Trampoline { inner: live },
            Published::Existing(_) => candidate,
        }
    }

    fn build(session: &Arc<Session>, delegate: &str, handle: i32, token: u64) -> Trampoline {
        let binding = resolve_binding(session, delegate);
        match &binding {
            Ok(binding) => log::trace!("Callback {} bound through {}", handle, binding.thunk),
            Err(e) => log::error!("Callback {} left inert: {}", handle, e),
        }
        Trampoline {
            inner: Arc::new(TrampolineInner {
                handle,
                delegate: delegate.to_string(),
                binding,
                token,
                session: Arc::clone(session),
            }),
        }
    }

    pub fn handle(&self) -> i32 {
        self.inner.handle
    }

    pub fn delegate_name(&self) -> &str {
        &self.inner.delegate
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.inner.binding.as_ref().ok()
    }

    pub fn thunk(&self) -> Option<Thunk> {
        self.binding().map(|binding| binding.thunk)
    }

    pub fn is_inert(&self) -> bool {
        self.inner.binding.is_err()
    }

    pub fn resolution_error(&self) -> Option<&BridgeError> {
        self.inner.binding.as_ref().err()
    }

    /// Invoke the foreign function. Failures are logged and yield the
    /// default value of the shape's return kind.
    pub fn call(&self, args: &[Value]) -> Value {
        match self.try_call(args) {
            Ok(value) => value,
            Err(e) => {
                log::error!(
                    "Callback {} ({}) failed: {} (args: {})",
                    self.handle(),
                    self.delegate_name(),
                    e,
                    self.inner.session.render_args(args)
                );
                self.default_result()
            }
        }
    }

    pub fn try_call(&self, args: &[Value]) -> Result<Value> {
        let Some(binding) = self.binding() else {
            log::trace!("Inert callback {} called", self.handle());
            return Ok(Value::Null);
        };
        let shape = &binding.shape;
        if args.len() != shape.arity() {
            return Err(BridgeError::ArityMismatch {
                expected: shape.arity(),
                actual: args.len(),
            });
        }

        let args = args
            .iter()
            .zip(&shape.params)
            .map(|(arg, kind)| if arg.fits(*kind) { Ok(arg.clone()) } else { arg.convert(*kind) })
            .collect::<Result<Vec<_>>>()?;

        let session = &self.inner.session;
        let raw = session
            .runtime
            .invoke(self.handle(), &args)
            .map_err(|e| BridgeError::invocation(self.handle(), &self.inner.delegate, &e))?;

        match shape.returns {
            None => Ok(Value::Null),
            Some(kind) => {
                let result = session.lift(raw);
                if result.fits(kind) {
                    Ok(result)
                } else {
                    result.convert(kind)
                }
            }
        }
    }

    fn default_result(&self) -> Value {
        self.binding()
            .and_then(|binding| binding.shape.returns)
            .map_or(Value::Null, Value::default_for)
    }

    /// Typed view over this trampoline; the argument tuple's arity must match
    /// the bound shape (inert trampolines accept any)
    pub fn typed<A: ArgList, R: FromValue + Default>(&self) -> Result<TypedCallback<A, R>> {
        if let Some(binding) = self.binding() {
            if binding.shape.arity() != A::ARITY {
                return Err(BridgeError::ArityMismatch {
                    expected: binding.shape.arity(),
                    actual: A::ARITY,
                });
            }
        }
        Ok(TypedCallback {
            trampoline: self.clone(),
            _marker: PhantomData,
        })
    }

    /// Release the callback handle now; later drops are no-ops
    pub fn dispose(&self) -> bool {
        self.inner
            .session
            .release_trampoline(self.inner.handle, self.inner.token)
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("handle", &self.handle())
            .field("delegate", &self.delegate_name())
            .field("thunk", &self.thunk())
            .finish()
    }
}

/// Argument tuples of arity 0 to 16
pub trait ArgList {
    const ARITY: usize;

    fn into_values(self) -> Vec<Value>;
}

macro_rules! impl_arg_list {
    ($arity:expr; $($name:ident),*) => {
        impl<$($name: IntoValue),*> ArgList for ($($name,)*) {
            const ARITY: usize = $arity;

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)*) = self;
                vec![$($name.into_value()),*]
            }
        }
    };
}

impl_arg_list!(0;);
impl_arg_list!(1; A0);
impl_arg_list!(2; A0, A1);
impl_arg_list!(3; A0, A1, A2);
impl_arg_list!(4; A0, A1, A2, A3);
impl_arg_list!(5; A0, A1, A2, A3, A4);
impl_arg_list!(6; A0, A1, A2, A3, A4, A5);
impl_arg_list!(7; A0, A1, A2, A3, A4, A5, A6);
impl_arg_list!(8; A0, A1, A2, A3, A4, A5, A6, A7);
impl_arg_list!(9; A0, A1, A2, A3, A4, A5, A6, A7, A8);
impl_arg_list!(10; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9);
impl_arg_list!(11; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);
impl_arg_list!(12; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11);
impl_arg_list!(13; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12);
impl_arg_list!(14; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13);
impl_arg_list!(15; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14);
impl_arg_list!(16; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15);

/// A trampoline called with a Rust argument tuple and returning `R`
pub struct TypedCallback<A, R> {
    trampoline: Trampoline,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A: ArgList, R: FromValue + Default> TypedCallback<A, R> {
    pub fn call(&self, args: A) -> R {
        let value = self.trampoline.call(&args.into_values());
        match R::from_value(value) {
            Some(result) => result,
            None => {
                log::warn!(
                    "Result of callback {} does not convert to {}",
                    self.trampoline.handle(),
                    std::any::type_name::<R>()
                );
                R::default()
            }
        }
    }

    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }
}

impl<A, R> Clone for TypedCallback<A, R> {
    fn clone(&self) -> Self {
        Self {
            trampoline: self.trampoline.clone(),
            _marker: PhantomData,
        }
    }
}

fn resolve_binding(session: &Session, delegate: &str) -> Result<Binding> {
    let config = &session.config.trampoline;
    let shape = session.catalog.resolve(delegate, config.reference_depth)?;
    if shape.arity() > config.max_arity {
        return Err(BridgeError::TooManyParameters {
            name: shape.name.clone(),
            arity: shape.arity(),
            max: config.max_arity,
        });
    }
    Ok(Binding {
        thunk: Thunk::for_shape(&shape),
        shape,
    })
}
