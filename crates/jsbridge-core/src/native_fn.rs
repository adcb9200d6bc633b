//! Native function storage and the callable trait.

use std::fmt;
use std::rc::Rc;

use crate::engine::{CallContext, Engine};
use crate::error::JsError;

/// Type-erased native function.
///
/// Wraps any callable implementing [`NativeCallable`], letting functions of
/// different shapes be stored uniformly in the value heap. The inner
/// callable is behind `Rc` so function values can be cheaply copied between
/// slots; the bridge is single-threaded by contract, so no `Arc` is needed.
#[derive(Clone)]
pub struct NativeFn {
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    /// Create a new native function from a callable.
    pub fn new<F>(f: F) -> Self
    where
        F: NativeCallable + 'static,
    {
        Self { inner: Rc::new(f) }
    }

    /// Call this native function with the given context.
    pub fn call(&self, engine: &mut Engine, ctx: &mut CallContext) -> Result<(), JsError> {
        self.inner.call(engine, ctx)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").finish_non_exhaustive()
    }
}

/// Trait for callable native functions.
///
/// The callable receives the engine (for value construction and rooting)
/// and a [`CallContext`] holding `this`, the positional arguments and the
/// return slot.
pub trait NativeCallable {
    /// Invoke the function.
    fn call(&self, engine: &mut Engine, ctx: &mut CallContext) -> Result<(), JsError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut Engine, &mut CallContext) -> Result<(), JsError>,
{
    fn call(&self, engine: &mut Engine, ctx: &mut CallContext) -> Result<(), JsError> {
        (self)(engine, ctx)
    }
}
