//! The dynamic-engine boundary.
//!
//! [`Engine`] is the narrow surface the bridge consumes from the scripting
//! engine: type predicates, typed accessors, value constructors, rooting,
//! a call/apply primitive, an error slot, and the cooperative poll hook.
//! The engine's own interpreter lives behind the host's `ScriptRuntime`
//! boundary and is not part of this crate.

use std::rc::Rc;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::error::{JsError, WaitOutcome};
use crate::heap::{HeapValue, RootGuard, ValueHeap};
use crate::native_fn::NativeFn;
use crate::signal::StopSignal;
use crate::value::{ForeignPtr, JsVal};

/// Context of one native function invocation: `this`, the positional
/// arguments and the return slot.
#[derive(Debug)]
pub struct CallContext {
    this: JsVal,
    args: Vec<JsVal>,
    ret: JsVal,
}

impl CallContext {
    /// Build a context for a call.
    pub fn new(this: JsVal, args: Vec<JsVal>) -> Self {
        Self {
            this,
            args,
            ret: JsVal::Undefined,
        }
    }

    /// The receiver of the call.
    pub fn this(&self) -> JsVal {
        self.this
    }

    /// Number of positional arguments.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Positional argument `index`, or `undefined` past the end - matching
    /// the engine's own out-of-range behavior.
    pub fn arg(&self, index: usize) -> JsVal {
        self.args.get(index).copied().unwrap_or(JsVal::Undefined)
    }

    /// All positional arguments.
    pub fn args(&self) -> &[JsVal] {
        &self.args
    }

    /// Set the value returned to the caller.
    pub fn set_return(&mut self, value: JsVal) {
        self.ret = value;
    }

    /// The value this call will return.
    pub fn return_value(&self) -> JsVal {
        self.ret
    }
}

/// The scripting engine as seen from native code.
pub struct Engine {
    heap: ValueHeap,
    global: JsVal,
    pending_error: Option<JsError>,
    stop: StopSignal,
}

impl Engine {
    /// Create an engine with its own stop signal.
    pub fn new() -> Self {
        Self::with_stop_signal(StopSignal::new())
    }

    /// Create an engine observing an externally owned stop signal.
    pub fn with_stop_signal(stop: StopSignal) -> Self {
        // The global is engine-owned and always reachable; it does not
        // participate in the rooting ledger.
        let mut heap = ValueHeap::new();
        let global = JsVal::Heap(heap.alloc(HeapValue::Object(FxHashMap::default())));
        Self {
            heap,
            global,
            pending_error: None,
            stop,
        }
    }

    /// The global object native bindings are installed on.
    pub fn global(&self) -> JsVal {
        self.global
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    pub fn is_string(&self, v: JsVal) -> bool {
        matches!(self.heap_value(v), Some(HeapValue::Str(_)))
    }

    pub fn is_number(&self, v: JsVal) -> bool {
        matches!(v, JsVal::Number(_))
    }

    pub fn is_boolean(&self, v: JsVal) -> bool {
        matches!(v, JsVal::Bool(_))
    }

    pub fn is_array(&self, v: JsVal) -> bool {
        matches!(self.heap_value(v), Some(HeapValue::Array(_)))
    }

    pub fn is_object(&self, v: JsVal) -> bool {
        matches!(self.heap_value(v), Some(HeapValue::Object(_)))
    }

    pub fn is_function(&self, v: JsVal) -> bool {
        matches!(self.heap_value(v), Some(HeapValue::Function(_)))
    }

    pub fn is_foreign(&self, v: JsVal) -> bool {
        matches!(self.heap_value(v), Some(HeapValue::Foreign(_)))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The string payload, if `v` is a string.
    pub fn get_string(&self, v: JsVal) -> Option<Rc<str>> {
        match self.heap_value(v) {
            Some(HeapValue::Str(s)) => Some(Rc::clone(s)),
            _ => None,
        }
    }

    /// The number truncated to `i32`, if `v` is a number.
    pub fn get_int32(&self, v: JsVal) -> Option<i32> {
        match v {
            JsVal::Number(n) => Some(n as i32),
            _ => None,
        }
    }

    /// The number, if `v` is a number.
    pub fn get_double(&self, v: JsVal) -> Option<f64> {
        match v {
            JsVal::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The boolean, if `v` is a boolean.
    pub fn get_bool(&self, v: JsVal) -> Option<bool> {
        match v {
            JsVal::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The foreign pointer, if `v` is foreign.
    pub fn get_foreign(&self, v: JsVal) -> Option<ForeignPtr> {
        match self.heap_value(v) {
            Some(HeapValue::Foreign(p)) => Some(Rc::clone(p)),
            _ => None,
        }
    }

    /// Downcast a foreign value to a concrete native type.
    ///
    /// This is how native modules verify that a script handed back a
    /// pointer of the kind they expect.
    pub fn foreign_as<T: 'static>(&self, v: JsVal) -> Option<Rc<T>> {
        self.get_foreign(v).and_then(|p| p.downcast::<T>().ok())
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn mk_string(&mut self, s: &str) -> JsVal {
        JsVal::Heap(self.heap.alloc(HeapValue::Str(Rc::from(s))))
    }

    pub fn mk_number(&mut self, n: f64) -> JsVal {
        JsVal::Number(n)
    }

    pub fn mk_boolean(&mut self, b: bool) -> JsVal {
        JsVal::Bool(b)
    }

    pub fn mk_object(&mut self) -> JsVal {
        JsVal::Heap(self.heap.alloc(HeapValue::Object(FxHashMap::default())))
    }

    pub fn mk_array(&mut self, items: Vec<JsVal>) -> JsVal {
        JsVal::Heap(self.heap.alloc(HeapValue::Array(items)))
    }

    pub fn mk_function(&mut self, f: NativeFn) -> JsVal {
        JsVal::Heap(self.heap.alloc(HeapValue::Function(f)))
    }

    pub fn mk_foreign(&mut self, ptr: ForeignPtr) -> JsVal {
        JsVal::Heap(self.heap.alloc(HeapValue::Foreign(ptr)))
    }

    // ========================================================================
    // Objects and arrays
    // ========================================================================

    /// Set a named field on an object.
    pub fn set_field(&mut self, obj: JsVal, name: &str, value: JsVal) -> Result<(), JsError> {
        match obj.handle().and_then(|h| self.heap.get_mut(h)) {
            Some(HeapValue::Object(fields)) => {
                fields.insert(name.to_owned(), value);
                Ok(())
            }
            _ => Err(JsError::Internal(format!(
                "set_field on a non-object ({})",
                self.type_name(obj)
            ))),
        }
    }

    /// Read a named field. Absent fields and non-objects read as
    /// `undefined`, matching the engine's property lookup.
    pub fn get_field(&self, obj: JsVal, name: &str) -> JsVal {
        match self.heap_value(obj) {
            Some(HeapValue::Object(fields)) => {
                fields.get(name).copied().unwrap_or(JsVal::Undefined)
            }
            _ => JsVal::Undefined,
        }
    }

    /// Array length, if `v` is an array.
    pub fn array_len(&self, v: JsVal) -> Option<usize> {
        match self.heap_value(v) {
            Some(HeapValue::Array(items)) => Some(items.len()),
            _ => None,
        }
    }

    /// Array element, or `undefined` out of range.
    pub fn array_get(&self, v: JsVal, index: usize) -> JsVal {
        match self.heap_value(v) {
            Some(HeapValue::Array(items)) => {
                items.get(index).copied().unwrap_or(JsVal::Undefined)
            }
            _ => JsVal::Undefined,
        }
    }

    /// Append to an array.
    pub fn array_push(&mut self, v: JsVal, value: JsVal) -> Result<(), JsError> {
        match v.handle().and_then(|h| self.heap.get_mut(h)) {
            Some(HeapValue::Array(items)) => {
                items.push(value);
                Ok(())
            }
            _ => Err(JsError::Internal(format!(
                "array_push on a non-array ({})",
                self.type_name(v)
            ))),
        }
    }

    // ========================================================================
    // Rooting
    // ========================================================================

    /// Root a value so native memory may hold it past this call.
    pub fn own(&self, v: JsVal) {
        self.heap.own(v);
    }

    /// Release one root taken with [`Engine::own`].
    pub fn disown(&self, v: JsVal) {
        self.heap.disown(v);
    }

    /// A fresh RAII guard; everything owned through it is released when it
    /// drops.
    pub fn root_guard(&self) -> RootGuard {
        RootGuard::new(self.heap.ledger())
    }

    /// Outstanding root count, for leak checks at teardown.
    pub fn live_root_count(&self) -> usize {
        self.heap.live_roots()
    }

    /// Free heap values unreachable from the global object and the roots.
    ///
    /// Must only be called between native calls, when no unrooted value is
    /// held on a native stack. The event loop collects after each callback;
    /// the interpreter may collect between instruction bursts.
    pub fn collect(&mut self) {
        match self.global.handle() {
            Some(global) => self.heap.collect(&[global]),
            None => self.heap.collect(&[]),
        }
    }

    // ========================================================================
    // Calls and errors
    // ========================================================================

    /// Call `callback` with the given receiver and arguments.
    ///
    /// An error set on the engine during the call (the thrown-exception
    /// path) takes precedence over the callable's returned error; both
    /// surface as `Err`.
    pub fn apply(
        &mut self,
        callback: JsVal,
        this: JsVal,
        args: &[JsVal],
    ) -> Result<JsVal, JsError> {
        let func = match self.heap_value(callback) {
            Some(HeapValue::Function(f)) => f.clone(),
            _ => {
                return Err(JsError::BadArgs(format!(
                    "value of type {} is not callable",
                    self.type_name(callback)
                )));
            }
        };
        let mut ctx = CallContext::new(this, args.to_vec());
        let result = func.call(self, &mut ctx);
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        result.map(|_| ctx.return_value())
    }

    /// Record an error as the engine-visible exception for the current
    /// call. Overwrites any earlier pending error.
    pub fn set_error(&mut self, err: JsError) {
        self.pending_error = Some(err);
    }

    /// Take the pending error, clearing it.
    pub fn take_error(&mut self) -> Option<JsError> {
        self.pending_error.take()
    }

    // ========================================================================
    // Cooperative stop
    // ========================================================================

    /// The poll hook the interpreter calls between instructions; true when
    /// the host asked the script thread to wind down.
    pub fn poll_stop(&self) -> bool {
        self.stop.is_raised()
    }

    /// Cancellable sleep; returns [`WaitOutcome::Stopped`] if the host
    /// raised the stop signal before the delay elapsed.
    pub fn delay(&self, duration: Duration) -> WaitOutcome {
        self.stop.wait_for(duration)
    }

    /// A clone of the stop signal, for wrapped blocking primitives.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    // ========================================================================
    // Display
    // ========================================================================

    /// Human-oriented rendering used by `print` and the console bindings.
    pub fn to_display_string(&self, v: JsVal) -> String {
        match v {
            JsVal::Undefined => "undefined".into(),
            JsVal::Null => "null".into(),
            JsVal::Bool(b) => b.to_string(),
            JsVal::Number(n) => format_number(n),
            JsVal::Heap(_) => match self.heap_value(v) {
                Some(HeapValue::Str(s)) => s.to_string(),
                Some(HeapValue::Array(items)) => {
                    let parts: Vec<String> =
                        items.iter().map(|i| self.to_display_string(*i)).collect();
                    parts.join(",")
                }
                Some(HeapValue::Object(_)) => "[object Object]".into(),
                Some(HeapValue::Function(_)) => "[function]".into(),
                Some(HeapValue::Foreign(_)) => "[foreign]".into(),
                None => "undefined".into(),
            },
        }
    }

    /// Type name for error messages.
    pub fn type_name(&self, v: JsVal) -> &'static str {
        match v {
            JsVal::Undefined => "undefined",
            JsVal::Null => "null",
            JsVal::Bool(_) => "bool",
            JsVal::Number(_) => "number",
            JsVal::Heap(_) => match self.heap_value(v) {
                Some(hv) => hv.type_name(),
                None => "undefined",
            },
        }
    }

    fn heap_value(&self, v: JsVal) -> Option<&HeapValue> {
        v.handle().and_then(|h| self.heap.get(h))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("live_roots", &self.live_root_count())
            .field("pending_error", &self.pending_error)
            .finish()
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
