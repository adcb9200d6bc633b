//! Script value handles.

use std::any::Any;
use std::rc::Rc;

/// Opaque pointer carried by a foreign script value.
///
/// Native modules hand these to scripts (contracts, raw addresses) and get
/// them back through the value parser. Type confusion is caught by `Any`
/// downcasting at the use site.
pub type ForeignPtr = Rc<dyn Any>;

/// Handle to a heap-allocated script value.
///
/// The generational index prevents use-after-free style bugs: a stale
/// handle resolves to nothing instead of an unrelated value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapHandle {
    /// Index into the heap's slot vector.
    pub(crate) index: u32,
    /// Generation for stale-handle detection.
    pub(crate) generation: u32,
}

/// A dynamic script value.
///
/// Immediates (undefined, null, booleans, numbers) are stored inline;
/// strings, arrays, objects, functions and foreign pointers live in the
/// [`ValueHeap`](crate::heap::ValueHeap) and are referenced by handle.
/// `JsVal` is `Copy`, which is what lets the bridge keep values in
/// argument buffers and queues the way the engine keeps them on its own
/// stack - rooting, not ownership, is what keeps the backing storage
/// alive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JsVal {
    /// The absent value.
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number; integers are stored as doubles, like the engine does.
    Number(f64),
    /// A heap-backed value (string, array, object, function, foreign).
    Heap(HeapHandle),
}

impl JsVal {
    /// True for `null` and `undefined`, the two values the `permit_null`
    /// declaration flag treats as "absent".
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, JsVal::Null | JsVal::Undefined)
    }

    /// The handle, if this value is heap-backed.
    pub fn handle(&self) -> Option<HeapHandle> {
        match self {
            JsVal::Heap(h) => Some(*h),
            _ => None,
        }
    }
}

impl Default for JsVal {
    fn default() -> Self {
        JsVal::Undefined
    }
}
