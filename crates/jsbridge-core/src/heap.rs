//! Generational heap for script values, with explicit rooting.
//!
//! The bridge holds script values past the native call that produced them
//! (subscription argument buffers, queued messages, memoized module
//! objects). Every such value must be rooted on capture and released
//! exactly once on the corresponding teardown path. [`RootGuard`] makes
//! that discipline structural: it roots on `own` and unconditionally
//! releases everything it holds when dropped, on every exit path.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::native_fn::NativeFn;
use crate::value::{ForeignPtr, HeapHandle, JsVal};

/// Heap-resident payload of a script value.
pub enum HeapValue {
    /// An immutable string.
    Str(Rc<str>),
    /// An array of values.
    Array(Vec<JsVal>),
    /// An object with named fields.
    Object(FxHashMap<String, JsVal>),
    /// A callable native function.
    Function(NativeFn),
    /// An opaque foreign pointer.
    Foreign(ForeignPtr),
}

impl HeapValue {
    /// Human-readable name of this value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapValue::Str(_) => "string",
            HeapValue::Array(_) => "array",
            HeapValue::Object(_) => "object",
            HeapValue::Function(_) => "function",
            HeapValue::Foreign(_) => "pointer",
        }
    }
}

struct Slot {
    generation: u32,
    value: Option<HeapValue>,
}

/// Storage for heap-backed script values.
///
/// Slots carry a generation that is bumped on free, so stale handles
/// resolve to `None` instead of whatever reused the slot.
pub struct ValueHeap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    ledger: Rc<RootLedger>,
}

impl ValueHeap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            ledger: Rc::new(RootLedger::default()),
        }
    }

    /// Allocate a value and return its handle.
    pub fn alloc(&mut self, value: HeapValue) -> HeapHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            HeapHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            HeapHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Resolve a handle. Returns `None` for stale handles.
    pub fn get(&self, handle: HeapHandle) -> Option<&HeapValue> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Resolve a handle mutably. Returns `None` for stale handles.
    pub fn get_mut(&mut self, handle: HeapHandle) -> Option<&mut HeapValue> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Root a value so native memory may hold it across calls.
    ///
    /// Immediates are not heap-backed and rooting them is a no-op, mirroring
    /// the engine's own behavior.
    pub fn own(&self, value: JsVal) {
        if let JsVal::Heap(h) = value {
            self.ledger.add(h);
        }
    }

    /// Release one previously taken root.
    pub fn disown(&self, value: JsVal) {
        if let JsVal::Heap(h) = value {
            self.ledger.remove(h);
        }
    }

    /// Total number of outstanding roots. Zero after a clean teardown.
    pub fn live_roots(&self) -> usize {
        self.ledger.total()
    }

    /// Free every slot not reachable from a root.
    ///
    /// The root set is the ledger plus `extra` (the engine passes its
    /// global object). Arrays and objects are traversed; strings,
    /// functions and foreign values are leaves. Freed slots bump their
    /// generation, so handles to collected values resolve to `None`.
    ///
    /// A value held in native memory without a root does not survive a
    /// collection; rooting on capture is what keeps it alive.
    pub fn collect(&mut self, extra: &[HeapHandle]) {
        let mut marked = vec![false; self.slots.len()];
        let mut worklist = self.ledger.handles();
        worklist.extend_from_slice(extra);
        while let Some(handle) = worklist.pop() {
            let Some(slot) = self.slots.get(handle.index as usize) else {
                continue;
            };
            if slot.generation != handle.generation || marked[handle.index as usize] {
                continue;
            }
            marked[handle.index as usize] = true;
            match &slot.value {
                Some(HeapValue::Array(items)) => {
                    worklist.extend(items.iter().filter_map(|v| v.handle()));
                }
                Some(HeapValue::Object(fields)) => {
                    worklist.extend(fields.values().filter_map(|v| v.handle()));
                }
                _ => {}
            }
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_some() && !marked[index] {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
    }

    pub(crate) fn ledger(&self) -> Rc<RootLedger> {
        Rc::clone(&self.ledger)
    }
}

impl Default for ValueHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping of root counts per handle.
///
/// Kept behind an `Rc` so guards can release their roots on drop without
/// borrowing the heap.
#[derive(Default)]
pub(crate) struct RootLedger {
    counts: RefCell<FxHashMap<HeapHandle, u32>>,
}

impl RootLedger {
    fn add(&self, handle: HeapHandle) {
        *self.counts.borrow_mut().entry(handle).or_insert(0) += 1;
    }

    fn remove(&self, handle: HeapHandle) {
        let mut counts = self.counts.borrow_mut();
        match counts.get_mut(&handle) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&handle);
            }
            None => panic!("disown without a matching own"),
        }
    }

    fn total(&self) -> usize {
        self.counts.borrow().values().map(|c| *c as usize).sum()
    }

    fn handles(&self) -> Vec<HeapHandle> {
        self.counts.borrow().keys().copied().collect()
    }
}

/// Scoped collection of roots.
///
/// Everything owned through the guard is released when the guard drops,
/// including on early-return error paths. This is the only way bridge code
/// holds script values in native memory.
pub struct RootGuard {
    ledger: Rc<RootLedger>,
    held: Vec<HeapHandle>,
}

impl RootGuard {
    pub(crate) fn new(ledger: Rc<RootLedger>) -> Self {
        Self {
            ledger,
            held: Vec::new(),
        }
    }

    /// Root `value` for the lifetime of this guard.
    pub fn own(&mut self, value: JsVal) {
        if let JsVal::Heap(h) = value {
            self.ledger.add(h);
            self.held.push(h);
        }
    }

    /// Release one root taken on `value` ahead of the guard's drop.
    ///
    /// Used when a held value is replaced (passthrough slots) or handed
    /// onward (dequeued messages). Releasing a value the guard does not
    /// hold is a native-code bug and panics.
    pub fn disown(&mut self, value: JsVal) {
        if let JsVal::Heap(h) = value {
            let pos = self
                .held
                .iter()
                .position(|held| *held == h)
                .expect("disown of a value this guard does not hold");
            self.held.swap_remove(pos);
            self.ledger.remove(h);
        }
    }

    /// Number of roots currently held by this guard.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        for h in self.held.drain(..) {
            self.ledger.remove(h);
        }
    }
}

impl std::fmt::Debug for RootGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootGuard")
            .field("held", &self.held.len())
            .finish()
    }
}
