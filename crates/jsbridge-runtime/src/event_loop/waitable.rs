//! Native waitable primitives the event loop multiplexes.
//!
//! All three are single-thread objects mutated only from the script
//! thread (native bindings and callbacks), so interior mutability is
//! `RefCell`/`Cell`, not locks. Cross-thread wakeups go through the
//! host-wide stop signal instead.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use jsbridge_core::{Engine, JsVal, RootGuard};

/// Counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    count: Cell<u32>,
    max: u32,
}

impl Semaphore {
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            count: Cell::new(initial.min(max)),
            max,
        }
    }

    /// Take one permit if available.
    pub fn try_acquire(&self) -> bool {
        let count = self.count.get();
        if count == 0 {
            return false;
        }
        self.count.set(count - 1);
        true
    }

    /// Return one permit; false when already at capacity.
    pub fn release(&self) -> bool {
        let count = self.count.get();
        if count >= self.max {
            return false;
        }
        self.count.set(count + 1);
        true
    }

    pub fn available(&self) -> u32 {
        self.count.get()
    }

    /// True when a release would succeed.
    pub fn has_room(&self) -> bool {
        self.count.get() < self.max
    }
}

/// Bounded queue of script values.
///
/// Every queued value is rooted on send and released on receive (or when
/// the queue is dropped with messages still inside), so the engine cannot
/// reclaim a payload that only the queue still references.
#[derive(Debug)]
pub struct MessageQueue {
    items: RefCell<VecDeque<JsVal>>,
    capacity: usize,
    guard: RefCell<RootGuard>,
}

impl MessageQueue {
    pub fn new(engine: &Engine, capacity: usize) -> Self {
        Self {
            items: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity,
            guard: RefCell::new(engine.root_guard()),
        }
    }

    /// Enqueue a value; a full queue rejects the send and takes no root.
    pub fn send(&self, value: JsVal) -> bool {
        let mut items = self.items.borrow_mut();
        if items.len() >= self.capacity {
            return false;
        }
        self.guard.borrow_mut().own(value);
        items.push_back(value);
        true
    }

    /// Dequeue the oldest value, handing its root to the caller's side.
    pub fn receive(&self) -> Option<JsVal> {
        let value = self.items.borrow_mut().pop_front()?;
        self.guard.borrow_mut().disown(value);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.len() < self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all pending messages and their roots. Teardown path.
    pub fn clear(&self) {
        let mut items = self.items.borrow_mut();
        let mut guard = self.guard.borrow_mut();
        for value in items.drain(..) {
            guard.disown(value);
        }
    }
}

/// Unbounded byte stream fed by native producers (serial readers and the
/// like) and drained by a contract's transformer.
#[derive(Debug, Default)]
pub struct ByteStream {
    bytes: RefCell<VecDeque<u8>>,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, data: &[u8]) {
        self.bytes.borrow_mut().extend(data.iter().copied());
    }

    /// Take up to `max` bytes from the front.
    pub fn read_up_to(&self, max: usize) -> Vec<u8> {
        let mut bytes = self.bytes.borrow_mut();
        let take = max.min(bytes.len());
        bytes.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.borrow().is_empty()
    }
}
