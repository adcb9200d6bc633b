//! Event-loop contracts.
//!
//! A contract is the value a native module hands to `subscribe`: a tagged
//! description of one waitable object plus whatever the loop needs to turn
//! a raw readiness event into the script-visible payload. Contracts cross
//! the script boundary as foreign values and come back through the value
//! parser's `RawPointer` kind.

use std::rc::Rc;
use std::time::Duration;

use jsbridge_core::{Engine, JsResult, JsVal};

use super::waitable::{ByteStream, MessageQueue, Semaphore};

/// Firing behavior of a timer contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerMode {
    /// Rearms after every firing.
    Periodic,
    /// Fires once, then disarms.
    OneShot,
}

/// Which side of a semaphore or queue the subscription waits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventDirection {
    /// Data (or a permit) is available to consume.
    In,
    /// Room is available to produce.
    Out,
}

/// Converts a ready waitable into the callback's payload argument.
///
/// The closure captures its own waitable, so the loop never needs to know
/// how to dequeue a module's message format. Queue and stream contracts
/// require one; there is no generically correct way to turn an opaque
/// native message into a script value.
pub type Transformer = Rc<dyn Fn(&mut Engine) -> JsResult<JsVal>>;

/// Kind-specific payload of a contract.
pub enum ContractKind {
    Timer {
        mode: TimerMode,
        interval: Duration,
    },
    Semaphore {
        semaphore: Rc<Semaphore>,
        direction: EventDirection,
        /// Optional; without one the payload is `undefined` and readiness
        /// itself consumes the permit.
        transformer: Option<Transformer>,
    },
    Queue {
        queue: Rc<MessageQueue>,
        direction: EventDirection,
        transformer: Transformer,
    },
    Stream {
        stream: Rc<ByteStream>,
        transformer: Transformer,
    },
}

impl std::fmt::Debug for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Timer { mode, interval } => f
                .debug_struct("Timer")
                .field("mode", mode)
                .field("interval", interval)
                .finish(),
            ContractKind::Semaphore { direction, .. } => f
                .debug_struct("Semaphore")
                .field("direction", direction)
                .finish_non_exhaustive(),
            ContractKind::Queue { direction, .. } => f
                .debug_struct("Queue")
                .field("direction", direction)
                .finish_non_exhaustive(),
            ContractKind::Stream { .. } => f.debug_struct("Stream").finish_non_exhaustive(),
        }
    }
}

/// A subscribable description of one native waitable.
#[derive(Debug)]
pub struct Contract {
    pub kind: ContractKind,
}

impl Contract {
    pub fn timer(mode: TimerMode, interval: Duration) -> Rc<Self> {
        Rc::new(Self {
            kind: ContractKind::Timer { mode, interval },
        })
    }

    pub fn semaphore(
        semaphore: Rc<Semaphore>,
        direction: EventDirection,
        transformer: Option<Transformer>,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind: ContractKind::Semaphore {
                semaphore,
                direction,
                transformer,
            },
        })
    }

    pub fn queue(
        queue: Rc<MessageQueue>,
        direction: EventDirection,
        transformer: Transformer,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind: ContractKind::Queue {
                queue,
                direction,
                transformer,
            },
        })
    }

    pub fn stream(stream: Rc<ByteStream>, transformer: Transformer) -> Rc<Self> {
        Rc::new(Self {
            kind: ContractKind::Stream { stream, transformer },
        })
    }
}
