//! Runtime half of the scripting bridge: the event-loop bridge, the
//! module registry, the global bindings and the script execution host.
//!
//! The flow mirrors a script's lifetime: [`JsThread::run`] spawns the
//! script thread, installs the globals, and executes the file through a
//! [`ScriptRuntime`]; the script `require`s modules out of the
//! [`ModuleRegistry`]; modules expose waitables to the
//! [`event_loop`](crate::event_loop) as [`Contract`]s; `run()` drives
//! callbacks until stop, idle exhaustion or an uncaught error.

pub mod event_loop;
pub mod globals;
pub mod registry;
pub mod resolver;
pub mod thread;

pub use event_loop::{
    ByteStream, Contract, ContractKind, EventDirection, EventLoop, MessageQueue, Semaphore,
    TimerMode, Transformer,
};
pub use globals::{install_globals, EventSink};
pub use registry::{
    ModuleConstructor, ModuleDescriptor, ModuleDestructor, ModuleInstance, ModuleRegistry,
};
pub use resolver::{CompositeResolver, SymbolAddress, SymbolResolver, TableResolver};
pub use thread::{HostConfig, JsThread, ScriptRuntime, ThreadEvent};
