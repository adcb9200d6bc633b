//! Embedded-scripting bridge: declarative value parsing, an event-loop
//! bridge for native waitables, a lazy module registry, and a script
//! execution host.
//!
//! This crate is the facade; the implementation lives in
//! [`jsbridge_core`] (value model, declarations, parser) and
//! [`jsbridge_runtime`] (event loop, registry, globals, host).
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use jsbridge::{HostConfig, JsThread, ThreadEvent};
//! # use std::path::Path;
//! # use jsbridge::{Engine, JsResult, ScriptRuntime};
//! # struct MyInterpreter;
//! # impl ScriptRuntime for MyInterpreter {
//! #     fn exec_file(&mut self, _: &mut Engine, _: &Path) -> JsResult<()> { Ok(()) }
//! # }
//!
//! let thread = JsThread::run(
//!     PathBuf::from("/ext/apps/scripts/demo.js"),
//!     MyInterpreter,
//!     HostConfig::default(),
//!     |event| {
//!         if let ThreadEvent::Print(text) = event {
//!             println!("{text}");
//!         }
//!     },
//! )?;
//! # drop(thread);
//! # Ok::<(), std::io::Error>(())
//! ```

pub use jsbridge_core::{
    parse, parse_args, CallContext, DefaultValue, Engine, EnumVariant, EnumWidth, ForeignPtr,
    HeapHandle, HeapValue, JsError, JsErrorKind, JsResult, JsVal, NativeCallable, NativeFn,
    ObjectField, OutSlot, ParseDeclaration, ParseFlags, ParseSource, RootGuard, StopSignal,
    ValueBuffer, ValueDeclaration, ValueHeap, ValueKind, WaitOutcome,
};
pub use jsbridge_runtime::{
    event_loop, ByteStream, CompositeResolver, Contract, ContractKind, EventDirection, EventLoop,
    EventSink, HostConfig, JsThread, MessageQueue, ModuleDescriptor, ModuleInstance,
    ModuleRegistry, ScriptRuntime, Semaphore, SymbolAddress, SymbolResolver, TableResolver,
    ThreadEvent, TimerMode, Transformer,
};
