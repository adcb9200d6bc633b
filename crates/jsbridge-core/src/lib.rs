//! Core value model of the scripting bridge.
//!
//! This crate holds everything the bridge needs that is independent of the
//! event loop and the script host:
//!
//! - the dynamic value model ([`JsVal`], [`ValueHeap`], rooting via
//!   [`RootGuard`]) and the [`Engine`] boundary native code programs
//!   against,
//! - static value declarations ([`ValueDeclaration`]) and the recursive
//!   [`parse`] walk that converts dynamic values into typed native
//!   outputs,
//! - the shared error taxonomy ([`JsError`], [`WaitOutcome`]) and the
//!   cross-thread [`StopSignal`].

pub mod decl;
pub mod engine;
pub mod error;
pub mod heap;
pub mod native_fn;
pub mod parse;
pub mod signal;
pub mod value;

pub use decl::{
    DefaultValue, EnumVariant, EnumWidth, ObjectField, ParseDeclaration, ValueDeclaration,
    ValueKind,
};
pub use engine::{CallContext, Engine};
pub use error::{JsError, JsErrorKind, JsResult, WaitOutcome};
pub use heap::{HeapValue, RootGuard, ValueHeap};
pub use native_fn::{NativeCallable, NativeFn};
pub use parse::{parse, parse_args, OutSlot, ParseFlags, ParseSource, ValueBuffer};
pub use signal::StopSignal;
pub use value::{ForeignPtr, HeapHandle, JsVal};
