//! Error types shared by the value parser, the event-loop bridge and the
//! script host.
//!
//! ## Error Hierarchy
//!
//! ```text
//! JsError (everything a native binding can raise towards the script)
//! ├── BadArgs   - value parser rejections, path-annotated for nested fields
//! ├── Internal  - native-code contract misuse (not untrusted script input)
//! └── Runtime   - uncaught script error surfaced through a callback
//! ```
//!
//! Timeouts are deliberately *not* part of this hierarchy: a bounded wait
//! that expires is a distinguishable "nothing happened" outcome and is
//! reported through [`WaitOutcome`], never as an error.

use thiserror::Error;

/// Result alias used across the bridge.
pub type JsResult<T> = Result<T, JsError>;

/// Coarse classification of a [`JsError`], used where only the category
/// matters (e.g. deciding whether a failure indicates a native-code bug).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsErrorKind {
    /// The script passed arguments a declaration rejected.
    BadArgs,
    /// A native module violated a bridge contract.
    Internal,
    /// An uncaught error escaped script code.
    Runtime,
}

/// An error surfaced to (or from) script code.
///
/// The payload is always a complete human-readable message; for nested
/// object parsing the offending field path is prepended so messages read
/// as a dotted path to the bad field ("field framing: field parity: ...").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsError {
    /// The script supplied a value that does not match its declaration.
    #[error("{0}")]
    BadArgs(String),

    /// Native code misused a bridge contract (double setup, unimplemented
    /// contract kind, calling a module method before setup).
    #[error("internal error: {0}")]
    Internal(String),

    /// An uncaught error escaped a script callback or the top-level script.
    #[error("{0}")]
    Runtime(String),
}

impl JsError {
    /// Create a [`JsError::BadArgs`] describing a type-check failure.
    pub fn expected(what: &str) -> Self {
        JsError::BadArgs(format!("expected {what}"))
    }

    /// The category of this error.
    pub fn kind(&self) -> JsErrorKind {
        match self {
            JsError::BadArgs(_) => JsErrorKind::BadArgs,
            JsError::Internal(_) => JsErrorKind::Internal,
            JsError::Runtime(_) => JsErrorKind::Runtime,
        }
    }

    /// The bare message, without any kind prefix.
    pub fn message(&self) -> &str {
        match self {
            JsError::BadArgs(m) | JsError::Internal(m) | JsError::Runtime(m) => m,
        }
    }

    /// Return a copy of this error with `prefix` prepended to the message,
    /// keeping the kind. Used to build dotted field paths while unwinding
    /// out of nested object declarations.
    pub fn prepend(&self, prefix: &str) -> Self {
        let msg = format!("{prefix}{}", self.message());
        match self {
            JsError::BadArgs(_) => JsError::BadArgs(msg),
            JsError::Internal(_) => JsError::Internal(msg),
            JsError::Runtime(_) => JsError::Runtime(msg),
        }
    }
}

/// Outcome of a bounded wait.
///
/// Expiry is not an error: callers that poll with a zero timeout or wait
/// with a finite one receive `TimedOut` and decide for themselves whether
/// that is exceptional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The waited-for condition became true.
    Ready,
    /// The timeout elapsed with nothing to report.
    TimedOut,
    /// The host requested a cooperative stop while waiting.
    Stopped,
}
