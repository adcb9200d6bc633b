//! The script execution host.
//!
//! One dedicated thread per script: build the engine, the module
//! registry and the symbol resolver, install the globals, execute the
//! file, tear everything down, and report the terminal outcome to the
//! host through the event callback. The host side keeps only a
//! [`JsThread`] handle; `stop()` raises the shared stop signal and joins.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info_span};

use jsbridge_core::{Engine, JsResult, StopSignal};

use crate::globals::{install_globals, EventSink};
use crate::registry::{ModuleDescriptor, ModuleRegistry};
use crate::resolver::{CompositeResolver, SymbolResolver};

/// Host-facing events from a script thread.
///
/// `Print` may occur any number of times while running. Exactly one
/// terminal sequence follows: `Done`, or `Error` optionally followed by
/// `ErrorTrace`. The trace is raw multi-frame text; callers compact it
/// for constrained displays while logs keep the full form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadEvent {
    Done,
    Print(String),
    Error(String),
    ErrorTrace(String),
}

/// The interpreter boundary.
///
/// The bridge owns everything around script execution; the engine that
/// actually parses and runs the file stays behind this trait.
pub trait ScriptRuntime: Send {
    /// Execute the script at `path` to completion against `engine`.
    fn exec_file(&mut self, engine: &mut Engine, path: &Path) -> JsResult<()>;

    /// Stack trace of the most recent failure, if the interpreter kept
    /// one.
    fn stack_trace(&self) -> Option<String> {
        None
    }
}

/// What the host wires into a script thread: requirable modules and
/// native symbol sources.
pub struct HostConfig {
    pub modules: Vec<ModuleDescriptor>,
    pub resolvers: Vec<Box<dyn SymbolResolver>>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            modules: vec![crate::event_loop::descriptor()],
            resolvers: Vec::new(),
        }
    }
}

/// Handle to a running script thread.
pub struct JsThread {
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl JsThread {
    /// Spawn the script thread and start executing `path`.
    ///
    /// `callback` receives every [`ThreadEvent`], on the script thread.
    pub fn run<R, F>(
        path: PathBuf,
        runtime: R,
        config: HostConfig,
        callback: F,
    ) -> io::Result<Self>
    where
        R: ScriptRuntime + 'static,
        F: Fn(ThreadEvent) + Send + 'static,
    {
        let stop = StopSignal::new();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("js-thread".into())
            .spawn(move || script_thread_main(path, runtime, config, thread_stop, callback))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal a cooperative stop and join the thread. Safe to call any
    /// number of times, including after the script already finished.
    pub fn stop(&mut self) {
        self.stop.raise();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// The signal observed by every blocking wait on the script thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}

impl Drop for JsThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn script_thread_main<R, F>(
    path: PathBuf,
    mut runtime: R,
    config: HostConfig,
    stop: StopSignal,
    callback: F,
) where
    R: ScriptRuntime,
    F: Fn(ThreadEvent) + Send + 'static,
{
    let span = info_span!("script", path = %path.display());
    let _span = span.enter();
    debug!("script thread starting");

    let callback = Rc::new(callback);
    let mut engine = Engine::with_stop_signal(stop.clone());
    let registry = Rc::new(RefCell::new(ModuleRegistry::new(&engine, config.modules)));
    let resolver: Rc<dyn SymbolResolver> = Rc::new(CompositeResolver::new(config.resolvers));
    let sink: EventSink = {
        let sink_callback = Rc::clone(&callback);
        Rc::new(move |event| sink_callback(event))
    };

    let result = install_globals(&mut engine, &registry, resolver, sink, &path)
        .and_then(|()| runtime.exec_file(&mut engine, &path));
    // An exception left on the engine outranks whatever the interpreter
    // returned.
    let result = match engine.take_error() {
        Some(err) => Err(err),
        None => result,
    };

    ModuleRegistry::destroy_all(&registry, &mut engine);

    if stop.is_raised() {
        debug!("script stopped by host");
        callback(ThreadEvent::Done);
        return;
    }
    match result {
        Ok(()) => {
            debug!("script finished");
            callback(ThreadEvent::Done);
        }
        Err(err) => {
            callback(ThreadEvent::Error(err.to_string()));
            if let Some(trace) = runtime.stack_trace() {
                callback(ThreadEvent::ErrorTrace(trace));
            }
        }
    }
}
