//! Global bindings installed before the script runs.
//!
//! `print` goes to the host through the thread event sink; `console.*`
//! goes to the log. Everything that takes arguments validates them
//! through the value parser, same as any module binding.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use jsbridge_core::{
    parse_args, CallContext, DefaultValue, Engine, JsError, JsResult, JsVal, NativeFn, OutSlot,
    ValueDeclaration, ValueKind, WaitOutcome,
};

use crate::registry::ModuleRegistry;
use crate::resolver::{SymbolAddress, SymbolResolver};
use crate::thread::ThreadEvent;

/// Receives host-facing events (`Print` here; terminal events are emitted
/// by the thread itself).
pub type EventSink = Rc<dyn Fn(ThreadEvent)>;

static STRING_ARG: [ValueDeclaration; 1] = [ValueDeclaration::new(ValueKind::String)];

static DELAY_ARGS: [ValueDeclaration; 1] = [ValueDeclaration::new(ValueKind::Int32)];

static PARSE_INT_ARGS: [ValueDeclaration; 2] = [
    ValueDeclaration::new(ValueKind::String),
    ValueDeclaration::with_default(ValueKind::Int32, DefaultValue::Int32(10)),
];

/// Install the global bindings on the engine's global object.
pub fn install_globals(
    engine: &mut Engine,
    registry: &Rc<RefCell<ModuleRegistry>>,
    resolver: Rc<dyn SymbolResolver>,
    sink: EventSink,
    script_path: &Path,
) -> JsResult<()> {
    let global = engine.global();

    let print_sink = Rc::clone(&sink);
    let print = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, ctx: &mut CallContext| {
            print_sink(ThreadEvent::Print(join_args(engine, ctx)));
            Ok(())
        },
    ));
    engine.set_field(global, "print", print)?;

    let console = engine.mk_object();
    let log = engine.mk_function(NativeFn::new(
        |engine: &mut Engine, ctx: &mut CallContext| {
            info!(target: "script", "{}", join_args(engine, ctx));
            Ok(())
        },
    ));
    engine.set_field(console, "log", log)?;
    let warn_fn = engine.mk_function(NativeFn::new(
        |engine: &mut Engine, ctx: &mut CallContext| {
            warn!(target: "script", "{}", join_args(engine, ctx));
            Ok(())
        },
    ));
    engine.set_field(console, "warn", warn_fn)?;
    let error_fn = engine.mk_function(NativeFn::new(
        |engine: &mut Engine, ctx: &mut CallContext| {
            error!(target: "script", "{}", join_args(engine, ctx));
            Ok(())
        },
    ));
    engine.set_field(console, "error", error_fn)?;
    let debug_fn = engine.mk_function(NativeFn::new(
        |engine: &mut Engine, ctx: &mut CallContext| {
            debug!(target: "script", "{}", join_args(engine, ctx));
            Ok(())
        },
    ));
    engine.set_field(console, "debug", debug_fn)?;
    engine.set_field(global, "console", console)?;

    let delay = engine.mk_function(NativeFn::new(
        |engine: &mut Engine, ctx: &mut CallContext| {
            let mut ms = 0i32;
            parse_args(engine, ctx, &DELAY_ARGS, &mut [OutSlot::Int32(&mut ms)])?;
            let duration = std::time::Duration::from_millis(ms.max(0) as u64);
            if engine.delay(duration) == WaitOutcome::Stopped {
                // Unwind the script; the host reports a stopped thread as
                // Done, not as an error.
                let err = JsError::Runtime("stopped".into());
                engine.set_error(err.clone());
                return Err(err);
            }
            Ok(())
        },
    ));
    engine.set_field(global, "delay", delay)?;

    let parse_int = engine.mk_function(NativeFn::new(
        |engine: &mut Engine, ctx: &mut CallContext| {
            let mut text: Rc<str> = Rc::from("");
            let mut radix = 0i32;
            parse_args(
                engine,
                ctx,
                &PARSE_INT_ARGS,
                &mut [OutSlot::Str(&mut text), OutSlot::Int32(&mut radix)],
            )?;
            ctx.set_return(JsVal::Number(parse_int_text(&text, radix)));
            Ok(())
        },
    ));
    engine.set_field(global, "parseInt", parse_int)?;

    let requiring = Rc::clone(registry);
    let require = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, ctx: &mut CallContext| {
            let mut name: Rc<str> = Rc::from("");
            parse_args(engine, ctx, &STRING_ARG, &mut [OutSlot::Str(&mut name)])?;
            match ModuleRegistry::require(&requiring, engine, &name) {
                Ok(object) => {
                    ctx.set_return(object);
                    Ok(())
                }
                Err(err) => {
                    engine.set_error(err.clone());
                    Err(err)
                }
            }
        },
    ));
    engine.set_field(global, "require", require)?;

    let ffi_address = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, ctx: &mut CallContext| {
            let mut name: Rc<str> = Rc::from("");
            parse_args(engine, ctx, &STRING_ARG, &mut [OutSlot::Str(&mut name)])?;
            match resolver.resolve(&name) {
                Some(address) => {
                    let foreign = engine.mk_foreign(Rc::new(SymbolAddress(address)));
                    ctx.set_return(foreign);
                }
                None => {
                    warn!(symbol = %name, "unresolved native symbol");
                    ctx.set_return(JsVal::Undefined);
                }
            }
            Ok(())
        },
    ));
    engine.set_field(global, "ffi_address", ffi_address)?;

    let filename = engine.mk_string(&script_path.to_string_lossy());
    engine.set_field(global, "__filename", filename)?;
    let dirname = engine.mk_string(
        &script_path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    engine.set_field(global, "__dirname", dirname)?;

    Ok(())
}

fn join_args(engine: &Engine, ctx: &CallContext) -> String {
    let parts: Vec<String> = ctx
        .args()
        .iter()
        .map(|a| engine.to_display_string(*a))
        .collect();
    parts.join(" ")
}

/// `strtol`-style integer scan: optional sign, longest valid digit
/// prefix, unparseable input yields 0.
fn parse_int_text(text: &str, radix: i32) -> f64 {
    if !(2..=36).contains(&radix) {
        return 0.0;
    }
    let radix = radix as u32;
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let mut value = 0f64;
    let mut seen = false;
    for c in rest.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                value = value * radix as f64 + d as f64;
                seen = true;
            }
            None => break,
        }
    }
    if !seen {
        return 0.0;
    }
    if negative { -value } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TableResolver;
    use std::path::PathBuf;

    fn fixture() -> (Engine, Rc<RefCell<Vec<ThreadEvent>>>) {
        let mut engine = Engine::new();
        let registry = Rc::new(RefCell::new(ModuleRegistry::new(&engine, vec![])));
        let resolver = Rc::new(TableResolver::new([("hal_version_get_name".to_owned(), 0x8000)]));
        let events: Rc<RefCell<Vec<ThreadEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink_events = Rc::clone(&events);
        let sink: EventSink = Rc::new(move |e| sink_events.borrow_mut().push(e));
        install_globals(
            &mut engine,
            &registry,
            resolver,
            sink,
            &PathBuf::from("/ext/apps/scripts/demo.js"),
        )
        .unwrap();
        (engine, events)
    }

    fn call_global(engine: &mut Engine, name: &str, args: &[JsVal]) -> JsResult<JsVal> {
        let global = engine.global();
        let f = engine.get_field(global, name);
        engine.apply(f, global, args)
    }

    #[test]
    fn print_joins_arguments_and_emits_an_event() {
        let (mut engine, events) = fixture();
        let s = engine.mk_string("value:");
        call_global(&mut engine, "print", &[s, JsVal::Number(7.0)]).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![ThreadEvent::Print("value: 7".to_owned())]
        );
    }

    #[test]
    fn parse_int_defaults_to_base_ten() {
        let (mut engine, _) = fixture();
        let s = engine.mk_string("42");
        let out = call_global(&mut engine, "parseInt", &[s]).unwrap();
        assert_eq!(out, JsVal::Number(42.0));

        let s = engine.mk_string("42");
        let out = call_global(&mut engine, "parseInt", &[s, JsVal::Number(16.0)]).unwrap();
        assert_eq!(out, JsVal::Number(66.0));
    }

    #[test]
    fn parse_int_scans_the_longest_valid_prefix() {
        assert_eq!(parse_int_text("  -17px", 10), -17.0);
        assert_eq!(parse_int_text("+ff", 16), 255.0);
        assert_eq!(parse_int_text("zzz", 10), 0.0);
        assert_eq!(parse_int_text("10", 1), 0.0);
        assert_eq!(parse_int_text("", 10), 0.0);
    }

    #[test]
    fn delay_unwinds_when_the_stop_signal_is_raised() {
        let (mut engine, _) = fixture();
        engine.stop_signal().raise();
        let err = call_global(&mut engine, "delay", &[JsVal::Number(10_000.0)]).unwrap_err();
        assert_eq!(err.message(), "stopped");
    }

    #[test]
    fn ffi_address_resolves_known_symbols_only() {
        let (mut engine, _) = fixture();
        let s = engine.mk_string("hal_version_get_name");
        let out = call_global(&mut engine, "ffi_address", &[s]).unwrap();
        assert_eq!(
            engine.foreign_as::<SymbolAddress>(out).as_deref(),
            Some(&SymbolAddress(0x8000))
        );

        let s = engine.mk_string("missing_symbol");
        let out = call_global(&mut engine, "ffi_address", &[s]).unwrap();
        assert_eq!(out, JsVal::Undefined);
    }

    #[test]
    fn script_location_globals_are_set() {
        let (engine, _) = fixture();
        let global = engine.global();
        let filename = engine.get_field(global, "__filename");
        let dirname = engine.get_field(global, "__dirname");
        assert_eq!(&*engine.get_string(filename).unwrap(), "/ext/apps/scripts/demo.js");
        assert_eq!(&*engine.get_string(dirname).unwrap(), "/ext/apps/scripts");
    }

    #[test]
    fn require_surfaces_unknown_modules_as_an_engine_error() {
        let (mut engine, _) = fixture();
        let s = engine.mk_string("no_such_module");
        let err = call_global(&mut engine, "require", &[s]).unwrap_err();
        assert_eq!(err.message(), "unknown module: no_such_module");
    }
}
