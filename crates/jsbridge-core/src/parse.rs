//! The declarative value parser.
//!
//! [`parse`] walks a [`ParseDeclaration`](crate::decl::ParseDeclaration)
//! against a dynamic source (a single value, or a native call's positional
//! arguments) and writes converted native values through a flat sequence of
//! typed [`OutSlot`]s. Slot order is the pre-order traversal of the
//! declaration tree: arguments and fields in declaration order, recursing
//! into objects before moving to the next sibling. Call sites build their
//! slot list with the same traversal; the parser asserts the counts agree
//! and treats any disagreement as a native-code bug, not an input error.
//!
//! Bad script input is never fatal: it surfaces as
//! [`JsError::BadArgs`](crate::error::JsError), path-annotated for nested
//! fields. Nothing may be read from any output slot after a failure.

use std::rc::Rc;

use bitflags::bitflags;

use crate::decl::{DefaultValue, EnumWidth, ParseDeclaration, ValueDeclaration, ValueKind};
use crate::engine::{CallContext, Engine};
use crate::error::{JsError, JsResult};
use crate::heap::RootGuard;
use crate::value::{ForeignPtr, JsVal};

bitflags! {
    /// Behavior flags for [`parse`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ParseFlags: u32 {
        /// On failure, also set the engine-visible exception so the error
        /// propagates to the script. Without this flag a failure is a
        /// status only, for speculative checks.
        const RAISE_ON_ERROR = 1 << 0;
    }
}

const SLOT_MISMATCH: &str = "output slot type does not match the declaration";

/// One typed destination for a parsed value.
///
/// The slot variant must match the declaration leaf it lines up with;
/// `Enum` leaves additionally fix which width variant is legal.
#[derive(Debug)]
pub enum OutSlot<'a> {
    /// Pass-through kinds (`Any`, `AnyArray`, `AnyObject`, `Function`).
    Value(&'a mut JsVal),
    /// `RawPointer`; absent parses as `None`.
    Ptr(&'a mut Option<ForeignPtr>),
    Int32(&'a mut i32),
    Double(&'a mut f64),
    Bool(&'a mut bool),
    Str(&'a mut Rc<str>),
    Enum8(&'a mut u8),
    Enum16(&'a mut u16),
    Enum32(&'a mut u32),
}

/// Rooting buffer for one parse call.
///
/// Each `String` leaf roots its source value here before the converted
/// output is written, so the backing storage stays live for as long as the
/// caller reads the outputs. Dropping the buffer releases every root.
#[derive(Debug)]
pub struct ValueBuffer {
    guard: RootGuard,
    capacity: usize,
    used: usize,
}

impl ValueBuffer {
    /// A buffer sized for `decl`, per
    /// [`ParseDeclaration::buffer_size`](crate::decl::ParseDeclaration::buffer_size).
    pub fn for_declaration(engine: &Engine, decl: &ParseDeclaration) -> Self {
        Self {
            guard: engine.root_guard(),
            capacity: decl.buffer_size(),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn hold(&mut self, value: JsVal) {
        assert!(
            self.used < self.capacity,
            "parse buffer overflow: buffer sized for a different declaration"
        );
        self.guard.own(value);
        self.used += 1;
    }
}

/// The dynamic source a parse call runs against. Must pair with the
/// declaration variant; a mismatch panics.
#[derive(Debug)]
pub enum ParseSource<'a> {
    Value(JsVal),
    Arguments(&'a CallContext),
}

/// Parse `source` against `decl`, writing converted values through
/// `outputs` in pre-order.
///
/// # Panics
///
/// Panics when the call site disagrees with the declaration: mismatched
/// declaration/source variants, a buffer sized for a different
/// declaration, an output count different from
/// `decl.resulting_value_count()`, or a slot variant that does not match
/// its leaf. These are broken native code, never script input.
pub fn parse(
    engine: &mut Engine,
    decl: &ParseDeclaration,
    flags: ParseFlags,
    source: ParseSource<'_>,
    buffer: &mut ValueBuffer,
    outputs: &mut [OutSlot<'_>],
) -> JsResult<()> {
    assert_eq!(
        buffer.capacity,
        decl.buffer_size(),
        "parse buffer sized for a different declaration"
    );
    assert_eq!(
        outputs.len(),
        decl.resulting_value_count(),
        "output slot count does not match the declaration"
    );

    let mut cursor = 0usize;
    let result = match (decl, source) {
        (ParseDeclaration::Value(d), ParseSource::Value(v)) => {
            parse_value(engine, d, v, buffer, outputs, &mut cursor)
        }
        (ParseDeclaration::Arguments(decls), ParseSource::Arguments(ctx)) => {
            let mut result = Ok(());
            for (index, d) in decls.iter().enumerate() {
                result = parse_value(engine, d, ctx.arg(index), buffer, outputs, &mut cursor);
                if result.is_err() {
                    break;
                }
            }
            result
        }
        _ => panic!("declaration and source variants do not match"),
    };

    if let Err(err) = &result {
        if flags.contains(ParseFlags::RAISE_ON_ERROR) {
            engine.set_error(err.clone());
        }
    }
    result
}

/// Parse a native call's arguments against `decls`, raising the engine
/// exception on failure. The short form every native binding starts with.
pub fn parse_args(
    engine: &mut Engine,
    ctx: &CallContext,
    decls: &'static [ValueDeclaration],
    outputs: &mut [OutSlot<'_>],
) -> JsResult<()> {
    let decl = ParseDeclaration::Arguments(decls);
    let mut buffer = ValueBuffer::for_declaration(engine, &decl);
    parse(
        engine,
        &decl,
        ParseFlags::RAISE_ON_ERROR,
        ParseSource::Arguments(ctx),
        &mut buffer,
        outputs,
    )
}

fn parse_value(
    engine: &mut Engine,
    decl: &ValueDeclaration,
    value: JsVal,
    buffer: &mut ValueBuffer,
    outputs: &mut [OutSlot<'_>],
    cursor: &mut usize,
) -> JsResult<()> {
    let absent = value.is_null_or_undefined();

    if let ValueKind::Object { fields } = &decl.kind {
        if absent && !decl.permit_null {
            return Err(JsError::expected("object"));
        }
        if !absent && !engine.is_object(value) {
            return Err(JsError::expected("object"));
        }
        for field in *fields {
            let field_value = if absent {
                JsVal::Undefined
            } else {
                engine.get_field(value, field.name)
            };
            parse_value(engine, field.decl, field_value, buffer, outputs, cursor)
                .map_err(|e| e.prepend(&format!("field {}: ", field.name)))?;
        }
        return Ok(());
    }

    let slot = next_slot(outputs, cursor);

    if absent && decl.permit_null {
        write_default(decl, slot);
        return Ok(());
    }

    match &decl.kind {
        ValueKind::Any => {
            write_value(slot, value);
            Ok(())
        }
        ValueKind::AnyArray => {
            if !engine.is_array(value) {
                return Err(JsError::expected("array"));
            }
            write_value(slot, value);
            Ok(())
        }
        ValueKind::AnyObject => {
            if !engine.is_object(value) {
                return Err(JsError::expected("object"));
            }
            write_value(slot, value);
            Ok(())
        }
        ValueKind::Function => {
            if !engine.is_function(value) {
                return Err(JsError::expected("function"));
            }
            write_value(slot, value);
            Ok(())
        }
        ValueKind::RawPointer => match engine.get_foreign(value) {
            Some(ptr) => {
                match slot {
                    OutSlot::Ptr(out) => **out = Some(ptr),
                    _ => panic!("{SLOT_MISMATCH}"),
                }
                Ok(())
            }
            None => Err(JsError::expected("native pointer")),
        },
        ValueKind::Int32 => match engine.get_int32(value) {
            Some(n) => {
                match slot {
                    OutSlot::Int32(out) => **out = n,
                    _ => panic!("{SLOT_MISMATCH}"),
                }
                Ok(())
            }
            None => Err(JsError::expected("number")),
        },
        ValueKind::Double => match engine.get_double(value) {
            Some(n) => {
                match slot {
                    OutSlot::Double(out) => **out = n,
                    _ => panic!("{SLOT_MISMATCH}"),
                }
                Ok(())
            }
            None => Err(JsError::expected("number")),
        },
        ValueKind::Bool => match engine.get_bool(value) {
            Some(b) => {
                match slot {
                    OutSlot::Bool(out) => **out = b,
                    _ => panic!("{SLOT_MISMATCH}"),
                }
                Ok(())
            }
            None => Err(JsError::expected("boolean")),
        },
        ValueKind::String => match engine.get_string(value) {
            Some(s) => {
                // The source stays rooted for as long as the output is
                // readable; the converted string aliases its storage.
                buffer.hold(value);
                match slot {
                    OutSlot::Str(out) => **out = s,
                    _ => panic!("{SLOT_MISMATCH}"),
                }
                Ok(())
            }
            None => Err(JsError::expected("string")),
        },
        ValueKind::Enum { width, variants } => {
            let Some(s) = engine.get_string(value) else {
                return Err(JsError::expected("string"));
            };
            match variants.iter().find(|v| v.name == &*s) {
                Some(variant) => {
                    write_enum(*width, slot, variant.value);
                    Ok(())
                }
                None if decl.permit_null => {
                    write_default(decl, slot);
                    Ok(())
                }
                None => {
                    let choices: Vec<&str> = variants.iter().map(|v| v.name).collect();
                    Err(JsError::BadArgs(format!(
                        "must be one of: {}",
                        choices.join(", ")
                    )))
                }
            }
        }
        ValueKind::Object { .. } => unreachable!("objects are handled before slot consumption"),
    }
}

fn next_slot<'s, 'a>(outputs: &'s mut [OutSlot<'a>], cursor: &mut usize) -> &'s mut OutSlot<'a> {
    let slot = &mut outputs[*cursor];
    *cursor += 1;
    slot
}

fn write_value(slot: &mut OutSlot<'_>, value: JsVal) {
    match slot {
        OutSlot::Value(out) => **out = value,
        _ => panic!("{SLOT_MISMATCH}"),
    }
}

fn write_enum(width: EnumWidth, slot: &mut OutSlot<'_>, value: u32) {
    match (width, slot) {
        (EnumWidth::One, OutSlot::Enum8(out)) => **out = value as u8,
        (EnumWidth::Two, OutSlot::Enum16(out)) => **out = value as u16,
        (EnumWidth::Four, OutSlot::Enum32(out)) => **out = value,
        _ => panic!("enum output slot does not match the declared width"),
    }
}

fn write_default(decl: &ValueDeclaration, slot: &mut OutSlot<'_>) {
    match (&decl.kind, decl.default) {
        (ValueKind::Any | ValueKind::AnyArray | ValueKind::AnyObject | ValueKind::Function, _) => {
            write_value(slot, JsVal::Undefined);
        }
        (ValueKind::RawPointer, _) => match slot {
            OutSlot::Ptr(out) => **out = None,
            _ => panic!("{SLOT_MISMATCH}"),
        },
        (ValueKind::Int32, default) => {
            let n = match default {
                DefaultValue::Int32(n) => n,
                _ => 0,
            };
            match slot {
                OutSlot::Int32(out) => **out = n,
                _ => panic!("{SLOT_MISMATCH}"),
            }
        }
        (ValueKind::Double, default) => {
            let n = match default {
                DefaultValue::Double(n) => n,
                _ => 0.0,
            };
            match slot {
                OutSlot::Double(out) => **out = n,
                _ => panic!("{SLOT_MISMATCH}"),
            }
        }
        (ValueKind::Bool, default) => {
            let b = match default {
                DefaultValue::Bool(b) => b,
                _ => false,
            };
            match slot {
                OutSlot::Bool(out) => **out = b,
                _ => panic!("{SLOT_MISMATCH}"),
            }
        }
        (ValueKind::String, default) => {
            let s = match default {
                DefaultValue::Str(s) => s,
                _ => "",
            };
            match slot {
                OutSlot::Str(out) => **out = Rc::from(s),
                _ => panic!("{SLOT_MISMATCH}"),
            }
        }
        (ValueKind::Enum { width, .. }, default) => {
            let v = match default {
                DefaultValue::Enum(v) => v,
                _ => 0,
            };
            write_enum(*width, slot, v);
        }
        (ValueKind::Object { .. }, _) => {
            unreachable!("objects are handled before slot consumption")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{EnumVariant, ObjectField};
    use crate::error::JsErrorKind;

    static DATA_BITS: [EnumVariant; 2] = [
        EnumVariant { name: "7", value: 7 },
        EnumVariant { name: "8", value: 8 },
    ];

    static PARITY: [EnumVariant; 3] = [
        EnumVariant { name: "none", value: 0 },
        EnumVariant { name: "even", value: 1 },
        EnumVariant { name: "odd", value: 2 },
    ];

    static FRAMING_FIELDS: [ObjectField; 2] = [
        ObjectField {
            name: "dataBits",
            decl: &ValueDeclaration::enumeration_with_default(EnumWidth::One, &DATA_BITS, 8),
        },
        ObjectField {
            name: "parity",
            decl: &ValueDeclaration::enumeration_with_default(EnumWidth::One, &PARITY, 0),
        },
    ];

    static FRAMING: ValueDeclaration = ValueDeclaration::object_with_defaults(&FRAMING_FIELDS);
    static FRAMING_PARSE: ParseDeclaration = ParseDeclaration::Value(&FRAMING);

    fn parse_framing(engine: &mut Engine, source: JsVal) -> JsResult<(u8, u8)> {
        let mut data_bits = 0u8;
        let mut parity = 0u8;
        let mut buffer = ValueBuffer::for_declaration(engine, &FRAMING_PARSE);
        parse(
            engine,
            &FRAMING_PARSE,
            ParseFlags::empty(),
            ParseSource::Value(source),
            &mut buffer,
            &mut [OutSlot::Enum8(&mut data_bits), OutSlot::Enum8(&mut parity)],
        )?;
        Ok((data_bits, parity))
    }

    #[test]
    fn null_object_with_defaults_fills_every_leaf() {
        let mut engine = Engine::new();
        assert_eq!(parse_framing(&mut engine, JsVal::Null).unwrap(), (8, 0));
        assert_eq!(parse_framing(&mut engine, JsVal::Undefined).unwrap(), (8, 0));
    }

    #[test]
    fn object_fields_override_defaults() {
        let mut engine = Engine::new();
        let obj = engine.mk_object();
        let odd = engine.mk_string("odd");
        engine.set_field(obj, "parity", odd).unwrap();
        assert_eq!(parse_framing(&mut engine, obj).unwrap(), (8, 2));
    }

    #[test]
    fn nested_field_error_carries_the_path() {
        let mut engine = Engine::new();
        let obj = engine.mk_object();
        engine.set_field(obj, "parity", JsVal::Number(1.0)).unwrap();
        let err = parse_framing(&mut engine, obj).unwrap_err();
        assert_eq!(err.message(), "field parity: expected string");
        assert_eq!(err.kind(), JsErrorKind::BadArgs);
    }

    #[test]
    fn unmatched_enum_string_lists_the_choices() {
        static STRICT: ValueDeclaration =
            ValueDeclaration::enumeration(EnumWidth::One, &PARITY);
        static DECL: ParseDeclaration = ParseDeclaration::Value(&STRICT);
        let mut engine = Engine::new();
        let bogus = engine.mk_string("mark");
        let mut out = 0u8;
        let mut buffer = ValueBuffer::for_declaration(&engine, &DECL);
        let err = parse(
            &mut engine,
            &DECL,
            ParseFlags::empty(),
            ParseSource::Value(bogus),
            &mut buffer,
            &mut [OutSlot::Enum8(&mut out)],
        )
        .unwrap_err();
        assert_eq!(err.message(), "must be one of: none, even, odd");
    }

    static STRING_THEN_RADIX: [ValueDeclaration; 2] = [
        ValueDeclaration::new(ValueKind::String),
        ValueDeclaration::with_default(ValueKind::Int32, DefaultValue::Int32(10)),
    ];

    fn parse_string_and_radix(engine: &mut Engine, args: Vec<JsVal>) -> JsResult<(Rc<str>, i32)> {
        let ctx = CallContext::new(JsVal::Undefined, args);
        let mut text: Rc<str> = Rc::from("");
        let mut radix = 0i32;
        parse_args(
            engine,
            &ctx,
            &STRING_THEN_RADIX,
            &mut [OutSlot::Str(&mut text), OutSlot::Int32(&mut radix)],
        )?;
        Ok((text, radix))
    }

    #[test]
    fn omitted_trailing_argument_takes_its_default() {
        let mut engine = Engine::new();
        let s = engine.mk_string("42");
        let (text, radix) = parse_string_and_radix(&mut engine, vec![s]).unwrap();
        assert_eq!(&*text, "42");
        assert_eq!(radix, 10);

        let s = engine.mk_string("42");
        let (text, radix) =
            parse_string_and_radix(&mut engine, vec![s, JsVal::Number(16.0)]).unwrap();
        assert_eq!(&*text, "42");
        assert_eq!(radix, 16);
    }

    #[test]
    fn parse_args_raises_the_engine_exception_on_failure() {
        let mut engine = Engine::new();
        let err = parse_string_and_radix(&mut engine, vec![JsVal::Number(1.0)]).unwrap_err();
        assert_eq!(err.message(), "expected string");
        assert_eq!(engine.take_error(), Some(err));
    }

    #[test]
    fn status_only_parse_leaves_the_engine_clean() {
        let mut engine = Engine::new();
        assert!(parse_framing(&mut engine, JsVal::Number(5.0)).is_err());
        assert!(engine.take_error().is_none());
    }

    #[test]
    fn outputs_are_written_in_pre_order() {
        static TAIL: ValueDeclaration = ValueDeclaration::new(ValueKind::Bool);
        static INNER_FIELDS: [ObjectField; 2] = [
            ObjectField {
                name: "a",
                decl: &ValueDeclaration::new(ValueKind::Int32),
            },
            ObjectField {
                name: "b",
                decl: &ValueDeclaration::new(ValueKind::String),
            },
        ];
        static ARGS: [ValueDeclaration; 3] = [
            ValueDeclaration::new(ValueKind::Int32),
            ValueDeclaration::object(&INNER_FIELDS),
            TAIL,
        ];

        let mut engine = Engine::new();
        let inner = engine.mk_object();
        engine.set_field(inner, "a", JsVal::Number(2.0)).unwrap();
        let b = engine.mk_string("mid");
        engine.set_field(inner, "b", b).unwrap();
        let ctx = CallContext::new(
            JsVal::Undefined,
            vec![JsVal::Number(1.0), inner, JsVal::Bool(true)],
        );

        let mut first = 0i32;
        let mut a = 0i32;
        let mut b_out: Rc<str> = Rc::from("");
        let mut tail = false;
        parse_args(
            &mut engine,
            &ctx,
            &ARGS,
            &mut [
                OutSlot::Int32(&mut first),
                OutSlot::Int32(&mut a),
                OutSlot::Str(&mut b_out),
                OutSlot::Bool(&mut tail),
            ],
        )
        .unwrap();
        assert_eq!((first, a, &*b_out, tail), (1, 2, "mid", true));
    }

    #[test]
    fn string_roots_are_released_when_the_buffer_drops() {
        let mut engine = Engine::new();
        let s = engine.mk_string("rooted");
        static DECL_LEAF: ValueDeclaration = ValueDeclaration::new(ValueKind::String);
        static DECL: ParseDeclaration = ParseDeclaration::Value(&DECL_LEAF);
        {
            let mut out: Rc<str> = Rc::from("");
            let mut buffer = ValueBuffer::for_declaration(&engine, &DECL);
            parse(
                &mut engine,
                &DECL,
                ParseFlags::empty(),
                ParseSource::Value(s),
                &mut buffer,
                &mut [OutSlot::Str(&mut out)],
            )
            .unwrap();
            assert_eq!(engine.live_root_count(), 1);
        }
        assert_eq!(engine.live_root_count(), 0);
    }

    #[test]
    #[should_panic(expected = "output slot count")]
    fn output_count_mismatch_is_fatal() {
        static DECL_LEAF: ValueDeclaration = ValueDeclaration::new(ValueKind::Int32);
        static DECL: ParseDeclaration = ParseDeclaration::Value(&DECL_LEAF);
        let mut engine = Engine::new();
        let mut buffer = ValueBuffer::for_declaration(&engine, &DECL);
        let _ = parse(
            &mut engine,
            &DECL,
            ParseFlags::empty(),
            ParseSource::Value(JsVal::Number(1.0)),
            &mut buffer,
            &mut [],
        );
    }

    #[test]
    #[should_panic(expected = "declaration and source variants do not match")]
    fn mismatched_source_pairing_is_fatal() {
        static DECL_LEAF: ValueDeclaration = ValueDeclaration::new(ValueKind::Int32);
        static DECL: ParseDeclaration = ParseDeclaration::Value(&DECL_LEAF);
        let mut engine = Engine::new();
        let ctx = CallContext::new(JsVal::Undefined, vec![]);
        let mut out = 0i32;
        let mut buffer = ValueBuffer::for_declaration(&engine, &DECL);
        let _ = parse(
            &mut engine,
            &DECL,
            ParseFlags::empty(),
            ParseSource::Arguments(&ctx),
            &mut buffer,
            &mut [OutSlot::Int32(&mut out)],
        );
    }
}
