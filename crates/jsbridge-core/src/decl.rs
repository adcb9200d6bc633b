//! Static declarations of expected script-value shapes.
//!
//! A [`ValueDeclaration`] tree describes what a native binding expects from
//! the script: a primitive, an enum of named variants, or an object with
//! named, recursively declared fields. Declarations are pure data; the walk
//! lives in [`parse`](crate::parse). Bindings define their declarations as
//! `static` items so one tree serves every invocation.

/// Storage width of a parsed enum value.
///
/// The declaration fixes the width; the caller must supply an output slot
/// of exactly that width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumWidth {
    /// Written as `u8`.
    One,
    /// Written as `u16`.
    Two,
    /// Written as `u32`.
    Four,
}

/// One admissible string of an enum declaration and the numeric value it
/// maps to. Matching is linear, first match wins.
#[derive(Debug)]
pub struct EnumVariant {
    pub name: &'static str,
    pub value: u32,
}

/// One named field of an object declaration.
#[derive(Debug)]
pub struct ObjectField {
    pub name: &'static str,
    pub decl: &'static ValueDeclaration,
}

/// The closed set of shapes a declaration can expect.
#[derive(Clone, Copy, Debug)]
pub enum ValueKind {
    /// Any value, passed through untouched.
    Any,
    /// Any array, passed through untouched.
    AnyArray,
    /// Any object, passed through untouched.
    AnyObject,
    /// A callable, passed through untouched.
    Function,
    /// A foreign pointer previously handed to the script by native code.
    RawPointer,
    /// A number, truncated to `i32`.
    Int32,
    /// A number, as `f64`.
    Double,
    /// A string; the source value is kept rooted in the parse buffer for
    /// as long as the converted output stays readable.
    String,
    /// A boolean.
    Bool,
    /// A string mapped to a numeric value of the declared width.
    Enum {
        width: EnumWidth,
        variants: &'static [EnumVariant],
    },
    /// An object with named, recursively declared fields.
    Object { fields: &'static [ObjectField] },
}

/// Default written when an absent value is permitted.
#[derive(Clone, Copy, Debug)]
pub enum DefaultValue {
    /// Zero-equivalent of the declared kind.
    None,
    Int32(i32),
    Double(f64),
    Bool(bool),
    Str(&'static str),
    /// Numeric enum value, written at the declaration's width.
    Enum(u32),
}

/// A single node of a declaration tree.
#[derive(Clone, Copy, Debug)]
pub struct ValueDeclaration {
    pub kind: ValueKind,
    /// When set, `null`/`undefined`/absent parses as `default` instead of
    /// failing.
    pub permit_null: bool,
    pub default: DefaultValue,
}

impl ValueDeclaration {
    /// A required value of the given kind.
    pub const fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            permit_null: false,
            default: DefaultValue::None,
        }
    }

    /// An optional value; absence parses as `default`.
    pub const fn with_default(kind: ValueKind, default: DefaultValue) -> Self {
        Self {
            kind,
            permit_null: true,
            default,
        }
    }

    /// A required enum.
    pub const fn enumeration(width: EnumWidth, variants: &'static [EnumVariant]) -> Self {
        Self::new(ValueKind::Enum { width, variants })
    }

    /// An optional enum; absence (or an unmatched string) parses as the
    /// variant with numeric value `default`.
    pub const fn enumeration_with_default(
        width: EnumWidth,
        variants: &'static [EnumVariant],
        default: u32,
    ) -> Self {
        Self::with_default(ValueKind::Enum { width, variants }, DefaultValue::Enum(default))
    }

    /// A required object.
    pub const fn object(fields: &'static [ObjectField]) -> Self {
        Self::new(ValueKind::Object { fields })
    }

    /// An optional object; absence fills every field with its own default,
    /// recursively.
    pub const fn object_with_defaults(fields: &'static [ObjectField]) -> Self {
        Self {
            kind: ValueKind::Object { fields },
            permit_null: true,
            default: DefaultValue::None,
        }
    }

    /// Number of parse-buffer slots this declaration needs: one per
    /// `String` leaf, transitively.
    pub fn buffer_size(&self) -> usize {
        match &self.kind {
            ValueKind::String => 1,
            ValueKind::Object { fields } => {
                fields.iter().map(|f| f.decl.buffer_size()).sum()
            }
            _ => 0,
        }
    }

    /// Number of output slots this declaration writes: one per leaf, with
    /// objects contributing the sum of their fields.
    pub fn resulting_value_count(&self) -> usize {
        match &self.kind {
            ValueKind::Object { fields } => {
                fields.iter().map(|f| f.decl.resulting_value_count()).sum()
            }
            _ => 1,
        }
    }
}

/// What a parse call runs against: one dynamic value, or the positional
/// arguments of a native call. The source handed to the parser must match
/// the variant; a mismatched pairing is a native-code bug.
#[derive(Debug)]
pub enum ParseDeclaration {
    /// A single value checked against one declaration.
    Value(&'static ValueDeclaration),
    /// Positional arguments checked one declaration each, in order.
    Arguments(&'static [ValueDeclaration]),
}

impl ParseDeclaration {
    /// Parse-buffer slots needed across the whole declaration.
    pub fn buffer_size(&self) -> usize {
        match self {
            ParseDeclaration::Value(d) => d.buffer_size(),
            ParseDeclaration::Arguments(ds) => ds.iter().map(|d| d.buffer_size()).sum(),
        }
    }

    /// Output slots written across the whole declaration, in pre-order.
    pub fn resulting_value_count(&self) -> usize {
        match self {
            ParseDeclaration::Value(d) => d.resulting_value_count(),
            ParseDeclaration::Arguments(ds) => {
                ds.iter().map(|d| d.resulting_value_count()).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PARITY: [EnumVariant; 3] = [
        EnumVariant { name: "none", value: 0 },
        EnumVariant { name: "even", value: 1 },
        EnumVariant { name: "odd", value: 2 },
    ];

    static FRAMING_FIELDS: [ObjectField; 2] = [
        ObjectField {
            name: "label",
            decl: &ValueDeclaration::new(ValueKind::String),
        },
        ObjectField {
            name: "parity",
            decl: &ValueDeclaration::enumeration_with_default(EnumWidth::One, &PARITY, 0),
        },
    ];

    static FRAMING: ValueDeclaration = ValueDeclaration::object_with_defaults(&FRAMING_FIELDS);

    #[test]
    fn buffer_size_counts_string_leaves() {
        assert_eq!(FRAMING.buffer_size(), 1);
        assert_eq!(ValueDeclaration::new(ValueKind::Int32).buffer_size(), 0);
        assert_eq!(ValueDeclaration::new(ValueKind::String).buffer_size(), 1);

        static NESTED_FIELDS: [ObjectField; 2] = [
            ObjectField { name: "inner", decl: &FRAMING },
            ObjectField {
                name: "path",
                decl: &ValueDeclaration::new(ValueKind::String),
            },
        ];
        let nested = ValueDeclaration::object(&NESTED_FIELDS);
        assert_eq!(nested.buffer_size(), 2);
    }

    #[test]
    fn resulting_value_count_flattens_objects() {
        assert_eq!(FRAMING.resulting_value_count(), 2);
        static ARGS: [ValueDeclaration; 2] = [
            ValueDeclaration::new(ValueKind::String),
            ValueDeclaration::new(ValueKind::Int32),
        ];
        assert_eq!(ParseDeclaration::Arguments(&ARGS).resulting_value_count(), 2);
        assert_eq!(ParseDeclaration::Value(&FRAMING).resulting_value_count(), 2);
    }
}
