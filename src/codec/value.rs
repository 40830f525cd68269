//! The dynamic value tree and the type descriptors that drive decoding.

use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// An in-memory value in the codec's type universe.
///
/// Records and string-keyed maps share the [`Value::Map`] representation; the
/// entry order is the order the encoder writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Text(String),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    Seq(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::Char(_) => "character",
            Value::Text(_) => "text",
            Value::DateTime(_) => "date-time",
            Value::Uuid(_) => "uuid",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "object",
        }
    }

    /// Renders the value the way it appears in a path segment, query string or
    /// header: text without quotes, scalars in their literal form, `null` for
    /// null and the wire encoding for containers.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Text(s) => s.clone(),
            Value::DateTime(dt) => super::text::format_date_time(dt),
            Value::Uuid(id) => id.hyphenated().to_string(),
            Value::Seq(_) | Value::Map(_) => super::text::encode_value(self),
        }
    }
}

/// Describes the target of a decode.
///
/// Container targets carry the descriptors of their elements so nested
/// structures decode without looking at the text to guess types.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    Text,
    DateTime,
    Uuid,
    /// A value that may be `null`.
    Optional(Box<TypeDescriptor>),
    /// An ordered sequence.
    Seq(Box<TypeDescriptor>),
    /// A first-in first-out queue.
    Queue(Box<TypeDescriptor>),
    /// An unordered collection; duplicates collapse on decode.
    Set(Box<TypeDescriptor>),
    /// A mapping. Only [`TypeDescriptor::Text`] keys can be decoded.
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    /// A user-defined structured record.
    Record(RecordDescriptor),
    /// A type the codec does not know how to decode.
    Opaque(Cow<'static, str>),
}

impl TypeDescriptor {
    /// Descriptor of a sequence of `element`.
    pub fn seq(element: TypeDescriptor) -> Self {
        TypeDescriptor::Seq(Box::new(element))
    }

    /// Descriptor of a map from `key` to `value`.
    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Descriptor of a type outside the supported universe.
    pub fn opaque(name: impl Into<Cow<'static, str>>) -> Self {
        TypeDescriptor::Opaque(name.into())
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::I8 => f.write_str("i8"),
            TypeDescriptor::I16 => f.write_str("i16"),
            TypeDescriptor::I32 => f.write_str("i32"),
            TypeDescriptor::I64 => f.write_str("i64"),
            TypeDescriptor::U8 => f.write_str("u8"),
            TypeDescriptor::U16 => f.write_str("u16"),
            TypeDescriptor::U32 => f.write_str("u32"),
            TypeDescriptor::U64 => f.write_str("u64"),
            TypeDescriptor::F32 => f.write_str("f32"),
            TypeDescriptor::F64 => f.write_str("f64"),
            TypeDescriptor::Char => f.write_str("char"),
            TypeDescriptor::Text => f.write_str("text"),
            TypeDescriptor::DateTime => f.write_str("date-time"),
            TypeDescriptor::Uuid => f.write_str("uuid"),
            TypeDescriptor::Optional(inner) => write!(f, "optional<{inner}>"),
            TypeDescriptor::Seq(inner) => write!(f, "seq<{inner}>"),
            TypeDescriptor::Queue(inner) => write!(f, "queue<{inner}>"),
            TypeDescriptor::Set(inner) => write!(f, "set<{inner}>"),
            TypeDescriptor::Map { key, value } => write!(f, "map<{key}, {value}>"),
            TypeDescriptor::Record(record) => f.write_str(record.name),
            TypeDescriptor::Opaque(name) => f.write_str(name),
        }
    }
}

/// Field layout of a record, as seen by the decoder.
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    /// Rust name of the record type.
    pub name: &'static str,
    /// Custom root object name. Informational only.
    pub root_name: Option<&'static str>,
    /// Fields, most-derived first.
    pub fields: Vec<FieldDescriptor>,
}

impl RecordDescriptor {
    /// Finds the field bound to `wire_key`.
    pub fn field(&self, wire_key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.wire_key() == wire_key)
    }
}

/// One record field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// The field's own identifier.
    pub name: &'static str,
    /// Alternate key used on the wire; ignored when empty.
    pub wire_name: Option<&'static str>,
    /// Produces the field's type descriptor. Lazy so records can nest themselves.
    pub descriptor: fn() -> TypeDescriptor,
}

impl FieldDescriptor {
    /// The key this field is written under.
    pub fn wire_key(&self) -> &'static str {
        match self.wire_name {
            Some(wire) if !wire.is_empty() => wire,
            _ => self.name,
        }
    }
}
