//! Bridging between Rust types and the dynamic [`Value`] tree.

use super::value::{TypeDescriptor, Value};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use uuid::Uuid;

/// A type the structural codec can encode and decode.
///
/// Implemented for the scalar, temporal, identifier and container types the
/// wire format supports. Records get an implementation from [`crate::record!`].
pub trait Structural: Sized {
    /// Describes the decode target for this type.
    fn descriptor() -> TypeDescriptor;

    /// Converts `self` into a dynamic value.
    fn to_value(&self) -> Value;

    /// Builds an instance from a value decoded against [`Structural::descriptor`].
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &TypeDescriptor, found: &Value) -> Error {
    Error::FormatError(format!("expected {expected}, found {}", found.kind()))
}

impl Structural for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Bool
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

macro_rules! impl_integer {
    ($($ty:ty => $desc:ident as $variant:ident($wide:ty)),* $(,)?) => {
        $(
            impl Structural for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::$desc
                }

                fn to_value(&self) -> Value {
                    Value::$variant(<$wide>::from(*self))
                }

                fn from_value(value: Value) -> Result<Self> {
                    let wide = match value {
                        Value::Int(i) => i128::from(i),
                        Value::UInt(u) => i128::from(u),
                        other => return Err(mismatch(&Self::descriptor(), &other)),
                    };
                    <$ty>::try_from(wide).map_err(|_| {
                        Error::FormatError(format!(
                            "{wide} is out of range for {}",
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

impl_integer!(
    i8 => I8 as Int(i64),
    i16 => I16 as Int(i64),
    i32 => I32 as Int(i64),
    i64 => I64 as Int(i64),
    u8 => U8 as UInt(u64),
    u16 => U16 as UInt(u64),
    u32 => U32 as UInt(u64),
    u64 => U64 as UInt(u64),
);

impl Structural for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::F64
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::UInt(u) => Ok(u as f64),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

impl Structural for f32 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::F32
    }

    fn to_value(&self) -> Value {
        // Widen through the shortest decimal form so 0.1f32 is written as 0.1.
        let widened = self.to_string().parse::<f64>().unwrap_or(f64::from(*self));
        Value::Float(widened)
    }

    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl Structural for char {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Char
    }

    fn to_value(&self) -> Value {
        Value::Char(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Char(c) => Ok(c),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

impl Structural for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

impl Structural for NaiveDateTime {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::DateTime
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

impl Structural for Uuid {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Uuid
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(id) => Ok(id),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

impl<T: Structural> Structural for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Optional(Box::new(T::descriptor()))
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn into_items(value: Value, expected: TypeDescriptor) -> Result<Vec<Value>> {
    match value {
        Value::Seq(items) => Ok(items),
        other => Err(mismatch(&expected, &other)),
    }
}

fn into_entries(value: Value, expected: TypeDescriptor) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(mismatch(&expected, &other)),
    }
}

impl<T: Structural> Structural for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Seq(Box::new(T::descriptor()))
    }

    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(Structural::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        into_items(value, Self::descriptor())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: Structural> Structural for VecDeque<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Queue(Box::new(T::descriptor()))
    }

    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(Structural::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        into_items(value, Self::descriptor())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: Structural + Eq + Hash> Structural for HashSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Set(Box::new(T::descriptor()))
    }

    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(Structural::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        into_items(value, Self::descriptor())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: Structural + Ord> Structural for BTreeSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Set(Box::new(T::descriptor()))
    }

    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(Structural::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        into_items(value, Self::descriptor())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<V: Structural> Structural for HashMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(TypeDescriptor::Text, V::descriptor())
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self> {
        into_entries(value, Self::descriptor())?
            .into_iter()
            .map(|(k, v)| V::from_value(v).map(|v| (k, v)))
            .collect()
    }
}

impl<V: Structural> Structural for BTreeMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(TypeDescriptor::Text, V::descriptor())
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self> {
        into_entries(value, Self::descriptor())?
            .into_iter()
            .map(|(k, v)| V::from_value(v).map(|v| (k, v)))
            .collect()
    }
}
