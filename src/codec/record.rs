//! Explicit field tables for user-defined records.
//!
//! A record is any `Default` struct with a [`RecordSchema`]: an ordered list of
//! fields, each with its wire key, its type descriptor, and a typed
//! getter/setter pair. Encoding walks the getters and drops null fields;
//! decoding starts from `T::default()` and runs the setter of every
//! recognised key.
//!
//! Most records declare their table with [`crate::record!`]:
//!
//! ```
//! use restbind::record;
//! use restbind::codec::{decode, encode};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Account {
//!     id: u64,
//!     display_name: Option<String>,
//! }
//!
//! record! {
//!     Account {
//!         id,
//!         display_name => "displayName",
//!     }
//! }
//!
//! let account = Account { id: 7, display_name: None };
//! assert_eq!(encode(&account), r#"{"id":7}"#);
//! assert_eq!(decode::<Account>(r#"{"id":7,"extra":true}"#).unwrap(), account);
//! ```

use super::structural::Structural;
use super::value::{FieldDescriptor, RecordDescriptor, TypeDescriptor, Value};
use crate::{Error, Result};

type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<()> + Send + Sync>;

/// A record type with a static field table.
pub trait Record: Default + Sized + 'static {
    /// The record's field table. Built once and shared.
    fn schema() -> &'static RecordSchema<Self>;
}

/// One entry of a [`RecordSchema`].
pub struct Field<T> {
    descriptor: FieldDescriptor,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Field<T> {
    /// Name, wire key and type of the field.
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }
}

/// Ordered field table of a record type.
pub struct RecordSchema<T> {
    name: &'static str,
    root_name: Option<&'static str>,
    fields: Vec<Field<T>>,
}

impl<T: Default + 'static> RecordSchema<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            root_name: None,
            fields: Vec::new(),
        }
    }

    /// Sets the custom root object name. It is carried in the descriptor but
    /// never written to the wire.
    pub fn root_name(mut self, root_name: &'static str) -> Self {
        self.root_name = Some(root_name);
        self
    }

    /// Adds a field written under its own identifier.
    pub fn field<F, G, M>(self, name: &'static str, get: G, get_mut: M) -> Self
    where
        F: Structural + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.field_as(name, None, get, get_mut)
    }

    /// Adds a field written under `wire_name`.
    pub fn renamed<F, G, M>(
        self,
        name: &'static str,
        wire_name: &'static str,
        get: G,
        get_mut: M,
    ) -> Self
    where
        F: Structural + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.field_as(name, Some(wire_name), get, get_mut)
    }

    /// Adds a field with an optional alternate wire name. An empty wire name
    /// means the identifier is used.
    pub fn field_as<F, G, M>(
        mut self,
        name: &'static str,
        wire_name: Option<&'static str>,
        get: G,
        get_mut: M,
    ) -> Self
    where
        F: Structural + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.fields.push(Field {
            descriptor: FieldDescriptor {
                name,
                wire_name,
                descriptor: F::descriptor,
            },
            get: Box::new(move |record| get(record).to_value()),
            set: Box::new(move |record, value| {
                *get_mut(record) = F::from_value(value)?;
                Ok(())
            }),
        });
        self
    }

    /// Appends the fields of an embedded parent record.
    ///
    /// Call it after the record's own fields so the most-derived fields come
    /// first on the wire.
    pub fn inherit<P, G, M>(mut self, get: G, get_mut: M) -> Self
    where
        P: Record,
        G: Fn(&T) -> &P + Clone + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut P + Clone + Send + Sync + 'static,
    {
        for parent in P::schema().fields.iter() {
            let get = get.clone();
            let get_mut = get_mut.clone();
            self.fields.push(Field {
                descriptor: parent.descriptor.clone(),
                get: Box::new(move |record| (parent.get)(get(record))),
                set: Box::new(move |record, value| (parent.set)(get_mut(record), value)),
            });
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    /// The decoder's view of this record.
    pub fn descriptor(&self) -> RecordDescriptor {
        RecordDescriptor {
            name: self.name,
            root_name: self.root_name,
            fields: self.fields.iter().map(|f| f.descriptor.clone()).collect(),
        }
    }

    /// Converts a record into an ordered map, skipping null fields.
    pub fn to_value(&self, record: &T) -> Value {
        Value::Map(
            self.fields
                .iter()
                .filter_map(|field| {
                    let value = (field.get)(record);
                    (!value.is_null()).then(|| (field.descriptor.wire_key().to_string(), value))
                })
                .collect(),
        )
    }

    /// Builds a record from a decoded map. Unknown keys are ignored and null
    /// values leave the field at its default.
    pub fn from_value(&self, value: Value) -> Result<T> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => {
                return Err(Error::FormatError(format!(
                    "expected {} object, found {}",
                    self.name,
                    other.kind()
                )))
            }
        };

        let mut record = T::default();
        for (key, value) in entries {
            if value.is_null() {
                continue;
            }
            if let Some(field) = self
                .fields
                .iter()
                .find(|f| f.descriptor.wire_key() == key)
            {
                (field.set)(&mut record, value).map_err(|e| match e {
                    Error::FormatError(msg) => {
                        Error::FormatError(format!("{}.{}: {msg}", self.name, field.descriptor.name))
                    }
                    other => other,
                })?;
            }
        }
        Ok(record)
    }

    /// The full type descriptor for a record target.
    pub fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::Record(self.descriptor())
    }
}

/// Declares the field table of a `Default` struct and makes it [`Structural`].
///
/// Fields are listed in wire order; `field => "key"` sets an alternate wire
/// name, `as "root"` records a root object name, and a trailing
/// `extends Parent => field` appends the fields of an embedded parent record.
#[macro_export]
macro_rules! record {
    (
        $ty:ident $(as $root:literal)? {
            $($field:ident $(=> $wire:literal)?),* $(,)?
        }
        $(extends $parent:ty => $via:ident)?
    ) => {
        impl $crate::codec::Record for $ty {
            fn schema() -> &'static $crate::codec::RecordSchema<Self> {
                static SCHEMA: ::std::sync::OnceLock<$crate::codec::RecordSchema<$ty>> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    let schema = $crate::codec::RecordSchema::<$ty>::new(stringify!($ty));
                    $(let schema = schema.root_name($root);)?
                    $(
                        let schema = schema.field_as(
                            stringify!($field),
                            $crate::__wire_name!($($wire)?),
                            |r: &$ty| &r.$field,
                            |r: &mut $ty| &mut r.$field,
                        );
                    )*
                    $(
                        let schema = schema.inherit::<$parent, _, _>(
                            |r: &$ty| &r.$via,
                            |r: &mut $ty| &mut r.$via,
                        );
                    )?
                    schema
                })
            }
        }

        impl $crate::codec::Structural for $ty {
            fn descriptor() -> $crate::codec::TypeDescriptor {
                <$ty as $crate::codec::Record>::schema().type_descriptor()
            }

            fn to_value(&self) -> $crate::codec::Value {
                <$ty as $crate::codec::Record>::schema().to_value(self)
            }

            fn from_value(value: $crate::codec::Value) -> $crate::Result<Self> {
                <$ty as $crate::codec::Record>::schema().from_value(value)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __wire_name {
    () => {
        ::std::option::Option::None
    };
    ($wire:literal) => {
        ::std::option::Option::Some($wire)
    };
}
