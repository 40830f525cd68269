//! The structural codec.
//!
//! Converts between in-memory values and a JSON-compatible object notation
//! without any reflection: scalars, temporal values, identifiers and
//! containers implement [`Structural`] directly, and records declare an
//! explicit field table with [`crate::record!`].
//!
//! ```
//! use restbind::codec::{decode, encode};
//! use std::collections::BTreeMap;
//!
//! let mut scores = BTreeMap::new();
//! scores.insert("ana".to_string(), vec![3u8, 5]);
//! let text = encode(&scores);
//! assert_eq!(text, r#"{"ana":[3,5]}"#);
//! assert_eq!(decode::<BTreeMap<String, Vec<u8>>>(&text).unwrap(), scores);
//! ```

mod record;
mod structural;
mod text;
mod value;

pub use record::{Field, Record, RecordSchema};
pub use structural::Structural;
pub use text::{decode_value, encode_value, MAX_DEPTH};
pub use value::{FieldDescriptor, RecordDescriptor, TypeDescriptor, Value};

use crate::{Error, Result};

/// Serializes request bodies and deserializes response bodies.
///
/// A client holds exactly one codec. The default is [`StructuralCodec`].
pub trait Codec: Send + Sync {
    /// The media type announced for a body holding `value`.
    fn content_type(&self, value: &Value) -> String;

    /// Serializes a request body.
    fn write(&self, value: &Value) -> Result<Vec<u8>>;

    /// Deserializes a response body against `target`.
    fn read(&self, body: &[u8], target: &TypeDescriptor) -> Result<Value>;
}

/// The object-notation codec, announced as `application/json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralCodec;

impl Codec for StructuralCodec {
    fn content_type(&self, _value: &Value) -> String {
        "application/json".to_string()
    }

    fn write(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(encode_value(value).into_bytes())
    }

    fn read(&self, body: &[u8], target: &TypeDescriptor) -> Result<Value> {
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::FormatError(format!("body is not valid UTF-8: {e}")))?;
        decode_value(text, target)
    }
}

/// Encodes any structural value as wire text.
pub fn encode<T: Structural>(value: &T) -> String {
    encode_value(&value.to_value())
}

/// Decodes wire text into `T`.
///
/// `null` or empty text only decodes for targets that accept a missing value,
/// such as `Option<T>`.
pub fn decode<T: Structural>(text: &str) -> Result<T> {
    T::from_value(decode_value(text, &T::descriptor())?)
}
