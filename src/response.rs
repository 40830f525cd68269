//! The response pipeline and the [`Reply`] it produces.
//!
//! Once the status of the final (post-redirect) response is known, the
//! declared [`ReturnShape`] selects how the body is handled:
//!
//! - `Void` stops without reading the body.
//! - `Bytes` and `Stream` hand back the raw body, error bodies included, and
//!   skip the response interceptors.
//! - `Text` and `Typed` buffer the body, decode it with the charset from the
//!   `Content-Type` header (UTF-8 by default), run every response interceptor
//!   in order, and then enforce the 2xx contract.

use crate::codec::{decode, Codec, Structural, Value};
use crate::descriptor::ReturnShape;
use crate::interceptor::ResponseInterceptor;
use crate::rate_limit::RateLimitInfo;
use crate::{Error, Result};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// The result of one service call.
pub enum Reply {
    /// The method returns nothing.
    Empty,
    /// The raw response body.
    Bytes(Vec<u8>),
    /// The raw response body, unread.
    Stream(Box<dyn Read + Send>),
    /// The interceptor-processed response text.
    Text(String),
    /// The response text decoded by the codec.
    Value(Value),
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Empty)
    }

    /// Converts a decoded reply into `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::codec::Value;
    /// use restbind::Reply;
    ///
    /// let reply = Reply::Value(Value::Seq(vec![Value::Int(1), Value::Int(2)]));
    /// assert_eq!(reply.into_typed::<Vec<u16>>().unwrap(), vec![1, 2]);
    /// ```
    pub fn into_typed<T: Structural>(self) -> Result<T> {
        match self {
            Reply::Value(value) => T::from_value(value),
            Reply::Text(text) => decode(&text),
            other => Err(other.mismatch("a typed value")),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Reply::Text(text) => Ok(text),
            other => Err(other.mismatch("text")),
        }
    }

    /// The raw body. A stream reply is read to the end.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Reply::Bytes(bytes) => Ok(bytes),
            Reply::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
            other => Err(other.mismatch("raw bytes")),
        }
    }

    pub fn into_stream(self) -> Result<Box<dyn Read + Send>> {
        match self {
            Reply::Stream(reader) => Ok(reader),
            Reply::Bytes(bytes) => Ok(Box::new(std::io::Cursor::new(bytes))),
            other => Err(other.mismatch("a stream")),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Reply::Empty => "empty",
            Reply::Bytes(_) => "bytes",
            Reply::Stream(_) => "stream",
            Reply::Text(_) => "text",
            Reply::Value(_) => "value",
        }
    }

    fn mismatch(&self, wanted: &str) -> Error {
        Error::ConfigurationError(format!(
            "asked for {wanted} but the method returned a {} reply",
            self.kind()
        ))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => f.write_str("Empty"),
            Reply::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Reply::Stream(_) => f.write_str("Stream(..)"),
            Reply::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// Runs the pipeline over a received response.
pub(crate) fn process(
    response: reqwest::blocking::Response,
    shape: &ReturnShape,
    interceptors: &[Arc<dyn ResponseInterceptor>],
    codec: &dyn Codec,
) -> Result<Reply> {
    let status = response.status();

    let target = match shape {
        ReturnShape::Void => {
            if !status.is_success() {
                tracing::warn!(status = status.as_u16(), "Ignoring error status for void method");
            }
            return Ok(Reply::Empty);
        }
        ReturnShape::Bytes => return Ok(Reply::Bytes(response.bytes()?.to_vec())),
        ReturnShape::Stream => return Ok(Reply::Stream(Box::new(response))),
        ReturnShape::Text => None,
        ReturnShape::Typed(descriptor) => Some(descriptor),
    };

    let headers = response.headers().clone();
    let raw = response.text_with_charset("utf-8")?;
    let text = interceptors
        .iter()
        .fold(raw, |text, interceptor| interceptor.intercept(status, text));

    if !status.is_success() {
        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), response = %text, "Client error (4xx)");
        } else {
            tracing::warn!(status = status.as_u16(), response = %text, "Server error");
        }
        let rate_limit_info = RateLimitInfo::from_headers(&headers);
        return Err(Error::HttpError {
            status,
            raw_response: text,
            headers,
            rate_limit_info,
        });
    }

    match target {
        None => Ok(Reply::Text(text)),
        Some(descriptor) => codec
            .read(text.as_bytes(), descriptor)
            .map(Reply::Value)
            .map_err(|e| {
                tracing::error!(error = %e, raw_response = %text, "Failed to decode response");
                e
            }),
    }
}
