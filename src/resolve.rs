//! Turns a method descriptor and call arguments into a concrete request.

use crate::codec::{Codec, Value};
use crate::descriptor::{Argument, MethodDescriptor, ParameterBinding, Verb};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Content type announced for raw byte and stream bodies.
pub const OCTET_STREAM: &str = "application/octet-stream";

const CONTENT_TYPE: &str = "Content-Type";

/// A fully resolved request, ready to be executed.
///
/// Header names are case-sensitive and a repeated name replaces the earlier
/// value in place.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// The HTTP verb.
    pub verb: Verb,
    /// The absolute URL, query string included.
    pub url: String,
    headers: Vec<(String, String)>,
    /// The pending body.
    pub body: Option<RequestBody>,
}

impl RequestSpec {
    /// A request with no headers and no body.
    pub fn new(verb: Verb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The value of the header named exactly `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing the value of an existing header with exactly
    /// the same name in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// The body of a [`RequestSpec`].
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Raw bytes sent with a fixed length.
    Bytes(Vec<u8>),
    /// A reader copied in chunks. It can only be sent once.
    Stream(StreamBody),
    /// A structured value serialized by the client's codec.
    Value(Value),
}

/// A reader that can be handed to the transport exactly once.
#[derive(Clone)]
pub struct StreamBody(Arc<Mutex<Option<Box<dyn Read + Send>>>>);

impl StreamBody {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self(Arc::new(Mutex::new(Some(reader))))
    }

    /// Takes the reader out. Fails once it has already been sent.
    pub fn take(&self) -> Result<Box<dyn Read + Send>> {
        self.0.lock().take().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stream body was already consumed by an earlier attempt",
            ))
        })
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.0.lock().is_some();
        f.debug_struct("StreamBody").field("pending", &pending).finish()
    }
}

/// Resolves one call of `method` into a [`RequestSpec`].
///
/// Arguments are matched to the method's bindings by position. The contract's
/// base URL wins over the client's.
///
/// # Errors
///
/// Returns [`Error::ConfigurationError`] when the method has no verb, no base
/// URL is available, the argument count does not match the bindings, more
/// than one body is bound, a raw argument is bound outside the body, or a
/// static header has no colon.
///
/// # Examples
///
/// ```
/// use restbind::codec::StructuralCodec;
/// use restbind::{resolve, Argument, MethodDescriptor};
///
/// let method = MethodDescriptor::get("/users/{id}")
///     .path_param("id")
///     .query_param("q");
/// let spec = resolve(
///     &method,
///     vec![Argument::from("42"), Argument::from("a b")],
///     None,
///     Some("http://api.test/"),
///     &StructuralCodec,
/// )
/// .unwrap();
/// assert_eq!(spec.url, "http://api.test/users/42?q=a+b");
/// ```
pub fn resolve(
    method: &MethodDescriptor,
    args: Vec<Argument>,
    contract_base_url: Option<&str>,
    client_base_url: Option<&str>,
    codec: &dyn Codec,
) -> Result<RequestSpec> {
    let verb = method.verb().ok_or_else(|| {
        Error::ConfigurationError(format!(
            "method with path '{}' declares no HTTP verb",
            method.path()
        ))
    })?;
    let base_url = [contract_base_url, client_base_url]
        .into_iter()
        .flatten()
        .find(|url| !url.is_empty())
        .ok_or_else(|| Error::ConfigurationError("no base URL configured".to_string()))?;

    let bindings = method.bindings();
    if bindings.len() != args.len() {
        return Err(Error::ConfigurationError(format!(
            "method with path '{}' binds {} parameters but was called with {} arguments",
            method.path(),
            bindings.len(),
            args.len()
        )));
    }

    let mut path_vars: Vec<(&str, String)> = Vec::new();
    let mut query: Vec<(&str, String)> = Vec::new();
    let mut spec = RequestSpec::new(verb, String::new());
    let mut body: Option<RequestBody> = None;
    let mut content_type_guess: Option<String> = None;

    for (binding, arg) in bindings.iter().zip(args) {
        if let ParameterBinding::Body = binding {
            if body.is_some() {
                return Err(Error::ConfigurationError(
                    "a method can bind at most one body parameter".to_string(),
                ));
            }
            let (guess, pending) = match arg {
                Argument::Bytes(bytes) => (OCTET_STREAM.to_string(), RequestBody::Bytes(bytes)),
                Argument::Stream(reader) => (
                    OCTET_STREAM.to_string(),
                    RequestBody::Stream(StreamBody::new(reader)),
                ),
                Argument::Value(value) => (codec.content_type(&value), RequestBody::Value(value)),
            };
            content_type_guess = Some(guess);
            body = Some(pending);
            continue;
        }

        let value = match arg {
            Argument::Value(value) => value,
            raw => {
                return Err(Error::ConfigurationError(format!(
                    "{raw:?} can only be bound to the request body, not {binding:?}"
                )))
            }
        };
        match binding {
            ParameterBinding::Path(name) => path_vars.push((name.as_str(), value.to_plain_string())),
            ParameterBinding::Query(name) => {
                let text = value.to_plain_string();
                match query.iter_mut().find(|(n, _)| *n == name.as_str()) {
                    Some(slot) => slot.1 = text,
                    None => query.push((name.as_str(), text)),
                }
            }
            ParameterBinding::Header(name) if value.is_null() => {
                tracing::trace!(header = %name, "Skipping null header argument");
            }
            ParameterBinding::Header(name) => {
                spec.set_header(name.clone(), value.to_plain_string());
            }
            ParameterBinding::Body => {}
        }
    }

    if let Some(guess) = content_type_guess {
        if spec.header(CONTENT_TYPE).is_none() {
            spec.set_header(CONTENT_TYPE, guess);
        }
    }
    for line in method.static_headers() {
        let (name, value) = parse_static_header(line)?;
        spec.set_header(name, value);
    }

    let path = substitute_path(method.path(), &path_vars);
    spec.url = join_url(base_url, &path, &query);
    spec.body = body;

    tracing::debug!(verb = %spec.verb, url = %spec.url, "Resolved request");
    Ok(spec)
}

/// Splits `"Name: Value"` on the first colon.
fn parse_static_header(line: &str) -> Result<(&str, &str)> {
    let (name, value) = line.split_once(':').ok_or_else(|| {
        Error::ConfigurationError(format!("static header '{line}' is not of the form 'Name: Value'"))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::ConfigurationError(format!(
            "static header '{line}' has an empty name"
        )));
    }
    Ok((name, value.trim()))
}

/// Replaces every `{name}` with its value. Unmatched placeholders stay as they are.
fn substitute_path(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{name}}}"), value)
    })
}

fn join_url(base: &str, path: &str, query: &[(&str, String)]) -> String {
    let mut url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    let pairs: Vec<String> = query
        .iter()
        .filter(|(_, value)| !value.is_empty() && !value.eq_ignore_ascii_case("null"))
        .map(|(name, value)| format!("{}={}", encode_component(name), encode_component(value)))
        .collect();
    if !pairs.is_empty() {
        url.push('?');
        url.push_str(&pairs.join("&"));
    }
    url
}

fn encode_component(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}
