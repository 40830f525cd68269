//! Service contracts as explicit method tables.
//!
//! A [`Contract`] lists every method of a service with its HTTP verb, path
//! template, parameter bindings, static headers and declared return shape.
//! Tables are built once, usually in [`crate::Service::contract`].

use crate::codec::{Structural, TypeDescriptor, Value};
use crate::{Error, Result};
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// HTTP verb of a service method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
            Verb::Head => Method::HEAD,
            Verb::Patch => Method::PATCH,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Role of one call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBinding {
    /// Substituted for `{name}` in the path template.
    Path(String),
    /// Appended to the query string.
    Query(String),
    /// Sent as a request header.
    Header(String),
    /// The request body. At most one per method.
    Body,
}

/// What a method returns to its caller.
#[derive(Debug, Clone)]
pub enum ReturnShape {
    /// Nothing; the response status is not inspected.
    Void,
    /// The raw body bytes, error bodies included.
    Bytes,
    /// The raw body as a reader, error bodies included.
    Stream,
    /// The decoded response text.
    Text,
    /// The response text decoded by the codec.
    Typed(TypeDescriptor),
}

impl ReturnShape {
    /// The shape for a method returning `T`.
    pub fn typed<T: Structural>() -> Self {
        ReturnShape::Typed(T::descriptor())
    }
}

/// HTTP shape of one service method.
///
/// # Examples
///
/// ```
/// use restbind::{MethodDescriptor, ReturnShape, Verb};
///
/// let find = MethodDescriptor::get("/users/{id}")
///     .path_param("id")
///     .query_param("expand")
///     .header("Accept: application/json")
///     .returns(ReturnShape::Text);
/// assert_eq!(find.verb(), Some(Verb::Get));
/// assert_eq!(find.bindings().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    verb: Option<Verb>,
    path: String,
    bindings: Vec<ParameterBinding>,
    static_headers: Vec<String>,
    returns: ReturnShape,
}

impl Default for MethodDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodDescriptor {
    /// A method with no verb. Calling it fails with a configuration error.
    pub fn new() -> Self {
        Self {
            verb: None,
            path: String::new(),
            bindings: Vec::new(),
            static_headers: Vec::new(),
            returns: ReturnShape::Void,
        }
    }

    /// A method with the given verb and path template.
    pub fn with_verb(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb: Some(verb),
            path: path.into(),
            ..Self::new()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::with_verb(Verb::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::with_verb(Verb::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::with_verb(Verb::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::with_verb(Verb::Delete, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::with_verb(Verb::Head, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::with_verb(Verb::Patch, path)
    }

    /// Binds the next argument to the `{name}` path placeholder.
    pub fn path_param(self, name: impl Into<String>) -> Self {
        self.bind(ParameterBinding::Path(name.into()))
    }

    /// Binds the next argument to a query parameter.
    pub fn query_param(self, name: impl Into<String>) -> Self {
        self.bind(ParameterBinding::Query(name.into()))
    }

    /// Binds the next argument to a request header.
    pub fn header_param(self, name: impl Into<String>) -> Self {
        self.bind(ParameterBinding::Header(name.into()))
    }

    /// Binds the next argument to the request body.
    pub fn body_param(self) -> Self {
        self.bind(ParameterBinding::Body)
    }

    /// Appends a binding. Bindings are matched to arguments by position.
    pub fn bind(mut self, binding: ParameterBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Adds a static `"Name: Value"` header sent with every call.
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.static_headers.push(line.into());
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn verb(&self) -> Option<Verb> {
        self.verb
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    pub fn static_headers(&self) -> &[String] {
        &self.static_headers
    }

    pub fn return_shape(&self) -> &ReturnShape {
        &self.returns
    }
}

/// The method table of one service.
#[derive(Debug, Clone)]
pub struct Contract {
    name: String,
    base_url: Option<String>,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl Contract {
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            contract: Contract {
                name: name.into(),
                base_url: None,
                methods: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL that overrides the client's for this contract.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Result<&Arc<MethodDescriptor>> {
        self.methods.get(name).ok_or_else(|| {
            Error::ConfigurationError(format!(
                "contract {} has no method named '{name}'",
                self.name
            ))
        })
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Builder for [`Contract`].
#[derive(Debug)]
pub struct ContractBuilder {
    contract: Contract,
}

impl ContractBuilder {
    /// Sets a contract-level base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.contract.base_url = Some(url.into());
        self
    }

    /// Adds a method. A later method with the same name replaces an earlier one.
    pub fn method(mut self, name: impl Into<String>, descriptor: MethodDescriptor) -> Self {
        self.contract
            .methods
            .insert(name.into(), Arc::new(descriptor));
        self
    }

    pub fn build(self) -> Contract {
        self.contract
    }
}

/// One call argument.
pub enum Argument {
    /// A structured value.
    Value(Value),
    /// Raw bytes. Only valid for the body.
    Bytes(Vec<u8>),
    /// A raw reader. Only valid for the body.
    Stream(Box<dyn Read + Send>),
}

impl Argument {
    /// Wraps any structural value.
    pub fn of<T: Structural>(value: &T) -> Self {
        Argument::Value(value.to_value())
    }

    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Argument::Stream(Box::new(reader))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Argument::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Argument::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<Vec<u8>> for Argument {
    fn from(bytes: Vec<u8>) -> Self {
        Argument::Bytes(bytes)
    }
}

impl From<&str> for Argument {
    fn from(text: &str) -> Self {
        Argument::Value(Value::Text(text.to_string()))
    }
}

impl From<String> for Argument {
    fn from(text: String) -> Self {
        Argument::Value(Value::Text(text))
    }
}
