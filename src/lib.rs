//! # restbind - declarative, blocking HTTP service clients
//!
//! restbind turns a service contract (an explicit table of methods with their
//! verb, path template, parameter bindings, static headers and return shape)
//! into HTTP calls. Each call is resolved into a [`RequestSpec`], executed with
//! retries, manual redirects and rate limiting, passed through response
//! interceptors, and decoded with a reflection-free structural codec.
//!
//! All I/O is blocking on the caller's thread.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restbind::{record, Argument, Client, Contract, MethodDescriptor, ReturnShape};
//! use restbind::{Service, ServiceHandler};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! record! {
//!     User { id, name, email }
//! }
//!
//! struct Users(Arc<ServiceHandler>);
//!
//! impl Service for Users {
//!     fn contract() -> Contract {
//!         Contract::builder("Users")
//!             .method(
//!                 "find",
//!                 MethodDescriptor::get("/users/{id}")
//!                     .path_param("id")
//!                     .header("Accept: application/json")
//!                     .returns(ReturnShape::typed::<User>()),
//!             )
//!             .method(
//!                 "create",
//!                 MethodDescriptor::post("/users")
//!                     .body_param()
//!                     .returns(ReturnShape::typed::<User>()),
//!             )
//!             .build()
//!     }
//!
//!     fn bind(handler: Arc<ServiceHandler>) -> Self {
//!         Users(handler)
//!     }
//! }
//!
//! impl Users {
//!     fn find(&self, id: u64) -> restbind::Result<User> {
//!         self.0.call("find", vec![Argument::of(&id)])
//!     }
//!
//!     fn create(&self, user: &User) -> restbind::Result<User> {
//!         self.0.call("create", vec![Argument::of(user)])
//!     }
//! }
//!
//! fn main() -> Result<(), restbind::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .max_retries(3)
//!         .build()?;
//!
//!     let users = client.service::<Users>();
//!     let user = users.find(123)?;
//!     println!("User: {}", user.name);
//!
//!     let created = users.create(&User {
//!         name: "Alice".to_string(),
//!         ..Default::default()
//!     })?;
//!     println!("Created user with ID: {}", created.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is an [`Error`]. HTTP errors keep the status, the
//! interceptor-processed body and the response headers:
//!
//! ```no_run
//! use restbind::{Error, ServiceHandler};
//!
//! # fn example(users: &ServiceHandler) {
//! match users.invoke("list", vec![]) {
//!     Ok(reply) => println!("Success: {reply:?}"),
//!     Err(e) if e.status().is_some() => {
//!         eprintln!("HTTP error {:?}: {:?}", e.status(), e.raw_response());
//!     }
//!     Err(Error::ConfigurationError(msg)) => eprintln!("Bad contract: {msg}"),
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Retries
//!
//! Transport failures, non-2xx statuses and decode failures are retried;
//! configuration problems are not.
//!
//! ```no_run
//! use restbind::{Client, RetryStrategy};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), restbind::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .retry_strategy(RetryStrategy::ExponentialBackoff {
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(30),
//!         max_retries: 5,
//!         jitter: true,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod cancel;
mod client;
pub mod codec;
mod descriptor;
mod error;
mod executor;
pub mod interceptor;
pub mod rate_limit;
mod resolve;
mod response;
pub mod retry;
mod service;

pub use cancel::CancelToken;
pub use client::{
    Client, ClientBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
pub use descriptor::{
    Argument, Contract, ContractBuilder, MethodDescriptor, ParameterBinding, ReturnShape, Verb,
};
pub use error::{Error, Result};
pub use executor::{MAX_REDIRECTS, STREAM_CHUNK_SIZE};
pub use interceptor::{LoggingInterceptor, RequestInterceptor, ResponseInterceptor};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitInfo, RateLimiter};
pub use resolve::{resolve, RequestBody, RequestSpec, StreamBody, OCTET_STREAM};
pub use response::Reply;
pub use retry::RetryStrategy;
pub use service::{Service, ServiceHandler};
