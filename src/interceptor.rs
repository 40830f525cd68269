//! Hooks around the transport.
//!
//! Request interceptors run in registration order after the request headers
//! are set and before the body is sent. Response interceptors run in
//! registration order on the decoded response text, each receiving the output
//! of the previous one.
//!
//! Closures implement both traits:
//!
//! ```
//! use restbind::Client;
//! use std::sync::Arc;
//!
//! # fn example() -> restbind::Result<()> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .request_interceptor(Arc::new(|request: &mut reqwest::blocking::Request| {
//!         request
//!             .headers_mut()
//!             .insert("x-client", "restbind".parse().unwrap());
//!     }))
//!     .response_interceptor(Arc::new(|_status: http::StatusCode, body: String| body.trim().to_string()))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use http::StatusCode;
use reqwest::blocking::Request;

/// Inspects or mutates an outgoing request.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut Request);
}

/// Inspects or rewrites the text of a response.
pub trait ResponseInterceptor: Send + Sync {
    /// Returns the text handed to the next interceptor.
    fn intercept(&self, status: StatusCode, body: String) -> String;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut Request) + Send + Sync,
{
    fn intercept(&self, request: &mut Request) {
        self(request)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(StatusCode, String) -> String + Send + Sync,
{
    fn intercept(&self, status: StatusCode, body: String) -> String {
        self(status, body)
    }
}

/// Logs every request and response with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor {
    /// Also log response bodies at debug level.
    pub log_bodies: bool,
}

impl LoggingInterceptor {
    pub fn with_bodies() -> Self {
        Self { log_bodies: true }
    }
}

impl RequestInterceptor for LoggingInterceptor {
    fn intercept(&self, request: &mut Request) {
        tracing::info!(
            method = %request.method(),
            url = %request.url(),
            headers = request.headers().len(),
            "Sending HTTP request"
        );
    }
}

impl ResponseInterceptor for LoggingInterceptor {
    fn intercept(&self, status: StatusCode, body: String) -> String {
        if status.is_success() {
            tracing::info!(status = status.as_u16(), bytes = body.len(), "Received HTTP response");
        } else {
            tracing::warn!(status = status.as_u16(), bytes = body.len(), "Received HTTP error response");
        }
        if self.log_bodies {
            tracing::debug!(status = status.as_u16(), body = %body, "Response body");
        }
        body
    }
}
