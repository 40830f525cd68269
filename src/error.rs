//! Error types for contract resolution, transport and decoding.
//!
//! Every failure the engine can produce is a variant of [`Error`]. Errors that
//! come back from the server keep the status, the interceptor-processed body
//! and the response headers so they can be inspected after the fact.

use http::{HeaderMap, StatusCode};

/// The main error type for service calls.
///
/// # Examples
///
/// ```no_run
/// use restbind::{Client, Error};
///
/// # fn example(client: &Client, spec: restbind::RequestSpec) -> Result<(), Error> {
/// match client.execute(spec, &restbind::ReturnShape::Text) {
///     Ok(reply) => println!("Success: {:?}", reply.into_text()?),
///     Err(Error::HttpError { status, raw_response, .. }) => {
///         eprintln!("HTTP error {}: {}", status, raw_response);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The contract or client is misconfigured: a method has no verb, no base
    /// URL can be resolved, a map target has a non-string key, and so on.
    ///
    /// Configuration errors are never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Wire text could not be parsed into the requested target type.
    #[error("Format error: {0}")]
    FormatError(String),

    /// The codec was asked to decode into a type outside its universe.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading a request or response stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded operation ran past its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The call was cancelled while waiting for a retry delay or a rate limit slot.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// The server returned a non-2xx HTTP status code.
    ///
    /// `raw_response` is the body after every response interceptor has run.
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The response body, as processed by the response interceptors
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
        /// Rate limit information parsed from headers
        rate_limit_info: Option<crate::rate_limit::RateLimitInfo>,
    },

    /// The server kept redirecting after the manual redirect cap was reached.
    #[error("Maximum redirects ({redirects}) exceeded, last location: {location}")]
    RedirectsExhausted {
        /// Number of redirects that were followed
        redirects: usize,
        /// The location the server asked for after the cap was hit
        location: String,
    },

    /// Every attempt failed.
    ///
    /// `last_error` is the failure of the final attempt.
    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// The number of attempts made
        attempts: usize,
        /// The last error encountered
        last_error: Box<Error>,
    },

    /// A resolved or redirected URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if another attempt could succeed.
    ///
    /// Transport failures, non-2xx statuses and response decoding failures are
    /// retried. Configuration problems, unsupported types, bad URLs, redirect
    /// exhaustion and interruptions are terminal.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::BAD_REQUEST,
    ///     raw_response: "Bad request".to_string(),
    ///     headers: http::HeaderMap::new(),
    ///     rate_limit_info: None,
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::ConfigurationError("no verb".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Io(_) => true,
            Error::Timeout(_) => true,
            Error::HttpError { .. } => true,
            Error::FormatError(_) => true,
            Error::ConfigurationError(_) => false,
            Error::UnsupportedType(_) => false,
            Error::Interrupted(_) => false,
            Error::RedirectsExhausted { .. } => false,
            Error::MaxRetriesExceeded { .. } => false,
            Error::InvalidUrl(_) => false,
        }
    }

    /// Returns the error of the final attempt, looking through
    /// [`Error::MaxRetriesExceeded`].
    pub fn last_error(&self) -> &Error {
        match self {
            Error::MaxRetriesExceeded { last_error, .. } => last_error.last_error(),
            other => other,
        }
    }

    /// Returns the HTTP status code if the final attempt failed with one.
    pub fn status(&self) -> Option<StatusCode> {
        match self.last_error() {
            Error::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the processed response body if the final attempt failed with one.
    pub fn raw_response(&self) -> Option<&str> {
        match self.last_error() {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns rate limit information if available.
    ///
    /// This is only present for `HttpError` variants that include rate limit headers.
    pub fn rate_limit_info(&self) -> Option<&crate::rate_limit::RateLimitInfo> {
        match self.last_error() {
            Error::HttpError {
                rate_limit_info, ..
            } => rate_limit_info.as_ref(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for service calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http_error(status: u16) -> Error {
        Error::HttpError {
            status: StatusCode::from_u16(status).unwrap(),
            raw_response: "boom".to_string(),
            headers: HeaderMap::new(),
            rate_limit_info: None,
        }
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!Error::ConfigurationError("x".into()).is_retryable());
        assert!(!Error::UnsupportedType("x".into()).is_retryable());
        assert!(!Error::Interrupted("x".into()).is_retryable());
        assert!(!Error::RedirectsExhausted {
            redirects: 5,
            location: "/x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_recoverable_errors_are_retryable() {
        assert!(http_error(404).is_retryable());
        assert!(http_error(503).is_retryable());
        assert!(Error::FormatError("bad".into()).is_retryable());
        assert!(Error::Timeout("write".into()).is_retryable());
    }

    #[test]
    fn test_accessors_look_through_retry_wrapper() {
        let err = Error::MaxRetriesExceeded {
            attempts: 3,
            last_error: Box::new(http_error(502)),
        };
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.raw_response(), Some("boom"));
        assert!(matches!(err.last_error(), Error::HttpError { .. }));
    }
}
