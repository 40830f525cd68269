//! The reliability executor.
//!
//! One call runs as a sequence of attempts under the retry strategy. Every
//! attempt acquires the rate limiter, then sends the request and follows
//! 301/302/303 redirects by hand when automatic redirects are disabled, and
//! finally hands the response to the response pipeline.

use crate::cancel::CancelToken;
use crate::codec::Codec;
use crate::descriptor::ReturnShape;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::rate_limit::RateLimiter;
use crate::resolve::{RequestBody, RequestSpec};
use crate::response::{self, Reply};
use crate::retry::{self, RetryStrategy};
use crate::{Error, Result};
use http::header::LOCATION;
use http::{HeaderName, HeaderValue, StatusCode};
use reqwest::blocking::{Body, Request, Response};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Redirects followed by hand before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Chunk size used when copying a stream body.
pub const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// Immutable per-client state shared by every call.
pub(crate) struct Engine {
    pub(crate) http: reqwest::blocking::Client,
    pub(crate) base_url: Option<String>,
    pub(crate) request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    pub(crate) response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    pub(crate) write_timeout: Duration,
    pub(crate) retry_strategy: RetryStrategy,
    pub(crate) follow_redirects: bool,
    pub(crate) rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) cancel: CancelToken,
}

impl Engine {
    /// Executes `spec` and shapes the response per `shape`.
    pub(crate) fn execute(&self, spec: &RequestSpec, shape: &ReturnShape) -> Result<Reply> {
        self.execute_with_cancel(spec, shape, &self.cancel)
    }

    /// Like [`Engine::execute`], with waits observing `cancel`.
    pub(crate) fn execute_with_cancel(
        &self,
        spec: &RequestSpec,
        shape: &ReturnShape,
        cancel: &CancelToken,
    ) -> Result<Reply> {
        let start = Instant::now();
        let reply = retry::with_retries(&self.retry_strategy, cancel, |attempt| {
            self.attempt(spec, shape, attempt, cancel)
        })?;
        tracing::debug!(
            verb = %spec.verb,
            url = %spec.url,
            latency_ms = start.elapsed().as_millis() as u64,
            "Call completed"
        );
        Ok(reply)
    }

    fn attempt(
        &self,
        spec: &RequestSpec,
        shape: &ReturnShape,
        attempt: usize,
        cancel: &CancelToken,
    ) -> Result<Reply> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire(cancel)?;
        }

        let mut url = Url::parse(&spec.url)?;
        let mut follows = 0;
        loop {
            let response = self.send(spec, &url, attempt)?;
            let Some(next) = self.redirect_target(&response, &url)? else {
                return response::process(
                    response,
                    shape,
                    &self.response_interceptors,
                    self.codec.as_ref(),
                );
            };

            if follows == MAX_REDIRECTS {
                tracing::error!(redirects = follows, location = %next, "Too many redirects");
                return Err(Error::RedirectsExhausted {
                    redirects: follows,
                    location: next.to_string(),
                });
            }
            follows += 1;
            tracing::debug!(
                status = response.status().as_u16(),
                from = %url,
                to = %next,
                redirect = follows,
                "Following redirect"
            );
            url = next;
        }
    }

    /// Where to go next, if the response is a redirect this engine follows by hand.
    fn redirect_target(&self, response: &Response, current: &Url) -> Result<Option<Url>> {
        if self.follow_redirects {
            return Ok(None);
        }
        if !matches!(
            response.status(),
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
        ) {
            return Ok(None);
        }
        let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
        else {
            return Ok(None);
        };
        Ok(Some(current.join(location)?))
    }

    fn send(&self, spec: &RequestSpec, url: &Url, attempt: usize) -> Result<Response> {
        tracing::debug!(
            verb = %spec.verb,
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let mut request = Request::new(spec.verb.method(), url.clone());
        for (name, value) in spec.headers() {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::ConfigurationError(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::ConfigurationError(format!("invalid value for header {name}: {e}"))
            })?;
            request.headers_mut().append(name, value);
        }

        for interceptor in &self.request_interceptors {
            interceptor.intercept(&mut request);
        }

        let write_expired = Arc::new(AtomicBool::new(false));
        match &spec.body {
            None => {}
            Some(RequestBody::Bytes(bytes)) => {
                *request.body_mut() = Some(Body::from(bytes.clone()));
            }
            Some(RequestBody::Value(value)) => {
                *request.body_mut() = Some(Body::from(self.codec.write(value)?));
            }
            Some(RequestBody::Stream(stream)) => {
                let reader = DeadlineReader::new(
                    stream.take()?,
                    self.write_timeout,
                    Arc::clone(&write_expired),
                );
                *request.body_mut() = Some(Body::new(reader));
            }
        }

        let start = Instant::now();
        let response = self.http.execute(request).map_err(|e| {
            if write_expired.load(Ordering::SeqCst) {
                Error::Timeout(format!(
                    "request body was not sent within {:?}",
                    self.write_timeout
                ))
            } else if e.is_timeout() {
                Error::Timeout(e.to_string())
            } else {
                Error::Network(e)
            }
        })?;

        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            attempt = attempt,
            "Received HTTP response"
        );
        Ok(response)
    }
}

/// Copies a stream in fixed-size chunks and fails once the write deadline passes.
struct DeadlineReader {
    inner: Box<dyn Read + Send>,
    timeout: Duration,
    started: Option<Instant>,
    expired: Arc<AtomicBool>,
}

impl DeadlineReader {
    fn new(inner: Box<dyn Read + Send>, timeout: Duration, expired: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            timeout,
            started: None,
            expired,
        }
    }
}

impl Read for DeadlineReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let started = *self.started.get_or_insert_with(Instant::now);
        if started.elapsed() > self.timeout {
            self.expired.store(true, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "write timeout exceeded while streaming request body",
            ));
        }
        let len = buf.len().min(STREAM_CHUNK_SIZE);
        self.inner.read(&mut buf[..len])
    }
}
