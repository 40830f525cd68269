//! Client configuration and the service proxy cache.
//!
//! The [`Client`] type is the main entry point. Use [`ClientBuilder`] to
//! configure and create clients; the resulting configuration is immutable and
//! shared by every call made through the client and its services.

use crate::cancel::CancelToken;
use crate::codec::{Codec, StructuralCodec};
use crate::descriptor::ReturnShape;
use crate::executor::Engine;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::rate_limit::{FixedWindowRateLimiter, RateLimiter};
use crate::resolve::RequestSpec;
use crate::response::Reply;
use crate::retry::RetryStrategy;
use crate::service::{Service, ServiceHandler};
use crate::{Error, Result};
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Default write timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// A blocking HTTP client that executes service contracts.
///
/// The client is cheap to clone; clones share configuration, connection pool
/// and service handlers.
///
/// # Examples
///
/// ```no_run
/// use restbind::{Client, MethodDescriptor, ReturnShape, resolve};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), restbind::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .max_retries(3)
///     .read_timeout(Duration::from_secs(10))
///     .rate_limit(120)?
///     .build()?;
///
/// let method = MethodDescriptor::get("/status").returns(ReturnShape::Text);
/// let spec = resolve(&method, vec![], None, client.base_url(), client.codec())?;
/// let text = client.execute(spec, method.return_shape())?.into_text()?;
/// println!("{text}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    engine: Arc<Engine>,
    services: Arc<Mutex<HashMap<TypeId, Arc<ServiceHandler>>>>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The client-level base URL, if one was configured.
    pub fn base_url(&self) -> Option<&str> {
        self.engine.base_url.as_deref()
    }

    /// The codec used for request bodies and typed replies.
    pub fn codec(&self) -> &dyn Codec {
        self.engine.codec.as_ref()
    }

    /// Executes a resolved request under the client's retry, redirect and
    /// rate limit policies.
    pub fn execute(&self, spec: RequestSpec, shape: &ReturnShape) -> Result<Reply> {
        self.engine.execute(&spec, shape)
    }

    /// Like [`Client::execute`], but waits observe `cancel` instead of the
    /// client's token.
    pub fn execute_with_cancel(
        &self,
        spec: RequestSpec,
        shape: &ReturnShape,
        cancel: &CancelToken,
    ) -> Result<Reply> {
        self.engine.execute_with_cancel(&spec, shape, cancel)
    }

    /// Returns the handler for contract `S`, creating it on first use.
    ///
    /// Concurrent first calls for the same contract observe one handler.
    pub fn create<S: Service>(&self) -> Arc<ServiceHandler> {
        let mut services = self.services.lock();
        let handler = services.entry(TypeId::of::<S>()).or_insert_with(|| {
            let contract = S::contract();
            tracing::debug!(contract = %contract.name(), "Creating service handler");
            Arc::new(ServiceHandler::new(contract, Arc::clone(&self.engine)))
        });
        Arc::clone(handler)
    }

    /// Returns the typed facade for contract `S`.
    pub fn service<S: Service>(&self) -> S {
        S::bind(self.create::<S>())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.engine.base_url)
            .field("retry_strategy", &self.engine.retry_strategy)
            .field("follow_redirects", &self.engine.follow_redirects)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Every option has a default; `build` can be called right away.
///
/// # Examples
///
/// ```no_run
/// use restbind::{ClientBuilder, LoggingInterceptor, RetryStrategy};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), restbind::Error> {
/// let logging = Arc::new(LoggingInterceptor::default());
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .connect_timeout(Duration::from_secs(5))
///     .retry_strategy(RetryStrategy::ExponentialBackoff {
///         initial_delay: Duration::from_millis(100),
///         max_delay: Duration::from_secs(10),
///         max_retries: 3,
///         jitter: true,
///     })
///     .follow_redirects(false)
///     .request_interceptor(logging.clone())
///     .response_interceptor(logging)
///     .proxy("proxy.internal", 3128)?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<String>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    root_certificates: Vec<reqwest::Certificate>,
    accept_invalid_hostnames: bool,
    trust_all: bool,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    retry_strategy: RetryStrategy,
    follow_redirects: bool,
    proxy: Option<reqwest::Proxy>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    codec: Arc<dyn Codec>,
    cancel: CancelToken,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            root_certificates: Vec::new(),
            accept_invalid_hostnames: false,
            trust_all: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry_strategy: RetryStrategy::None,
            follow_redirects: true,
            proxy: None,
            rate_limiter: None,
            codec: Arc::new(StructuralCodec),
            cancel: CancelToken::new(),
        }
    }

    /// Sets the base URL used by contracts that do not declare their own.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();
        Url::parse(url)?;
        self.base_url = Some(url.to_string());
        Ok(self)
    }

    /// Appends a request interceptor.
    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Appends a response interceptor.
    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Trusts an additional root certificate.
    pub fn add_root_certificate(mut self, certificate: reqwest::Certificate) -> Self {
        self.root_certificates.push(certificate);
        self
    }

    /// Trusts an additional PEM-encoded root certificate.
    pub fn add_root_certificate_pem(self, pem: &[u8]) -> Result<Self> {
        let certificate = reqwest::Certificate::from_pem(pem)
            .map_err(|e| Error::ConfigurationError(format!("invalid certificate: {e}")))?;
        Ok(self.add_root_certificate(certificate))
    }

    /// Skips hostname verification while still validating the chain.
    pub fn accept_invalid_hostnames(mut self, accept: bool) -> Self {
        self.accept_invalid_hostnames = accept;
        self
    }

    /// Accepts any server certificate for any host.
    pub fn trust_all_certificates(mut self) -> Self {
        self.trust_all = true;
        self
    }

    /// Bounds the time spent establishing a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bounds each request from sending until the response body has been
    /// read in full.
    ///
    /// This is a total deadline per request, not an idle timeout between
    /// reads: a large body that keeps arriving is still cut off once it runs
    /// out. Raise it for slow downloads.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bounds the time spent streaming a request body.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Retries failed calls up to `retries` times with 100ms, 200ms, 400ms... backoff.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.retry_strategy = RetryStrategy::exponential(retries);
        self
    }

    /// Sets the retry strategy for failed calls.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// When disabled, 301/302/303 responses are followed by hand, at most
    /// five times per attempt.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Routes every request through an HTTP proxy.
    pub fn proxy(mut self, host: &str, port: u16) -> Result<Self> {
        let proxy = reqwest::Proxy::all(format!("http://{host}:{port}"))
            .map_err(|e| Error::ConfigurationError(format!("invalid proxy {host}:{port}: {e}")))?;
        self.proxy = Some(proxy);
        Ok(self)
    }

    /// Limits the client to `per_minute` requests in any 60-second window.
    ///
    /// # Errors
    ///
    /// Returns an error if `per_minute` is zero.
    pub fn rate_limit(self, per_minute: u32) -> Result<Self> {
        let limiter = FixedWindowRateLimiter::per_minute(per_minute)?;
        Ok(self.rate_limiter(Arc::new(limiter)))
    }

    /// Uses a custom rate limiter.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Replaces the default structural codec.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Lets the caller interrupt retry sleeps and rate limit waits.
    ///
    /// The token is shared by every call on the client and cannot be reset:
    /// once cancelled, all current and later waits fail with
    /// [`Error::Interrupted`]. Use [`ServiceHandler::invoke_with_cancel`] or
    /// [`Client::execute_with_cancel`] to interrupt a single call.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be configured, for example
    /// when the TLS backend fails to initialise.
    pub fn build(self) -> Result<Client> {
        let redirect = if self.follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };

        let mut http = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .redirect(redirect);
        for certificate in self.root_certificates {
            http = http.add_root_certificate(certificate);
        }
        if self.trust_all {
            tracing::warn!("TLS certificate and hostname verification is disabled");
            http = http
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        } else if self.accept_invalid_hostnames {
            http = http.danger_accept_invalid_hostnames(true);
        }
        http = match self.proxy {
            Some(proxy) => http.proxy(proxy),
            None => http.no_proxy(),
        };
        let http = http
            .build()
            .map_err(|e| Error::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Client {
            engine: Arc::new(Engine {
                http,
                base_url: self.base_url,
                request_interceptors: self.request_interceptors,
                response_interceptors: self.response_interceptors,
                write_timeout: self.write_timeout,
                retry_strategy: self.retry_strategy,
                follow_redirects: self.follow_redirects,
                rate_limiter: self.rate_limiter,
                codec: self.codec,
                cancel: self.cancel,
            }),
            services: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
