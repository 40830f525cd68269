//! Typed service bindings on top of the dispatch handler.

use crate::cancel::CancelToken;
use crate::codec::Structural;
use crate::descriptor::{Argument, Contract};
use crate::executor::Engine;
use crate::resolve::resolve;
use crate::response::Reply;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// A typed facade over one contract.
///
/// `contract` returns the method table; `bind` wraps the shared handler in the
/// facade type. Facade methods forward to [`ServiceHandler::invoke`] or
/// [`ServiceHandler::call`].
///
/// # Examples
///
/// ```no_run
/// use restbind::{Client, Contract, MethodDescriptor, ReturnShape, Service, ServiceHandler};
/// use std::sync::Arc;
///
/// struct Health(Arc<ServiceHandler>);
///
/// impl Service for Health {
///     fn contract() -> Contract {
///         Contract::builder("Health")
///             .method("ping", MethodDescriptor::get("/ping").returns(ReturnShape::Text))
///             .build()
///     }
///
///     fn bind(handler: Arc<ServiceHandler>) -> Self {
///         Health(handler)
///     }
/// }
///
/// impl Health {
///     fn ping(&self) -> restbind::Result<String> {
///         self.0.invoke("ping", vec![])?.into_text()
///     }
/// }
///
/// # fn example() -> restbind::Result<()> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
/// println!("{}", client.service::<Health>().ping()?);
/// # Ok(())
/// # }
/// ```
pub trait Service: Sized + 'static {
    /// The method table of this service.
    fn contract() -> Contract;

    /// Wraps the client's handler for this contract.
    fn bind(handler: Arc<ServiceHandler>) -> Self;
}

/// Dispatches calls on one contract through a client.
///
/// A client creates at most one handler per contract type and shares it among
/// all callers.
pub struct ServiceHandler {
    contract: Contract,
    engine: Arc<Engine>,
}

impl ServiceHandler {
    pub(crate) fn new(contract: Contract, engine: Arc<Engine>) -> Self {
        Self { contract, engine }
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Resolves and executes one call of `method`.
    pub fn invoke(&self, method: &str, args: Vec<Argument>) -> Result<Reply> {
        self.invoke_with_cancel(method, args, &self.engine.cancel)
    }

    /// Like [`ServiceHandler::invoke`], but retry sleeps and rate limit waits
    /// observe `cancel` instead of the client's token, so cancelling it
    /// interrupts this call alone.
    pub fn invoke_with_cancel(
        &self,
        method: &str,
        args: Vec<Argument>,
        cancel: &CancelToken,
    ) -> Result<Reply> {
        let descriptor = self.contract.method(method)?;
        let spec = resolve(
            descriptor,
            args,
            self.contract.base_url(),
            self.engine.base_url.as_deref(),
            self.engine.codec.as_ref(),
        )?;
        tracing::debug!(
            contract = %self.contract.name(),
            method = method,
            "Invoking service method"
        );
        self.engine
            .execute_with_cancel(&spec, descriptor.return_shape(), cancel)
    }

    /// Like [`ServiceHandler::invoke`], converting the reply into `T`.
    pub fn call<T: Structural>(&self, method: &str, args: Vec<Argument>) -> Result<T> {
        self.invoke(method, args)?.into_typed()
    }
}

impl fmt::Debug for ServiceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandler")
            .field("contract", &self.contract.name())
            .finish_non_exhaustive()
    }
}
