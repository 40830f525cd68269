//! Cooperative interruption of blocking waits.

use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cloneable cancellation flag.
///
/// Retry backoff sleeps and rate-limiter waits observe the token; once it is
/// cancelled they return [`Error::Interrupted`] instead of continuing.
///
/// ```
/// use restbind::CancelToken;
/// use std::time::Duration;
///
/// let token = CancelToken::new();
/// let waiter = token.clone();
/// token.cancel();
/// assert!(waiter.sleep(Duration::from_secs(60)).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every current and future wait on this token.
    ///
    /// Cancellation is permanent. Create a new token for later calls.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Fails with [`Error::Interrupted`] if the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Interrupted("call was cancelled".to_string()))
        } else {
            Ok(())
        }
    }

    /// Blocks for `duration` unless the token is cancelled first.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.wake.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        if *cancelled {
            return Err(Error::Interrupted("sleep was cancelled".to_string()));
        }
        Ok(())
    }
}
