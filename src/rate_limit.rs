//! Client-side rate limiting and server rate limit headers.
//!
//! A [`RateLimiter`] is consulted once per attempt before the request is sent.
//! [`RateLimitInfo`] is parsed from the headers of failed responses and
//! attached to [`crate::Error::HttpError`].

use crate::cancel::CancelToken;
use crate::{Error, Result};
use http::HeaderMap;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Length of the window used by [`FixedWindowRateLimiter::per_minute`].
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Grants permission to send a request.
pub trait RateLimiter: Send + Sync {
    /// Blocks until a request may be sent.
    ///
    /// Fails with [`Error::Interrupted`] if `cancel` fires while waiting.
    fn acquire(&self, cancel: &CancelToken) -> Result<()>;
}

/// Admits at most `max_requests` per fixed window.
///
/// The first window opens when the limiter is built; after a window expires
/// the next one opens with the next request.
/// Callers that find the window full wait on a condition variable and re-check
/// the count under the lock every time they wake.
///
/// ```
/// use restbind::rate_limit::{FixedWindowRateLimiter, RateLimiter};
/// use restbind::CancelToken;
///
/// let limiter = FixedWindowRateLimiter::per_minute(2).unwrap();
/// let cancel = CancelToken::new();
/// limiter.acquire(&cancel).unwrap();
/// limiter.acquire(&cancel).unwrap();
/// assert_eq!(limiter.available(), 0);
/// ```
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<WindowState>,
    rolled_over: Condvar,
}

#[derive(Debug)]
struct WindowState {
    started: Instant,
    count: u32,
}

impl FixedWindowRateLimiter {
    /// A limiter admitting `max_requests` every 60 seconds.
    pub fn per_minute(max_requests: u32) -> Result<Self> {
        Self::with_window(max_requests, DEFAULT_WINDOW)
    }

    /// A limiter admitting `max_requests` per `window`.
    pub fn with_window(max_requests: u32, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(Error::ConfigurationError(
                "rate limit must allow at least one request per window".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(Error::ConfigurationError(
                "rate limit window must be longer than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                count: 0,
            }),
            rolled_over: Condvar::new(),
        })
    }

    /// Requests still admitted in the current window.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.roll_over(&mut state, Instant::now());
        self.max_requests - state.count
    }

    fn roll_over(&self, state: &mut WindowState, now: Instant) -> bool {
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
            return true;
        }
        false
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn acquire(&self, cancel: &CancelToken) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            cancel.check()?;
            let now = Instant::now();
            if self.roll_over(&mut state, now) {
                self.rolled_over.notify_all();
            }
            if state.count < self.max_requests {
                state.count += 1;
                return Ok(());
            }

            let reset_at = state.started + self.window;
            tracing::debug!(
                wait_ms = reset_at.saturating_duration_since(now).as_millis() as u64,
                "Rate limit reached, waiting for the window to roll over"
            );
            let _ = self
                .rolled_over
                .wait_until(&mut state, reset_at.min(now + WAIT_SLICE));
        }
    }
}

/// Information extracted from rate limit headers.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// When the rate limit resets (`X-RateLimit-Reset` or `RateLimit-Reset`).
    pub reset_at: Option<SystemTime>,

    /// How long to wait before retrying (`Retry-After`).
    pub retry_after: Option<Duration>,

    /// Number of requests remaining in the current window.
    pub remaining: Option<u64>,

    /// Window size announced by the server (`X-RateLimit-Limit`).
    pub limit: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts rate limit information from response headers.
    ///
    /// Returns `None` when none of the recognised headers are present.
    ///
    /// ```
    /// use restbind::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers).unwrap();
    /// assert!(info.is_rate_limited());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let info = Self {
            reset_at: parse_reset(headers),
            retry_after: parse_retry_after(headers),
            remaining: parse_u64(headers, "x-ratelimit-remaining"),
            limit: parse_u64(headers, "x-ratelimit-limit"),
        };
        let any = info.reset_at.is_some()
            || info.retry_after.is_some()
            || info.remaining.is_some()
            || info.limit.is_some();
        any.then_some(info)
    }

    /// Recommended wait before the next request, capped at `max_wait`.
    ///
    /// Prefers `Retry-After` and falls back to the reset time.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }
        let until_reset = self.reset_at?.duration_since(SystemTime::now()).ok()?;
        Some(until_reset.min(max_wait))
    }

    /// `true` when the server asked to back off or reported no remaining requests.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }
}

/// Parses `Retry-After` as delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?.trim();
    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(header).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .find_map(|name| parse_u64(headers, name))
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
}

fn parse_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(matches!(
            FixedWindowRateLimiter::per_minute(0),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_third_request_waits_for_rollover() {
        let window = Duration::from_millis(300);
        let start = Instant::now();
        let limiter = FixedWindowRateLimiter::with_window(2, window).unwrap();
        let cancel = CancelToken::new();

        limiter.acquire(&cancel).unwrap();
        limiter.acquire(&cancel).unwrap();
        assert!(start.elapsed() < window);

        limiter.acquire(&cancel).unwrap();
        assert!(start.elapsed() >= window);
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_waiting_caller_is_interrupted() {
        let limiter = Arc::new(FixedWindowRateLimiter::per_minute(1).unwrap());
        let cancel = CancelToken::new();
        limiter.acquire(&cancel).unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            thread::spawn(move || limiter.acquire(&cancel))
        };
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        assert!(matches!(waiter.join().unwrap(), Err(Error::Interrupted(_))));
    }

    #[test]
    fn test_concurrent_callers_share_one_window() {
        let window = Duration::from_millis(400);
        let start = Instant::now();
        let limiter = Arc::new(FixedWindowRateLimiter::with_window(3, window).unwrap());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    limiter.acquire(&CancelToken::new()).unwrap();
                    start.elapsed()
                })
            })
            .collect();
        let mut elapsed: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        elapsed.sort();

        assert!(elapsed[2] < window);
        assert!(elapsed[3] >= window);
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        let at = SystemTime::now() + Duration::from_secs(120);
        headers.insert(
            "retry-after",
            HeaderValue::from_str(&httpdate::fmt_http_date(at)).unwrap(),
        );
        let delay = parse_retry_after(&headers).unwrap();
        assert!(delay > Duration::from_secs(100) && delay <= Duration::from_secs(120));
    }

    #[test]
    fn test_info_from_reset_and_remaining() {
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 2;
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("100"));

        let info = RateLimitInfo::from_headers(&headers).unwrap();
        assert_eq!(info.remaining, Some(0));
        assert_eq!(info.limit, Some(100));
        assert!(info.is_rate_limited());

        let delay = info.delay(Duration::from_secs(300)).unwrap();
        assert!(delay <= Duration::from_secs(3));
    }

    #[test]
    fn test_no_headers_means_no_info() {
        assert!(RateLimitInfo::from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_delay_capped_by_max_wait() {
        let info = RateLimitInfo {
            reset_at: None,
            retry_after: Some(Duration::from_secs(600)),
            remaining: Some(0),
            limit: None,
        };
        assert_eq!(info.delay(Duration::from_secs(300)), Some(Duration::from_secs(300)));
    }
}
