//! Bounded retries around a single transport call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::StatusCode;
use rand::Rng;

use crate::config::{ExponentialBackoff, RetrySettings};
use crate::error::ClientError;

type CanRetryFn = Arc<dyn Fn(&ClientError) -> bool + Send + Sync>;
type OnRetryFn = Arc<dyn Fn(&ClientError, u32, Duration) + Send + Sync>;
type RetryAfterFn = Arc<dyn Fn(&ClientError) -> Option<Duration> + Send + Sync>;

/// Retry policy for transport calls.
#[derive(Clone)]
pub struct RetryConfig {
    pub backoff: ExponentialBackoff,
    /// Total attempts including the first one
    pub max_attempts: u32,
    can_retry: Option<CanRetryFn>,
    on_retry: Option<OnRetryFn>,
    retry_after: Option<RetryAfterFn>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .field("can_retry", &self.can_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("retry_after", &self.retry_after.is_some())
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            backoff: ExponentialBackoff::from(settings),
            max_attempts: settings.max_attempts,
            can_retry: None,
            on_retry: None,
            retry_after: None,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(backoff: ExponentialBackoff, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
            can_retry: None,
            on_retry: None,
            retry_after: None,
        }
    }

    /// Replace the default retry predicate.
    #[must_use]
    pub fn with_can_retry(
        mut self,
        can_retry: impl Fn(&ClientError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.can_retry = Some(Arc::new(can_retry));
        self
    }

    /// Called before each sleep with the error, the failed attempt number and the delay.
    #[must_use]
    pub fn with_on_retry(
        mut self,
        on_retry: impl Fn(&ClientError, u32, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(on_retry));
        self
    }

    /// Replace the default `Retry-After` lookup, which reads
    /// [`ClientError::retry_after`].
    #[must_use]
    pub fn with_retry_after(
        mut self,
        retry_after: impl Fn(&ClientError) -> Option<Duration> + Send + Sync + 'static,
    ) -> Self {
        self.retry_after = Some(Arc::new(retry_after));
        self
    }

    fn should_retry(&self, err: &ClientError) -> bool {
        match &self.can_retry {
            Some(can_retry) => can_retry(err),
            None => default_can_retry(err),
        }
    }

    fn delay_for(&self, err: &ClientError, attempt: u32) -> Duration {
        let server_delay = match &self.retry_after {
            Some(retry_after) => retry_after(err),
            None => err.retry_after(),
        };
        server_delay
            .unwrap_or_else(|| calculate_backoff(&self.backoff, attempt.saturating_sub(1)))
    }
}

/// How a single request treats the client's retry policy.
#[derive(Clone, Debug, Default)]
pub enum RetryMode {
    /// Use the client's policy, if any
    #[default]
    Inherit,
    Disabled,
    Override(RetryConfig),
}

impl RetryMode {
    pub(crate) fn resolve<'a>(
        &'a self,
        inherited: Option<&'a RetryConfig>,
    ) -> Option<&'a RetryConfig> {
        match self {
            RetryMode::Inherit => inherited,
            RetryMode::Disabled => None,
            RetryMode::Override(config) => Some(config),
        }
    }
}

/// Errors without a status (network failures), 429 and 5xx are retried.
#[must_use]
pub fn default_can_retry(err: &ClientError) -> bool {
    match err {
        ClientError::Compile(_)
        | ClientError::InvalidParams(_)
        | ClientError::InvalidResponse(_)
        | ClientError::MultipleResults => false,
        _ => err.status().is_none_or(|status| {
            status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }),
    }
}

/// Calculate backoff duration for a given retry index (0 after the first failure)
///
/// A non-finite or negative multiplier is treated as 1.0 and the max is capped
/// at one day, so `Duration::from_secs_f64` never sees an invalid value.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, retry: u32) -> Duration {
    // 1 day; anything longer is not a retry delay
    const MAX_BACKOFF_SECS: f64 = 86400.0;

    let retry = i32::try_from(retry).unwrap_or(i32::MAX);

    let multiplier = if backoff.multiplier.is_finite() && backoff.multiplier >= 0.0 {
        backoff.multiplier
    } else {
        1.0
    };

    let initial_secs = backoff.initial.as_secs_f64();
    let max_secs = backoff.max.as_secs_f64().min(MAX_BACKOFF_SECS);

    let base = initial_secs * multiplier.powi(retry);
    let clamped = if base.is_finite() {
        base.min(max_secs).max(0.0)
    } else {
        max_secs
    };
    let duration = Duration::from_secs_f64(clamped);

    let duration = if backoff.jitter {
        let jitter_factor = rand::rng().random_range(0.0..=0.25);
        duration + duration.mul_f64(jitter_factor)
    } else {
        duration
    };

    duration.min(Duration::from_secs_f64(max_secs))
}

/// Parse a `Retry-After` header value: delta-seconds or an HTTP-date.
///
/// Returns `None` for negative seconds, dates in the past and anything
/// unparseable.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }
    let date = httpdate::parse_http_date(trimmed).ok()?;
    date.duration_since(SystemTime::now()).ok()
}

/// Run `operation` until it succeeds, the policy refuses the error, or
/// `max_attempts` is reached. The last error is returned.
///
/// # Errors
/// Returns the error of the final attempt.
pub async fn call_with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= max_attempts || !config.should_retry(&err) {
            return Err(err);
        }

        let delay = config.delay_for(&err, attempt);
        tracing::debug!(
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retrying request after error"
        );
        if let Some(on_retry) = &config.on_retry {
            on_retry(&err, attempt, delay);
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
