//! Per-subscription retry with capped exponential backoff.
//!
//! Retry is a decorator ([`RetryingHandler`]) around any [`EventHandler`]; the
//! wait between attempts goes through an injected [`Delay`] so tests can run
//! without real timers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::handler::{EventHandler, HandlerResult};
use crate::Event;

/// Delay before the first retry; later retries scale it by the multiplier.
pub const BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Multiplier used when a policy does not carry a usable one.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Backoff cap used when a policy does not carry a usable one.
pub const DEFAULT_MAX_BACKOFF_DELAY: Duration = Duration::from_millis(30_000);

/// Retry policy for handler failures on one subscription.
///
/// JSON form: `{"maxRetries": 2, "backoffMultiplier": 2, "maxBackoffDelay": 10000}`
/// with the delay in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    #[serde(with = "duration_ms")]
    pub max_backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff_delay: DEFAULT_MAX_BACKOFF_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::default()
    }

    pub fn exponential(max_retries: u32, backoff_multiplier: f64, max_backoff_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff_multiplier,
            max_backoff_delay,
        }
    }

    fn effective_multiplier(&self) -> f64 {
        if self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0 {
            self.backoff_multiplier
        } else {
            DEFAULT_BACKOFF_MULTIPLIER
        }
    }

    fn effective_max_delay(&self) -> Duration {
        if self.max_backoff_delay.is_zero() {
            DEFAULT_MAX_BACKOFF_DELAY
        } else {
            self.max_backoff_delay
        }
    }
}

/// Delay before retry number `attempt` (the first retry is attempt 1).
///
/// `min(max_backoff_delay, 1s * multiplier^(attempt - 1))`; without a policy
/// every retry waits a flat second.
pub fn backoff_delay(attempt: u32, policy: Option<&RetryPolicy>) -> Duration {
    let Some(policy) = policy else {
        return BASE_DELAY;
    };

    let max_delay = policy.effective_max_delay();
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let millis = BASE_DELAY.as_millis() as f64 * policy.effective_multiplier().powi(exponent);

    if !millis.is_finite() || millis >= max_delay.as_millis() as f64 {
        return max_delay;
    }
    Duration::from_millis(millis as u64)
}

/// Injected wait used between retry attempts.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn delay(&self, duration: Duration);
}

/// [`Delay`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Decorator adding retry/backoff to any handler.
///
/// Attempts for one event are strictly sequential. Retry state lives on the
/// stack of a single `handle` call, so concurrent deliveries never share it.
pub struct RetryingHandler<H> {
    inner: H,
    policy: Option<RetryPolicy>,
    delay: Arc<dyn Delay>,
}

impl<H> core::fmt::Debug for RetryingHandler<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryingHandler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<H> RetryingHandler<H>
where
    H: EventHandler,
{
    pub fn new(inner: H, policy: Option<RetryPolicy>) -> Self {
        Self {
            inner,
            policy,
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    fn max_retries(&self) -> u32 {
        self.policy.as_ref().map(|p| p.max_retries).unwrap_or(0)
    }
}

#[async_trait]
impl<H> EventHandler for RetryingHandler<H>
where
    H: EventHandler,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        let max_retries = self.max_retries();
        let mut attempt: u32 = 0;

        loop {
            let err = match self.inner.handle(event).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            attempt += 1;
            if attempt > max_retries {
                error!(
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    attempt,
                    error = %err,
                    "event handler failed after all retries"
                );
                return Err(err);
            }

            let delay = backoff_delay(attempt, self.policy.as_ref());
            warn!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "event handler failed, retrying"
            );
            self.delay.delay(delay).await;
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
