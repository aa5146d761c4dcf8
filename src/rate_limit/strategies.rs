use crate::adaptive::DynamicConfig;
use crate::clock::{Clock, MonotonicClock};
use crate::rate_limit::store::TokenStore;
use crate::rate_limit::{Decision, RateLimiter, UNSATISFIABLE};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Compare-and-set attempts before reporting contention.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Longest refill wait a denial reports; callers retry after it.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// A Token Bucket rate limiter.
///
/// Replenishes tokens at a fixed `rate` per second, up to `capacity` (the burst).
/// A bucket that has never been touched starts full.
pub struct TokenBucket<S> {
    store: Arc<S>,
    bucket_key: String,
    rate: DynamicConfig<f64>,
    capacity: DynamicConfig<f64>,
    clock: Arc<dyn Clock>,
}

impl<S> TokenBucket<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    /// Create a new TokenBucket backed by `store`.
    pub fn new(store: S, key: impl Into<String>, rate: f64, capacity: f64) -> Self {
        Self {
            store: Arc::new(store),
            bucket_key: key.into(),
            rate: DynamicConfig::new(rate),
            capacity: DynamicConfig::new(capacity),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Live handle to the refill rate (tokens/second).
    pub fn rate_handle(&self) -> DynamicConfig<f64> {
        self.rate.clone()
    }

    /// Live handle to the burst capacity.
    pub fn capacity_handle(&self) -> DynamicConfig<f64> {
        self.capacity.clone()
    }
}

#[async_trait]
impl<S> RateLimiter for TokenBucket<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    async fn acquire(
        &self,
        permits: u32,
    ) -> Result<Decision, Box<dyn std::error::Error + Send + Sync>> {
        let cost = f64::from(permits);
        let rate = *self.rate.get();
        let capacity = *self.capacity.get();

        if rate.is_nan() || rate <= 0.0 || cost > capacity {
            return Ok(Decision::Denied { wait: MAX_WAIT, reason: UNSATISFIABLE.into() });
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now_millis();
            let observed = self.store.get_state(&self.bucket_key).await?;
            let (tokens, last_updated) = observed.unwrap_or((capacity, now));

            let elapsed_secs = now.saturating_sub(last_updated) as f64 / 1_000.0;
            let available = (tokens + elapsed_secs * rate).min(capacity);

            if available < cost {
                let missing = cost - available;
                let wait = Duration::try_from_secs_f64(missing / rate).unwrap_or(MAX_WAIT);
                return Ok(Decision::Denied {
                    wait: wait.min(MAX_WAIT),
                    reason: "token_bucket_empty".into(),
                });
            }

            let remaining = available - cost;
            if self.store.compare_and_set(&self.bucket_key, observed, (remaining, now)).await? {
                return Ok(Decision::Allowed {
                    remaining: remaining as u32,
                    metadata: [("bucket".to_string(), self.bucket_key.clone())].into(),
                });
            }
        }

        Ok(Decision::Denied { wait: Duration::from_millis(5), reason: "store_contention".into() })
    }
}
