//! Provider-wide rate limiting for the quota listing API.
//!
//! - [`RateLimiter`]: core trait; `acquire` answers immediately with a
//!   [`Decision`], `until_ready` waits for a token or cancellation.
//! - [`strategies::TokenBucket`]: refill-rate plus burst-capacity bucket.
//! - [`store::TokenStore`]: where bucket state lives (in memory by default).
//!
//! Only calls to the quota/service listing API go through the limiter. Region
//! listing, resource probes and metric queries rely on the engine's
//! concurrency cap instead.

use crate::error::FetchError;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub mod store;
pub mod strategies;

pub use store::{InMemoryTokenStore, TokenStore};
pub use strategies::TokenBucket;

/// Shortest pause between two acquisition attempts while waiting.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Denial reason for a request no amount of waiting will grant.
pub const UNSATISFIABLE: &str = "unsatisfiable";

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Number of whole permits remaining after this acquisition.
        remaining: u32,
        /// Optional metadata (e.g., bucket key).
        metadata: HashMap<String, String>,
    },
    /// The request is denied for now.
    Denied {
        /// How long until enough tokens should have accumulated.
        wait: Duration,
        /// Reason for denial (e.g., "token_bucket_empty").
        reason: String,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Core interface for rate limiting logic.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Attempt to take `permits` tokens without waiting.
    async fn acquire(
        &self,
        permits: u32,
    ) -> Result<Decision, Box<dyn std::error::Error + Send + Sync>>;

    /// Wait for one token, giving up with [`FetchError::Cancelled`] when `cancel` fires.
    ///
    /// An [`UNSATISFIABLE`] denial fails at once with [`FetchError::RateLimit`].
    async fn until_ready(&self, cancel: &CancellationToken) -> Result<(), FetchError> {
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let decision =
                self.acquire(1).await.map_err(|e| FetchError::RateLimit(e.to_string()))?;
            match decision {
                Decision::Allowed { .. } => return Ok(()),
                Decision::Denied { reason, .. } if reason == UNSATISFIABLE => {
                    return Err(FetchError::RateLimit(format!("{reason} permit request")));
                }
                Decision::Denied { wait, reason } => {
                    trace!(target: "quotascope::rate_limit", ?wait, %reason, "waiting for token");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(wait.max(MIN_WAIT)) => {}
                    }
                }
            }
        }
    }
}
