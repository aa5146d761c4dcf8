use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Bucket state: `(tokens, last_updated_millis)`.
pub type BucketState = (f64, u64);

/// Abstract storage interface for rate limit state.
///
/// Keyed so that one store can hold several buckets; values are the token count
/// and the clock reading at the last refill.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the current state for a key.
    async fn get_state(&self, key: &str) -> Result<Option<BucketState>, Self::Error>;

    /// Compare-and-set the state for a key.
    ///
    /// `expected` is the state previously read (`None` if the key was absent).
    /// Returns `Ok(false)` if the stored state no longer matches, in which case
    /// the caller re-reads and retries.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<BucketState>,
        new: BucketState,
    ) -> Result<bool, Self::Error>;
}

/// Simple in-memory token store.
#[derive(Default, Clone, Debug)]
pub struct InMemoryTokenStore {
    data: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    type Error = std::convert::Infallible;

    async fn get_state(&self, key: &str) -> Result<Option<BucketState>, Self::Error> {
        let guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(key).copied())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<BucketState>,
        new: BucketState,
    ) -> Result<bool, Self::Error> {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.get(key).copied() != expected {
            return Ok(false);
        }
        guard.insert(key.to_string(), new);
        Ok(true)
    }
}
