#![allow(dead_code)]

pub mod fake_provider;

use quotascope::{
    AggregationEngine, InMemoryTokenStore, ProbeRegistry, RateLimiter, RegionFetcher,
    TokenBucket, UsageResolver,
};
use quotascope::telemetry::{FetchEvent, TelemetrySink};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

pub use fake_provider::{quota_def, FakeProvider, FakeStats, RegionData};

/// Limiter that never makes a test wait.
pub fn open_limiter() -> Arc<dyn RateLimiter> {
    Arc::new(TokenBucket::new(InMemoryTokenStore::new(), "test", 10_000.0, 10_000.0))
}

pub fn fetcher(provider: FakeProvider) -> Arc<RegionFetcher> {
    fetcher_with_limiter(provider, open_limiter())
}

pub fn fetcher_with_limiter(
    provider: FakeProvider,
    limiter: Arc<dyn RateLimiter>,
) -> Arc<RegionFetcher> {
    let resolver = UsageResolver::standard(Arc::new(ProbeRegistry::builtin()));
    Arc::new(RegionFetcher::new(Arc::new(provider), limiter, resolver))
}

pub fn engine(provider: FakeProvider) -> AggregationEngine {
    AggregationEngine::new(fetcher(provider))
}

pub fn regions(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

/// Sink whose deliveries never complete.
#[derive(Clone, Debug, Default)]
pub struct StalledSink;

impl Service<FetchEvent> for StalledSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: FetchEvent) -> Self::Future {
        Box::pin(std::future::pending())
    }
}

impl TelemetrySink for StalledSink {
    type SinkError = Infallible;
}
