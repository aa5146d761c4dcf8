#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # quotascope
//!
//! Cross-region cloud quota aggregation: every quota of every requested
//! region and service, with current usage attached, behind a TTL cache.
//!
//! ## Pieces
//!
//! - **Expiring cache** ([`cache`]): per-entry absolute expiry, background sweep
//! - **Rate limiter** ([`rate_limit`]): provider-wide token bucket for the quota API
//! - **Usage resolver** ([`usage`]): direct resource probe, then usage metric
//! - **Region fetcher** ([`fetcher`]): services, merged quota definitions, usage
//! - **Aggregation engine** ([`engine`]): bounded fan-out, partial failures as
//!   warnings, global quota deduplication
//! - **Query service** ([`service`]): cache-fronted queries, listings, refresh, export
//!
//! The cloud itself sits behind the [`provider`] traits.
//!
//! ## Quick Start
//!
//! ```rust
//! use quotascope::{quota_cache_key, Config, RegionSelector};
//!
//! let config = Config::from_yaml_str("max_concurrency: 4").unwrap();
//! assert_eq!(config.concurrency(), 4);
//!
//! let selector: RegionSelector = "us-east-1,us-west-2".parse().unwrap();
//! assert_eq!(quota_cache_key(&selector, "EC2"), "quotas:us-east-1,us-west-2:ec2");
//! ```
//!
//! With a [`provider::Provider`] implementation in hand, wire everything with
//! [`QueryService::from_config`] and call [`QueryService::query`].

pub mod adaptive;
pub mod bulkhead;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod prelude;
pub mod provider;
pub mod rate_limit;
pub mod service;
pub mod telemetry;
pub mod usage;

// Re-exports
pub use adaptive::DynamicConfig;
pub use bulkhead::Bulkhead;
pub use cache::{ExpiringCache, SweeperHandle};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Config;
pub use engine::{AggregationEngine, GlobalDedup, DEFAULT_MAX_CONCURRENCY};
pub use error::{ConfigError, FetchError, ProviderError, QueryError};
pub use fetcher::RegionFetcher;
pub use model::{
    Datapoint, FetchResult, Page, Quota, QuotaDefinition, QuotaResponse, Region, Service,
    Statistic, UsageMetric, GLOBAL_REGION,
};
pub use provider::{
    MetricQuery, MetricSource, Provider, QuotaCatalog, RegionClients, ResourceInventory,
};
pub use rate_limit::{Decision, InMemoryTokenStore, RateLimiter, TokenBucket, TokenStore};
pub use service::{
    apply_search, quota_cache_key, CachedValue, Defaults, Listing, QueryService, RegionSelector,
};
pub use usage::{ProbeRegistry, ResourceKind, UsageResolver, UsageSource, UsageStrategy};
