//! Cache-fronted query service.
//!
//! The operations a presentation layer calls. Quota queries are keyed by
//! region selector and service filter; the search term is applied after the
//! cache so the cache always holds the unfiltered set. Region and service
//! listings are cached in the same [`ExpiringCache`] under `regions` and
//! `services:<region>`.

use crate::cache::{ExpiringCache, SweeperHandle};
use crate::config::Config;
use crate::engine::AggregationEngine;
use crate::error::{ConfigError, FetchError, QueryError};
use crate::fetcher::RegionFetcher;
use crate::model::{FetchResult, Quota, QuotaResponse, Region, Service};
use crate::provider::{cancellable, Provider};
use crate::rate_limit::{InMemoryTokenStore, RateLimiter, TokenBucket};
use crate::telemetry::{
    boxed, emit_best_effort, null_sink, BoxedSink, FetchEvent, NonBlockingSink,
};
use crate::usage::{ProbeRegistry, UsageResolver};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const REGIONS_KEY: &str = "regions";

/// Which regions a quota query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelector {
    /// Every enabled region, or only the configured regions when the
    /// service was built with a non-empty region list.
    All,
    /// These region codes, in the caller's order.
    Explicit(Vec<String>),
}

impl RegionSelector {
    /// Parse `""`, `"all"` or a comma-separated list of region codes.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return Ok(RegionSelector::All);
        }
        let codes: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();
        if codes.is_empty() {
            return Err(QueryError::InvalidRequest(format!("no region codes in `{raw}`")));
        }
        Ok(RegionSelector::Explicit(codes))
    }
}

impl FromStr for RegionSelector {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RegionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionSelector::All => f.write_str("all"),
            RegionSelector::Explicit(codes) => f.write_str(&codes.join(",")),
        }
    }
}

/// Cache key for a quota query. The search term never takes part.
pub fn quota_cache_key(selector: &RegionSelector, service_filter: &str) -> String {
    format!("quotas:{selector}:{}", service_filter.trim().to_lowercase())
}

fn services_cache_key(region: &str) -> String {
    format!("services:{region}")
}

/// What the query service keeps in its cache.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Regions(Arc<Vec<Region>>),
    Services(Arc<Vec<Service>>),
    Quotas {
        quotas: Arc<Vec<Quota>>,
        warnings: Arc<Vec<String>>,
    },
}

/// A listing plus whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub from_cache: bool,
}

/// Preselected region and service for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Defaults {
    pub default_region: String,
    pub default_service: String,
}

impl Default for Defaults {
    fn default() -> Self {
        let config = Config::default();
        Self { default_region: config.default_region, default_service: config.default_service }
    }
}

pub struct QueryService {
    provider: Arc<dyn Provider>,
    engine: AggregationEngine,
    cache: Arc<ExpiringCache<CachedValue>>,
    sink: BoxedSink,
    defaults: Defaults,
    configured_regions: Vec<String>,
    sweeper: Option<SweeperHandle>,
}

impl fmt::Debug for QueryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryService")
            .field("engine", &self.engine)
            .field("cached_entries", &self.cache.len())
            .field("defaults", &self.defaults)
            .field("sweeper", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

impl QueryService {
    pub fn new(engine: AggregationEngine, cache: Arc<ExpiringCache<CachedValue>>) -> Self {
        Self {
            provider: engine.fetcher().provider().clone(),
            engine,
            cache,
            sink: null_sink(),
            defaults: Defaults::default(),
            configured_regions: Vec::new(),
            sweeper: None,
        }
    }

    /// Wire the full stack from a validated configuration.
    ///
    /// Spawns the cache sweeper and the sink worker, so it must run inside a
    /// tokio runtime.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, ConfigError> {
        Self::from_config_with_sink(config, provider, null_sink())
    }

    /// As [`from_config`](Self::from_config), delivering events to `sink`
    /// through a [`NonBlockingSink`].
    pub fn from_config_with_sink(
        config: &Config,
        provider: Arc<dyn Provider>,
        sink: BoxedSink,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = boxed(NonBlockingSink::new(sink));
        let limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucket::new(
            InMemoryTokenStore::new(),
            "quota-api",
            config.rate_limit.per_second,
            f64::from(config.rate_limit.burst),
        ));
        let resolver = UsageResolver::standard(Arc::new(ProbeRegistry::builtin()));
        let fetcher =
            Arc::new(RegionFetcher::new(provider, limiter, resolver).with_sink(sink.clone()));
        let engine = AggregationEngine::new(fetcher)
            .with_max_concurrency(config.concurrency())
            .with_dedup(config.global_dedup)
            .with_sink(sink.clone());
        let cache = Arc::new(ExpiringCache::new(config.cache_ttl()));

        Ok(Self::new(engine, cache)
            .with_sink(sink)
            .with_defaults(Defaults {
                default_region: config.default_region.clone(),
                default_service: config.default_service.clone(),
            })
            .with_regions(config.regions.clone())
            .with_sweeper(config.sweep_interval()))
    }

    pub fn with_sink(mut self, sink: BoxedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Restrict "all regions" to `regions` when non-empty.
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.configured_regions = regions;
        self
    }

    /// Sweep expired cache entries every `interval` for the service's lifetime.
    pub fn with_sweeper(mut self, interval: std::time::Duration) -> Self {
        self.sweeper = Some(self.cache.spawn_sweeper(interval));
        self
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<ExpiringCache<CachedValue>> {
        &self.cache
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Quotas for `selector` and `service_filter`, narrowed by `search`.
    pub async fn query(
        &self,
        selector: &RegionSelector,
        service_filter: &str,
        search: &str,
        cancel: &CancellationToken,
    ) -> Result<QuotaResponse, QueryError> {
        let key = quota_cache_key(selector, service_filter);

        let (quotas, warnings, from_cache) = match self.cache.get(&key) {
            Some(CachedValue::Quotas { quotas, warnings }) => {
                let _ = cancellable(cancel, self.emit(FetchEvent::CacheHit { key })).await;
                (quotas.as_ref().clone(), warnings.as_ref().clone(), true)
            }
            _ => {
                let miss = FetchEvent::CacheMiss { key: key.clone() };
                let _ = cancellable(cancel, self.emit(miss)).await;
                let regions = self.resolve_regions(selector, cancel).await?;
                let result = self.engine.aggregate(&regions, service_filter.trim(), cancel).await;
                self.store(key, &result, cancel);
                (result.quotas, result.warnings, false)
            }
        };

        Ok(QuotaResponse::new(apply_search(quotas, search), warnings, from_cache))
    }

    /// Run the aggregation engine directly, bypassing the cache.
    pub async fn aggregate(
        &self,
        regions: &[String],
        service_filter: &str,
        cancel: &CancellationToken,
    ) -> FetchResult {
        self.engine.aggregate(regions, service_filter, cancel).await
    }

    /// Enabled regions, cached under `regions`.
    pub async fn regions(&self, cancel: &CancellationToken) -> Result<Listing<Region>, QueryError> {
        if let Some(CachedValue::Regions(regions)) = self.cache.get(REGIONS_KEY) {
            return Ok(Listing { items: regions.as_ref().clone(), from_cache: true });
        }
        let regions = cancellable(cancel, self.provider.list_regions())
            .await
            .map_err(|_| QueryError::Cancelled)?
            .map_err(QueryError::ListRegions)?;
        self.cache.set(REGIONS_KEY, CachedValue::Regions(Arc::new(regions.clone())));
        Ok(Listing { items: regions, from_cache: false })
    }

    /// Services available in `region`, cached under `services:<region>`.
    pub async fn services(
        &self,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Listing<Service>, QueryError> {
        let key = services_cache_key(region);
        if let Some(CachedValue::Services(services)) = self.cache.get(&key) {
            return Ok(Listing { items: services.as_ref().clone(), from_cache: true });
        }
        let services = match self.engine.fetcher().services(region, cancel).await {
            Ok(services) => services,
            Err(FetchError::Cancelled) => return Err(QueryError::Cancelled),
            Err(err) => return Err(err.into()),
        };
        self.cache.set(key, CachedValue::Services(Arc::new(services.clone())));
        Ok(Listing { items: services, from_cache: false })
    }

    /// Drop every cached entry, whatever its key.
    pub async fn refresh(&self) -> usize {
        let entries = self.cache.clear();
        info!(target: "quotascope::service", entries, "cache cleared");
        self.emit(FetchEvent::CacheCleared { entries }).await;
        entries
    }

    /// Cached quotas for an export; never triggers a fetch.
    pub fn export(
        &self,
        selector: &RegionSelector,
        service_filter: &str,
    ) -> Result<QuotaResponse, QueryError> {
        let key = quota_cache_key(selector, service_filter);
        match self.cache.get(&key) {
            Some(CachedValue::Quotas { quotas, warnings }) => {
                Ok(QuotaResponse::new(quotas.as_ref().clone(), warnings.as_ref().clone(), true))
            }
            _ => Err(QueryError::NoData { key }),
        }
    }

    async fn resolve_regions(
        &self,
        selector: &RegionSelector,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, QueryError> {
        match selector {
            RegionSelector::Explicit(codes) => Ok(codes.clone()),
            RegionSelector::All if !self.configured_regions.is_empty() => {
                Ok(self.configured_regions.clone())
            }
            RegionSelector::All => {
                let listing = self.regions(cancel).await?;
                Ok(listing.items.into_iter().map(|r| r.code).collect())
            }
        }
    }

    fn store(&self, key: String, result: &FetchResult, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            debug!(target: "quotascope::service", key = %key, "not caching cancelled aggregation");
            return;
        }
        if result.is_total_failure() {
            debug!(target: "quotascope::service", key = %key, "not caching failed aggregation");
            return;
        }
        self.cache.set(
            key,
            CachedValue::Quotas {
                quotas: Arc::new(result.quotas.clone()),
                warnings: Arc::new(result.warnings.clone()),
            },
        );
    }

    async fn emit(&self, event: FetchEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

/// Keep quotas whose name, service name or service code contains `search`.
pub fn apply_search(quotas: Vec<Quota>, search: &str) -> Vec<Quota> {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return quotas;
    }
    quotas.into_iter().filter(|q| q.matches_search(&needle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuotaDefinition;

    #[test]
    fn selector_parsing() {
        assert_eq!(RegionSelector::parse("").unwrap(), RegionSelector::All);
        assert_eq!(RegionSelector::parse("ALL").unwrap(), RegionSelector::All);
        assert_eq!(
            " us-east-1, ,us-west-2 ".parse::<RegionSelector>().unwrap(),
            RegionSelector::Explicit(vec!["us-east-1".into(), "us-west-2".into()])
        );
        assert!(matches!(RegionSelector::parse(" , ,"), Err(QueryError::InvalidRequest(_))));
    }

    #[test]
    fn cache_key_ignores_filter_case() {
        let sel = RegionSelector::Explicit(vec!["us-east-1".into(), "eu-west-1".into()]);
        assert_eq!(quota_cache_key(&sel, "EC2"), "quotas:us-east-1,eu-west-1:ec2");
        assert_eq!(quota_cache_key(&RegionSelector::All, ""), "quotas:all:");
    }

    #[test]
    fn search_matches_name_service_name_or_code() {
        let make = |service: &str, name: &str| {
            let def = QuotaDefinition {
                quota_code: "L-1".into(),
                quota_name: name.into(),
                ..Default::default()
            };
            Quota::from_definition("us-east-1", &Service::new(service, "Amazon Service"), &def)
        };
        let quotas = vec![make("ec2", "Running On-Demand instances"), make("vpc", "VPCs per Region")];

        let found = apply_search(quotas.clone(), "VPC");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quota_name, "VPCs per Region");
        assert_eq!(apply_search(quotas.clone(), "").len(), 2);
        assert_eq!(apply_search(quotas, "amazon").len(), 2);
    }
}
