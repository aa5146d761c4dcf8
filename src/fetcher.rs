//! Region fetcher: every quota of one region, with usage attached.
//!
//! For one region the fetcher
//! 1. connects to the region (fatal to the region on failure),
//! 2. lists services, keeping only the filtered one when a filter is given
//!    (fatal to the region on failure),
//! 3. lists default and applied quota definitions per service and merges them
//!    by quota code, applied over default (a failure skips that service),
//! 4. resolves usage for each merged quota.
//!
//! Every page request to the quota catalog waits for a rate limiter token
//! first. Services are processed in provider order and quotas in page order.

use crate::error::{FetchError, ProviderError};
use crate::model::{Page, Quota, QuotaDefinition, Service};
use crate::provider::{cancellable, Provider, QuotaCatalog, RegionClients};
use crate::rate_limit::RateLimiter;
use crate::telemetry::{emit_best_effort, null_sink, BoxedSink, FetchEvent};
use crate::usage::UsageResolver;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct RegionFetcher {
    provider: Arc<dyn Provider>,
    limiter: Arc<dyn RateLimiter>,
    resolver: UsageResolver,
    sink: BoxedSink,
}

impl std::fmt::Debug for RegionFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionFetcher").field("resolver", &self.resolver).finish_non_exhaustive()
    }
}

impl RegionFetcher {
    pub fn new(
        provider: Arc<dyn Provider>,
        limiter: Arc<dyn RateLimiter>,
        resolver: UsageResolver,
    ) -> Self {
        Self { provider, limiter, resolver, sink: null_sink() }
    }

    /// Send fetch events to `sink`.
    pub fn with_sink(mut self, sink: BoxedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    async fn connect(
        &self,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<RegionClients, FetchError> {
        cancellable(cancel, self.provider.connect(region))
            .await?
            .map_err(|source| FetchError::Connect { region: region.to_string(), source })
    }

    /// Every service available in `region`.
    pub async fn services(
        &self,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Service>, FetchError> {
        let clients = self.connect(region, cancel).await?;
        self.list_services(clients.catalog.as_ref(), region, cancel).await
    }

    /// Quotas for `region`, limited to `service_filter` unless it is empty.
    pub async fn fetch(
        &self,
        region: &str,
        service_filter: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Quota>, FetchError> {
        let clients = self.connect(region, cancel).await?;
        let catalog = clients.catalog.as_ref();

        let mut services = self.list_services(catalog, region, cancel).await?;
        if !service_filter.is_empty() {
            services.retain(|s| s.code.eq_ignore_ascii_case(service_filter));
        }

        let mut quotas = Vec::new();
        for service in &services {
            let definitions = match self.definitions(catalog, region, service, cancel).await {
                Ok(defs) => defs,
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(err) => {
                    warn!(
                        target: "quotascope::fetcher",
                        region,
                        service = %service.code,
                        error = %err,
                        "skipping service"
                    );
                    let event = FetchEvent::ServiceSkipped {
                        region: region.to_string(),
                        service: service.code.clone(),
                        error: err.to_string(),
                    };
                    self.emit(event, cancel).await;
                    continue;
                }
            };

            debug!(
                target: "quotascope::fetcher",
                region,
                service = %service.code,
                definitions = definitions.len(),
                "resolving usage"
            );
            for def in &definitions {
                let mut quota = Quota::from_definition(region, service, def);
                let source = self
                    .resolver
                    .resolve(&mut quota, def.usage_metric.as_ref(), &clients, cancel)
                    .await;
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
                let event = match source {
                    Some(source) => FetchEvent::UsageResolved {
                        region: region.to_string(),
                        service: service.code.clone(),
                        quota_code: quota.quota_code.clone(),
                        source,
                    },
                    None => FetchEvent::UsageUnavailable {
                        region: region.to_string(),
                        service: service.code.clone(),
                        quota_code: quota.quota_code.clone(),
                    },
                };
                self.emit(event, cancel).await;
                quotas.push(quota);
            }
        }

        Ok(quotas)
    }

    async fn list_services(
        &self,
        catalog: &dyn QuotaCatalog,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Service>, FetchError> {
        self.paginate(cancel, |token| catalog.list_services(token), |source| {
            FetchError::ListServices { region: region.to_string(), source }
        })
        .await
    }

    async fn definitions(
        &self,
        catalog: &dyn QuotaCatalog,
        region: &str,
        service: &Service,
        cancel: &CancellationToken,
    ) -> Result<Vec<QuotaDefinition>, FetchError> {
        let wrap = |source| FetchError::ListQuotas {
            region: region.to_string(),
            service: service.code.clone(),
            source,
        };
        let code = service.code.as_str();
        let defaults =
            self.paginate(cancel, |token| catalog.list_default_quotas(code, token), wrap).await?;
        let applied =
            self.paginate(cancel, |token| catalog.list_applied_quotas(code, token), wrap).await?;
        Ok(merge_definitions(defaults, applied))
    }

    /// Follow continuation tokens until exhausted, taking one limiter token per page.
    async fn paginate<T, F, Fut, W>(
        &self,
        cancel: &CancellationToken,
        mut call: F,
        wrap: W,
    ) -> Result<Vec<T>, FetchError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ProviderError>>,
        W: Fn(ProviderError) -> FetchError,
    {
        let mut items = Vec::new();
        let mut token = None;
        loop {
            self.limiter.until_ready(cancel).await?;
            let page = cancellable(cancel, call(token.take())).await?.map_err(&wrap)?;
            items.extend(page.items);
            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => return Ok(items),
            }
        }
    }

    async fn emit(&self, event: FetchEvent, cancel: &CancellationToken) {
        let _ = cancellable(cancel, emit_best_effort(self.sink.clone(), event)).await;
    }
}

/// Merge default and applied definitions keyed by quota code.
///
/// Order is first appearance; an applied definition replaces the default in
/// place. Definitions without a quota code are dropped.
pub fn merge_definitions(
    defaults: Vec<QuotaDefinition>,
    applied: Vec<QuotaDefinition>,
) -> Vec<QuotaDefinition> {
    let mut merged: Vec<QuotaDefinition> = Vec::with_capacity(defaults.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for def in defaults.into_iter().chain(applied) {
        if def.quota_code.is_empty() {
            continue;
        }
        match index.get(&def.quota_code) {
            Some(&i) => merged[i] = def,
            None => {
                index.insert(def.quota_code.clone(), merged.len());
                merged.push(def);
            }
        }
    }
    merged
}
