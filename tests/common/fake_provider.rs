//! In-memory provider with failure injection, latency and call counters.

use async_trait::async_trait;
use quotascope::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn quota_def(code: &str, name: &str, value: f64, global: bool) -> QuotaDefinition {
    QuotaDefinition {
        quota_code: code.into(),
        quota_name: name.into(),
        value: Some(value),
        unit: "None".into(),
        adjustable: true,
        global,
        usage_metric: None,
    }
}

/// What one region serves.
#[derive(Debug, Clone, Default)]
pub struct RegionData {
    services: Vec<Service>,
    defaults: HashMap<String, Vec<QuotaDefinition>>,
    applied: HashMap<String, Vec<QuotaDefinition>>,
    fail_services: bool,
    fail_quotas_for: HashSet<String>,
    counts: HashMap<ResourceKind, f64>,
    metrics: HashMap<String, Vec<Datapoint>>,
    delay: Duration,
    page_size: usize,
}

impl RegionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service with its default quota definitions.
    pub fn service(mut self, code: &str, name: &str, defaults: Vec<QuotaDefinition>) -> Self {
        self.services.push(Service::new(code, name));
        self.defaults.insert(code.to_string(), defaults);
        self
    }

    pub fn applied(mut self, code: &str, applied: Vec<QuotaDefinition>) -> Self {
        self.applied.insert(code.to_string(), applied);
        self
    }

    pub fn failing_services(mut self) -> Self {
        self.fail_services = true;
        self
    }

    pub fn failing_quotas(mut self, service: &str) -> Self {
        self.fail_quotas_for.insert(service.to_string());
        self
    }

    pub fn count(mut self, kind: ResourceKind, value: f64) -> Self {
        self.counts.insert(kind, value);
        self
    }

    /// Datapoints returned for any query on `metric_name`.
    pub fn metric(mut self, metric_name: &str, points: Vec<Datapoint>) -> Self {
        self.metrics.insert(metric_name.to_string(), points);
        self
    }

    /// Latency of each service listing page.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Items per listing page; zero means everything on one page.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }
}

/// Call counters shared by a provider and every client it hands out.
#[derive(Debug, Default)]
pub struct FakeStats {
    list_regions: AtomicUsize,
    connects: AtomicUsize,
    list_services: AtomicUsize,
    catalog_pages: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeStats {
    pub fn list_regions_calls(&self) -> usize {
        self.list_regions.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn list_services_calls(&self) -> usize {
        self.list_services.load(Ordering::SeqCst)
    }

    /// Pages served by the quota catalog, services and quotas alike.
    pub fn catalog_pages(&self) -> usize {
        self.catalog_pages.load(Ordering::SeqCst)
    }

    /// Highest number of service listings observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a FakeStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a FakeStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct FakeProvider {
    regions: Vec<String>,
    data: HashMap<String, RegionData>,
    fail_connect: HashSet<String>,
    fail_list_regions: bool,
    stats: Arc<FakeStats>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, code: &str, data: RegionData) -> Self {
        self.regions.push(code.to_string());
        self.data.insert(code.to_string(), data);
        self
    }

    /// Region listed as enabled but whose configuration cannot be resolved.
    pub fn failing_connect(mut self, code: &str) -> Self {
        self.regions.push(code.to_string());
        self.fail_connect.insert(code.to_string());
        self
    }

    pub fn failing_list_regions(mut self) -> Self {
        self.fail_list_regions = true;
        self
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn list_regions(&self) -> Result<Vec<Region>, ProviderError> {
        self.stats.list_regions.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_regions {
            return Err(ProviderError::api("DescribeRegions", "access denied"));
        }
        Ok(self.regions.iter().map(Region::from_code).collect())
    }

    async fn connect(&self, region: &str) -> Result<RegionClients, ProviderError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.contains(region) {
            return Err(ProviderError::Credentials(format!("no credentials for {region}")));
        }
        let data = self
            .data
            .get(region)
            .cloned()
            .ok_or_else(|| ProviderError::Credentials(format!("unknown region {region}")))?;
        let clients = Arc::new(FakeRegion { data, stats: self.stats.clone() });
        Ok(RegionClients {
            catalog: clients.clone(),
            metrics: clients.clone(),
            inventory: clients,
        })
    }
}

struct FakeRegion {
    data: RegionData,
    stats: Arc<FakeStats>,
}

impl FakeRegion {
    fn page<T: Clone>(&self, items: &[T], token: Option<String>) -> Page<T> {
        self.stats.catalog_pages.fetch_add(1, Ordering::SeqCst);
        let start = token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0).min(items.len());
        if self.data.page_size == 0 {
            return Page::last(items[start..].to_vec());
        }
        let end = (start + self.data.page_size).min(items.len());
        let next_token = (end < items.len()).then(|| end.to_string());
        Page { items: items[start..end].to_vec(), next_token }
    }

    fn quotas(
        &self,
        table: &HashMap<String, Vec<QuotaDefinition>>,
        operation: &str,
        service_code: &str,
        token: Option<String>,
    ) -> Result<Page<QuotaDefinition>, ProviderError> {
        if self.data.fail_quotas_for.contains(service_code) {
            return Err(ProviderError::api(operation, "internal error"));
        }
        let items = table.get(service_code).cloned().unwrap_or_default();
        Ok(self.page(&items, token))
    }
}

#[async_trait]
impl QuotaCatalog for FakeRegion {
    async fn list_services(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<Service>, ProviderError> {
        self.stats.list_services.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.stats);
        if !self.data.delay.is_zero() {
            tokio::time::sleep(self.data.delay).await;
        }
        if self.data.fail_services {
            return Err(ProviderError::Throttled { operation: "ListServices".into() });
        }
        Ok(self.page(&self.data.services, next_token))
    }

    async fn list_default_quotas(
        &self,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<Page<QuotaDefinition>, ProviderError> {
        self.quotas(&self.data.defaults, "ListAWSDefaultServiceQuotas", service_code, next_token)
    }

    async fn list_applied_quotas(
        &self,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<Page<QuotaDefinition>, ProviderError> {
        self.quotas(&self.data.applied, "ListServiceQuotas", service_code, next_token)
    }
}

#[async_trait]
impl MetricSource for FakeRegion {
    async fn get_statistic(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, ProviderError> {
        Ok(self.data.metrics.get(&query.metric_name).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ResourceInventory for FakeRegion {
    async fn count(&self, kind: &ResourceKind) -> Result<f64, ProviderError> {
        self.data
            .counts
            .get(kind)
            .copied()
            .ok_or_else(|| ProviderError::api("Describe", format!("no inventory for {kind}")))
    }
}
