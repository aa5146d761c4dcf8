//! Usage enrichment for individual quotas.
//!
//! A [`UsageResolver`] holds an ordered list of [`UsageStrategy`] objects and
//! stops at the first one that produces a value:
//!
//! 1. [`DirectProbe`]: count the resources named by the [`ProbeRegistry`].
//! 2. [`MetricStatistic`]: latest datapoint of the provider's usage metric.
//!
//! When nothing succeeds the quota keeps `has_usage_metrics == false` and a
//! usage of zero. Strategies run one after another, never in parallel.

use crate::model::{Quota, UsageMetric};
use crate::provider::RegionClients;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod inventory;
pub mod registry;
pub mod strategies;

pub use registry::{ProbeEntry, ProbeRegistry, ResourceKind};
pub use strategies::{DirectProbe, MetricStatistic, UsageRequest, UsageStrategy};

/// Which strategy produced a quota's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageSource {
    DirectProbe,
    MetricStatistic,
    /// A caller-supplied strategy.
    Other(&'static str),
}

impl fmt::Display for UsageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageSource::DirectProbe => f.write_str("direct_probe"),
            UsageSource::MetricStatistic => f.write_str("metric_statistic"),
            UsageSource::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Clone)]
pub struct UsageResolver {
    strategies: Vec<Arc<dyn UsageStrategy>>,
}

impl fmt::Debug for UsageResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<_> = self.strategies.iter().map(|s| s.source()).collect();
        f.debug_struct("UsageResolver").field("strategies", &sources).finish()
    }
}

impl UsageResolver {
    /// Resolver trying `strategies` in order.
    pub fn new(strategies: Vec<Arc<dyn UsageStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct probe against `registry`, then the usage metric.
    pub fn standard(registry: Arc<ProbeRegistry>) -> Self {
        Self::new(vec![Arc::new(DirectProbe::new(registry)), Arc::new(MetricStatistic::default())])
    }

    /// Populate `quota`'s usage from the first strategy that succeeds.
    ///
    /// Returns the winning source, or `None` when the quota has no usage data.
    pub async fn resolve(
        &self,
        quota: &mut Quota,
        metric: Option<&UsageMetric>,
        clients: &RegionClients,
        cancel: &CancellationToken,
    ) -> Option<UsageSource> {
        let mut found = None;
        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return None;
            }
            let request = UsageRequest { quota: &*quota, metric, clients, cancel };
            if let Some(usage) = strategy.try_resolve(&request).await {
                found = Some((strategy.source(), usage));
                break;
            }
        }

        let (source, usage) = found?;
        quota.record_usage(usage);
        debug!(
            target: "quotascope::usage",
            region = %quota.region,
            service = %quota.service_code,
            quota_code = %quota.quota_code,
            usage = quota.usage,
            limit = quota.value,
            percentage = quota.usage_percentage,
            source = %source,
            "usage resolved"
        );
        Some(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::{Datapoint, Page, QuotaDefinition, Service, Statistic};
    use crate::provider::{MetricQuery, MetricSource, QuotaCatalog, ResourceInventory};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoCatalog;

    #[async_trait]
    impl QuotaCatalog for NoCatalog {
        async fn list_services(&self, _: Option<String>) -> Result<Page<Service>, ProviderError> {
            Ok(Page::last(vec![]))
        }
        async fn list_default_quotas(
            &self,
            _: &str,
            _: Option<String>,
        ) -> Result<Page<QuotaDefinition>, ProviderError> {
            Ok(Page::last(vec![]))
        }
        async fn list_applied_quotas(
            &self,
            _: &str,
            _: Option<String>,
        ) -> Result<Page<QuotaDefinition>, ProviderError> {
            Ok(Page::last(vec![]))
        }
    }

    struct Inventory {
        result: Result<f64, ProviderError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResourceInventory for Inventory {
        async fn count(&self, _: &ResourceKind) -> Result<f64, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct Metrics {
        points: Vec<Datapoint>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricSource for Metrics {
        async fn get_statistic(&self, _: &MetricQuery) -> Result<Vec<Datapoint>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.points.clone())
        }
    }

    fn clients(
        probe: Result<f64, ProviderError>,
        points: Vec<Datapoint>,
    ) -> (RegionClients, Arc<Inventory>, Arc<Metrics>) {
        let inventory = Arc::new(Inventory { result: probe, calls: AtomicUsize::new(0) });
        let metrics = Arc::new(Metrics { points, calls: AtomicUsize::new(0) });
        let clients = RegionClients {
            catalog: Arc::new(NoCatalog),
            metrics: metrics.clone(),
            inventory: inventory.clone(),
        };
        (clients, inventory, metrics)
    }

    fn quota(service: &str, code: &str, value: f64) -> Quota {
        let def = QuotaDefinition {
            quota_code: code.into(),
            quota_name: "VPCs per Region".into(),
            value: Some(value),
            ..Default::default()
        };
        Quota::from_definition("us-east-1", &Service::new(service, service), &def)
    }

    fn metric() -> UsageMetric {
        UsageMetric {
            namespace: Some("AWS/Usage".into()),
            metric_name: Some("ResourceCount".into()),
            ..Default::default()
        }
    }

    fn resolver() -> UsageResolver {
        UsageResolver::standard(Arc::new(ProbeRegistry::builtin()))
    }

    #[tokio::test]
    async fn direct_probe_wins_and_skips_metrics() {
        let point = Datapoint::single(Utc::now(), Statistic::Maximum, 9.0);
        let (clients, _, metrics) = clients(Ok(3.0), vec![point]);
        let mut q = quota("vpc", "L-F678F1CE", 5.0);
        let m = metric();

        let source = resolver().resolve(&mut q, Some(&m), &clients, &CancellationToken::new()).await;

        assert_eq!(source, Some(UsageSource::DirectProbe));
        assert_eq!(q.usage, 3.0);
        assert!((q.usage_percentage - 60.0).abs() < 1e-9);
        assert_eq!(metrics.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_probe_falls_through_to_metric() {
        let point = Datapoint::single(Utc::now(), Statistic::Maximum, 4.0);
        let (clients, inventory, _) = clients(Err(ProviderError::api("DescribeVpcs", "denied")), vec![point]);
        let mut q = quota("vpc", "L-F678F1CE", 8.0);
        let m = metric();

        let source = resolver().resolve(&mut q, Some(&m), &clients, &CancellationToken::new()).await;

        assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source, Some(UsageSource::MetricStatistic));
        assert_eq!(q.usage, 4.0);
        assert!((q.usage_percentage - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn service_mismatch_never_probes() {
        let (clients, inventory, _) = clients(Ok(1.0), vec![]);
        let mut q = quota("ec2", "L-F678F1CE", 5.0);

        let source = resolver().resolve(&mut q, None, &clients, &CancellationToken::new()).await;

        assert_eq!(source, None);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_metric_means_no_data() {
        let (clients, _, metrics) = clients(Ok(1.0), vec![]);
        let mut q = quota("lambda", "L-UNPROBED", 5.0);
        let m = metric();

        let source = resolver().resolve(&mut q, Some(&m), &clients, &CancellationToken::new()).await;

        assert_eq!(source, None);
        assert_eq!(metrics.calls.load(Ordering::SeqCst), 1);
        assert!(!q.has_usage_metrics);
        assert_eq!(q.usage, 0.0);
        assert_eq!(q.usage_percentage, 0.0);
    }

    #[tokio::test]
    async fn cancelled_resolution_leaves_quota_untouched() {
        let (clients, inventory, _) = clients(Ok(1.0), vec![]);
        let mut q = quota("vpc", "L-F678F1CE", 5.0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(resolver().resolve(&mut q, None, &clients, &cancel).await, None);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);
        assert!(!q.has_usage_metrics);
    }
}
