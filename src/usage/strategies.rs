use crate::model::{Datapoint, Quota, Statistic, UsageMetric};
use crate::provider::{cancellable, MetricQuery, RegionClients};
use crate::usage::registry::ProbeRegistry;
use crate::usage::UsageSource;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Trailing window queried for usage metrics.
pub const METRIC_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Metric bucket granularity.
pub const METRIC_PERIOD: Duration = Duration::from_secs(300);

/// Everything a strategy may consult for one quota.
#[derive(Debug, Clone, Copy)]
pub struct UsageRequest<'a> {
    pub quota: &'a Quota,
    pub metric: Option<&'a UsageMetric>,
    pub clients: &'a RegionClients,
    pub cancel: &'a CancellationToken,
}

/// One way of finding a quota's current usage.
///
/// `None` means "not applicable or failed"; the resolver moves on to the next
/// strategy. Failures are never surfaced past this point.
#[async_trait]
pub trait UsageStrategy: Send + Sync {
    fn source(&self) -> UsageSource;

    async fn try_resolve(&self, request: &UsageRequest<'_>) -> Option<f64>;
}

/// Count the underlying resources directly.
#[derive(Debug, Clone)]
pub struct DirectProbe {
    registry: Arc<ProbeRegistry>,
}

impl DirectProbe {
    pub fn new(registry: Arc<ProbeRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl UsageStrategy for DirectProbe {
    fn source(&self) -> UsageSource {
        UsageSource::DirectProbe
    }

    async fn try_resolve(&self, request: &UsageRequest<'_>) -> Option<f64> {
        let quota = request.quota;
        let entry = self.registry.lookup(&quota.service_code, &quota.quota_code)?;
        let counted =
            cancellable(request.cancel, request.clients.inventory.count(&entry.kind)).await;
        match counted {
            Ok(Ok(usage)) => Some(usage),
            Ok(Err(err)) => {
                debug!(
                    target: "quotascope::usage",
                    service = %quota.service_code,
                    quota_code = %quota.quota_code,
                    kind = %entry.kind,
                    error = %err,
                    "direct probe failed"
                );
                None
            }
            Err(_) => None,
        }
    }
}

/// Read the latest datapoint of the provider's usage metric.
#[derive(Debug, Clone)]
pub struct MetricStatistic {
    window: Duration,
    period: Duration,
}

impl Default for MetricStatistic {
    fn default() -> Self {
        Self { window: METRIC_WINDOW, period: METRIC_PERIOD }
    }
}

impl MetricStatistic {
    pub fn new(window: Duration, period: Duration) -> Self {
        Self { window, period }
    }

    fn query(&self, metric: &UsageMetric) -> Option<MetricQuery> {
        let namespace = metric.namespace.clone()?;
        let metric_name = metric.metric_name.clone()?;
        let end = Utc::now();
        let window = chrono::Duration::from_std(self.window).ok()?;
        Some(MetricQuery {
            namespace,
            metric_name,
            dimensions: metric.dimensions.clone(),
            statistic: Statistic::from_recommendation(metric.statistic_recommendation.as_deref()),
            start: end - window,
            end,
            period: self.period,
        })
    }
}

#[async_trait]
impl UsageStrategy for MetricStatistic {
    fn source(&self) -> UsageSource {
        UsageSource::MetricStatistic
    }

    async fn try_resolve(&self, request: &UsageRequest<'_>) -> Option<f64> {
        let query = self.query(request.metric?)?;
        let quota = request.quota;
        let points =
            match cancellable(request.cancel, request.clients.metrics.get_statistic(&query)).await {
                Ok(Ok(points)) => points,
                Ok(Err(err)) => {
                    debug!(
                        target: "quotascope::usage",
                        namespace = %query.namespace,
                        metric = %query.metric_name,
                        error = %err,
                        "metric query failed"
                    );
                    return None;
                }
                Err(_) => return None,
            };

        match latest_datapoint(&points) {
            Some(point) => Some(point.value(query.statistic)),
            None => {
                debug!(
                    target: "quotascope::usage",
                    service = %quota.service_code,
                    quota = %quota.quota_name,
                    "no datapoints"
                );
                None
            }
        }
    }
}

/// Most recent datapoint by timestamp; the first one wins a tie.
pub fn latest_datapoint(points: &[Datapoint]) -> Option<&Datapoint> {
    points.iter().fold(None, |latest: Option<&Datapoint>, p| match latest {
        Some(l) if p.timestamp <= l.timestamp => Some(l),
        _ => Some(p),
    })
}
