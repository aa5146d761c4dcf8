//! Collaborator interfaces for the cloud provider.
//!
//! The engine never talks to a concrete SDK. A [`Provider`] enumerates regions
//! and hands out [`RegionClients`], the region-scoped handles every other call
//! goes through. Constructing those handles is where credentials and region
//! configuration get resolved, so a failing `connect` is fatal to that region.

use crate::error::{FetchError, ProviderError};
use crate::model::{Datapoint, Page, QuotaDefinition, Region, Service, Statistic};
use crate::usage::registry::ResourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Entry point to a cloud account.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Regions enabled for the active credentials.
    async fn list_regions(&self) -> Result<Vec<Region>, ProviderError>;

    /// Resolve region configuration and build region-scoped clients.
    async fn connect(&self, region: &str) -> Result<RegionClients, ProviderError>;
}

/// Region-scoped collaborator handles.
#[derive(Clone)]
pub struct RegionClients {
    pub catalog: Arc<dyn QuotaCatalog>,
    pub metrics: Arc<dyn MetricSource>,
    pub inventory: Arc<dyn ResourceInventory>,
}

impl std::fmt::Debug for RegionClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionClients")
            .field("catalog", &"<catalog>")
            .field("metrics", &"<metrics>")
            .field("inventory", &"<inventory>")
            .finish()
    }
}

/// The quota listing API. Every page request is rate limited by the caller.
#[async_trait]
pub trait QuotaCatalog: Send + Sync {
    async fn list_services(&self, next_token: Option<String>)
        -> Result<Page<Service>, ProviderError>;

    /// Provider default values for a service's quotas.
    async fn list_default_quotas(
        &self,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<Page<QuotaDefinition>, ProviderError>;

    /// Account-specific values, which override defaults with the same quota code.
    async fn list_applied_quotas(
        &self,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<Page<QuotaDefinition>, ProviderError>;
}

/// Statistic query over a trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: BTreeMap<String, String>,
    pub statistic: Statistic,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period: Duration,
}

/// The metrics system.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Datapoints in the query window; an empty vector means "no data".
    async fn get_statistic(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, ProviderError>;
}

/// Direct resource counting used by usage probes.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    async fn count(&self, kind: &ResourceKind) -> Result<f64, ProviderError>;
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, FetchError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        out = fut => Ok(out),
    }
}
