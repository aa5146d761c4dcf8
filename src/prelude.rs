//! Convenient re-exports for implementing a provider and running queries.
pub use crate::{
    error::{ConfigError, FetchError, ProviderError, QueryError},
    model::{Datapoint, Page, QuotaDefinition, Region, Service, Statistic, UsageMetric},
    provider::{MetricQuery, MetricSource, Provider, QuotaCatalog, RegionClients, ResourceInventory},
    service::{QueryService, RegionSelector},
    usage::ResourceKind,
    Config,
};
pub use tokio_util::sync::CancellationToken;
