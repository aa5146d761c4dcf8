//! Quota, region and service records plus the envelopes built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region value assigned to global-scope quotas after deduplication.
pub const GLOBAL_REGION: &str = "global";

/// One limit definition for one (region, service, quota code) triple.
///
/// `usage_percentage` is derived: it is only ever written by
/// [`Quota::record_usage`], as `usage / value * 100` when `value > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub region: String,
    pub service_code: String,
    pub service_name: String,
    pub quota_name: String,
    pub quota_code: String,
    pub value: f64,
    pub usage: f64,
    pub usage_percentage: f64,
    pub has_usage_metrics: bool,
    pub unit: String,
    pub adjustable: bool,
    pub global: bool,
}

impl Quota {
    /// Build a quota with no usage data from a provider definition.
    pub fn from_definition(region: &str, service: &Service, def: &QuotaDefinition) -> Self {
        Self {
            region: region.to_string(),
            service_code: service.code.clone(),
            service_name: service.name.clone(),
            quota_name: def.quota_name.clone(),
            quota_code: def.quota_code.clone(),
            value: def.value.unwrap_or(0.0),
            usage: 0.0,
            usage_percentage: 0.0,
            has_usage_metrics: false,
            unit: def.unit.clone(),
            adjustable: def.adjustable,
            global: def.global,
        }
    }

    /// Record a usage sample and recompute the percentage.
    pub fn record_usage(&mut self, usage: f64) {
        self.usage = usage;
        self.has_usage_metrics = true;
        self.usage_percentage = if self.value > 0.0 { usage / self.value * 100.0 } else { 0.0 };
    }

    /// Case-insensitive match of `needle_lower` against name, service name and service code.
    ///
    /// `needle_lower` must already be lower-cased.
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        self.quota_name.to_lowercase().contains(needle_lower)
            || self.service_name.to_lowercase().contains(needle_lower)
            || self.service_code.to_lowercase().contains(needle_lower)
    }
}

/// (service code, display name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub code: String,
    pub name: String,
}

impl Service {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self { code: code.into(), name: name.into() }
    }
}

/// (region code, display name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
}

impl Region {
    /// Region whose display name is its code (the provider does not name them).
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        Self { name: code.clone(), code }
    }
}

/// Quota definition as returned by the default or applied quota listings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuotaDefinition {
    pub quota_code: String,
    pub quota_name: String,
    pub value: Option<f64>,
    pub unit: String,
    pub adjustable: bool,
    pub global: bool,
    pub usage_metric: Option<UsageMetric>,
}

/// Provider pointer to where consumption data for a quota lives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsageMetric {
    pub namespace: Option<String>,
    pub metric_name: Option<String>,
    pub dimensions: BTreeMap<String, String>,
    pub statistic_recommendation: Option<String>,
}

/// Statistic extracted from a metric datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
    Average,
    Sum,
    Minimum,
}

impl Statistic {
    /// Recommended statistic, falling back to `Maximum` when absent or unrecognized.
    pub fn from_recommendation(recommendation: Option<&str>) -> Self {
        match recommendation {
            Some("Average") => Statistic::Average,
            Some("Sum") => Statistic::Sum,
            Some("Minimum") => Statistic::Minimum,
            _ => Statistic::Maximum,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Maximum => "Maximum",
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
            Statistic::Minimum => "Minimum",
        }
    }
}

/// One bucket returned by a metric statistic query.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub maximum: Option<f64>,
    pub average: Option<f64>,
    pub sum: Option<f64>,
    pub minimum: Option<f64>,
}

impl Datapoint {
    /// Datapoint carrying a single statistic.
    pub fn single(timestamp: DateTime<Utc>, statistic: Statistic, value: f64) -> Self {
        let mut point =
            Self { timestamp, maximum: None, average: None, sum: None, minimum: None };
        match statistic {
            Statistic::Maximum => point.maximum = Some(value),
            Statistic::Average => point.average = Some(value),
            Statistic::Sum => point.sum = Some(value),
            Statistic::Minimum => point.minimum = Some(value),
        }
        point
    }

    /// Value of `statistic`, or 0 when the provider left it out.
    pub fn value(&self, statistic: Statistic) -> f64 {
        let v = match statistic {
            Statistic::Maximum => self.maximum,
            Statistic::Average => self.average,
            Statistic::Sum => self.sum,
            Statistic::Minimum => self.minimum,
        };
        v.unwrap_or(0.0)
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// Final page.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next_token: None }
    }
}

/// Quotas and per-region warnings from one aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    pub quotas: Vec<Quota>,
    pub warnings: Vec<String>,
}

impl FetchResult {
    /// Every region failed: nothing was fetched but something was reported.
    pub fn is_total_failure(&self) -> bool {
        self.quotas.is_empty() && !self.warnings.is_empty()
    }
}

/// Response envelope handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaResponse {
    pub quotas: Vec<Quota>,
    pub total: usize,
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl QuotaResponse {
    pub fn new(quotas: Vec<Quota>, warnings: Vec<String>, from_cache: bool) -> Self {
        Self { total: quotas.len(), quotas, fetched_at: Utc::now(), from_cache, warnings }
    }
}
