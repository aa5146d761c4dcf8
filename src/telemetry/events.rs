use crate::usage::UsageSource;
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Events emitted while fetching and serving quotas.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FetchEvent {
    /// A region task acquired its concurrency slot.
    RegionStarted { region: String },
    /// A region fetch finished.
    RegionCompleted {
        region: String,
        quotas: usize,
        duration: Duration,
    },
    /// A region fetch failed; it becomes a warning on the result.
    RegionFailed { region: String, error: String },
    /// Quota listing for one service failed; the rest of the region continues.
    ServiceSkipped {
        region: String,
        service: String,
        error: String,
    },
    UsageResolved {
        region: String,
        service: String,
        quota_code: String,
        source: UsageSource,
    },
    UsageUnavailable {
        region: String,
        service: String,
        quota_code: String,
    },
    CacheHit { key: String },
    CacheMiss { key: String },
    /// The whole cache was invalidated.
    CacheCleared { entries: usize },
}

impl fmt::Display for FetchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchEvent::RegionStarted { region } => write!(f, "RegionStarted({region})"),
            FetchEvent::RegionCompleted { region, quotas, duration } => {
                write!(f, "RegionCompleted({region}, quotas={quotas}, {duration:?})")
            }
            FetchEvent::RegionFailed { region, error } => {
                write!(f, "RegionFailed({region}: {error})")
            }
            FetchEvent::ServiceSkipped { region, service, error } => {
                write!(f, "ServiceSkipped({region}/{service}: {error})")
            }
            FetchEvent::UsageResolved { region, service, quota_code, source } => {
                write!(f, "UsageResolved({region}/{service}/{quota_code} via {source})")
            }
            FetchEvent::UsageUnavailable { region, service, quota_code } => {
                write!(f, "UsageUnavailable({region}/{service}/{quota_code})")
            }
            FetchEvent::CacheHit { key } => write!(f, "CacheHit({key})"),
            FetchEvent::CacheMiss { key } => write!(f, "CacheMiss({key})"),
            FetchEvent::CacheCleared { entries } => write!(f, "CacheCleared(entries={entries})"),
        }
    }
}

#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Convert a FetchEvent into a JSON value for sinks.
pub fn event_to_json(event: &FetchEvent) -> serde_json::Value {
    match event {
        FetchEvent::RegionStarted { region } => {
            json!({ "kind": "region_started", "region": region })
        }
        FetchEvent::RegionCompleted { region, quotas, duration } => json!({
            "kind": "region_completed",
            "region": region,
            "quotas": *quotas,
            "duration_ms": clamp_u64(duration.as_millis()),
        }),
        FetchEvent::RegionFailed { region, error } => {
            json!({ "kind": "region_failed", "region": region, "error": error })
        }
        FetchEvent::ServiceSkipped { region, service, error } => json!({
            "kind": "service_skipped",
            "region": region,
            "service": service,
            "error": error,
        }),
        FetchEvent::UsageResolved { region, service, quota_code, source } => json!({
            "kind": "usage_resolved",
            "region": region,
            "service": service,
            "quota_code": quota_code,
            "source": source.to_string(),
        }),
        FetchEvent::UsageUnavailable { region, service, quota_code } => json!({
            "kind": "usage_unavailable",
            "region": region,
            "service": service,
            "quota_code": quota_code,
        }),
        FetchEvent::CacheHit { key } => json!({ "kind": "cache_hit", "key": key }),
        FetchEvent::CacheMiss { key } => json!({ "kind": "cache_miss", "key": key }),
        FetchEvent::CacheCleared { entries } => {
            json!({ "kind": "cache_cleared", "entries": *entries })
        }
    }
}
