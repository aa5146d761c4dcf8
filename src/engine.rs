//! Aggregation engine: fan the region fetcher out across regions.
//!
//! One task per region, at most `max_concurrency` of them fetching at once.
//! A failed region becomes a warning string and never fails the call. Once all
//! tasks have finished, global quotas are deduplicated across regions.
//!
//! When the caller's token fires, in-flight tasks stop at their next remote
//! call and the engine returns whatever had already been collected.

use crate::adaptive::DynamicConfig;
use crate::bulkhead::Bulkhead;
use crate::error::FetchError;
use crate::fetcher::RegionFetcher;
use crate::model::{FetchResult, Quota, GLOBAL_REGION};
use crate::provider::cancellable;
use crate::telemetry::{emit_best_effort, null_sink, BoxedSink, FetchEvent};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Region fetches allowed in flight when nothing else is configured.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Which instance of a global quota survives deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalDedup {
    /// The first region to complete wins; not reproducible run to run.
    #[default]
    FirstSeen,
    /// The lexicographically smallest region code wins.
    LowestRegion,
}

/// Region, its quotas or the failure cause, and how long it took.
type RegionOutcome = (String, Result<Vec<Quota>, String>, Duration);

pub struct AggregationEngine {
    fetcher: Arc<RegionFetcher>,
    max_concurrency: DynamicConfig<usize>,
    dedup: GlobalDedup,
    sink: BoxedSink,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("max_concurrency", &*self.max_concurrency.get())
            .field("dedup", &self.dedup)
            .finish_non_exhaustive()
    }
}

impl AggregationEngine {
    pub fn new(fetcher: Arc<RegionFetcher>) -> Self {
        Self {
            fetcher,
            max_concurrency: DynamicConfig::new(DEFAULT_MAX_CONCURRENCY),
            dedup: GlobalDedup::default(),
            sink: null_sink(),
        }
    }

    /// Cap on simultaneous region fetches; zero means the default.
    pub fn with_max_concurrency(self, max: usize) -> Self {
        self.max_concurrency.set(normalize_concurrency(max));
        self
    }

    pub fn with_dedup(mut self, dedup: GlobalDedup) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_sink(mut self, sink: BoxedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Live handle to the concurrency cap, read at the start of each call.
    pub fn concurrency_handle(&self) -> DynamicConfig<usize> {
        self.max_concurrency.clone()
    }

    pub fn fetcher(&self) -> &Arc<RegionFetcher> {
        &self.fetcher
    }

    /// Fetch `regions` concurrently and combine the results.
    pub async fn aggregate(
        &self,
        regions: &[String],
        service_filter: &str,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let started = Instant::now();
        let bulkhead = Bulkhead::new(normalize_concurrency(*self.max_concurrency.get()));
        let child = cancel.child_token();

        let mut tasks: JoinSet<RegionOutcome> = JoinSet::new();
        let mut outstanding: HashMap<String, usize> = HashMap::new();
        for region in regions {
            tasks.spawn(region_task(
                self.fetcher.clone(),
                bulkhead.clone(),
                self.sink.clone(),
                region.clone(),
                service_filter.to_string(),
                child.clone(),
            ));
            *outstanding.entry(region.clone()).or_insert(0) += 1;
        }

        let mut batches: Vec<(String, Vec<Quota>)> = Vec::with_capacity(regions.len());
        let mut warnings = Vec::new();
        let mut aborted = false;
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !aborted => {
                    child.cancel();
                    tasks.abort_all();
                    aborted = true;
                    continue;
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            // Aborted tasks are reported below from `outstanding`.
            let Ok((region, outcome, elapsed)) = joined else { continue };
            if let Some(n) = outstanding.get_mut(&region) {
                *n -= 1;
            }

            match outcome {
                Ok(quotas) => {
                    let event = FetchEvent::RegionCompleted {
                        region: region.clone(),
                        quotas: quotas.len(),
                        duration: elapsed,
                    };
                    self.emit(event, cancel).await;
                    batches.push((region, quotas));
                }
                Err(cause) => self.record_failure(&mut warnings, region, cause, cancel).await,
            }
        }
        for (region, n) in outstanding {
            for _ in 0..n {
                let cause = FetchError::Cancelled.to_string();
                self.record_failure(&mut warnings, region.clone(), cause, cancel).await;
            }
        }

        let quotas = dedup_global(batches, self.dedup);
        info!(
            target: "quotascope::engine",
            regions = regions.len(),
            quotas = quotas.len(),
            warnings = warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation finished"
        );
        FetchResult { quotas, warnings }
    }

    async fn record_failure(
        &self,
        warnings: &mut Vec<String>,
        region: String,
        cause: String,
        cancel: &CancellationToken,
    ) {
        warn!(target: "quotascope::engine", region = %region, error = %cause, "region fetch failed");
        warnings.push(format!("failed to fetch quotas for region {region}: {cause}"));
        self.emit(FetchEvent::RegionFailed { region, error: cause }, cancel).await;
    }

    /// Deliver `event` unless `cancel` fires first. After cancellation the
    /// event goes to a detached task so the caller never waits on the sink.
    async fn emit(&self, event: FetchEvent, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            tokio::spawn(emit_best_effort(self.sink.clone(), event));
            return;
        }
        let _ = cancellable(cancel, emit_best_effort(self.sink.clone(), event)).await;
    }
}

async fn region_task(
    fetcher: Arc<RegionFetcher>,
    bulkhead: Bulkhead,
    sink: BoxedSink,
    region: String,
    service_filter: String,
    cancel: CancellationToken,
) -> RegionOutcome {
    let started = Instant::now();
    let fetch = async {
        let _permit = bulkhead.acquire(&cancel).await?;
        let started_event = FetchEvent::RegionStarted { region: region.clone() };
        let _ = cancellable(&cancel, emit_best_effort(sink, started_event)).await;
        fetcher.fetch(&region, &service_filter, &cancel).await
    };
    let outcome = match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err("region task panicked".to_string()),
    };
    (region, outcome, started.elapsed())
}

/// Concurrency cap with non-positive values replaced by the default.
pub fn normalize_concurrency(max: usize) -> usize {
    if max == 0 {
        DEFAULT_MAX_CONCURRENCY
    } else {
        max
    }
}

/// Concatenate per-region batches, keeping one instance per global quota.
///
/// Surviving global quotas get the region `global`. Non-global quotas are
/// never touched.
pub fn dedup_global(batches: Vec<(String, Vec<Quota>)>, mode: GlobalDedup) -> Vec<Quota> {
    let winners: Option<HashMap<(String, String), String>> = match mode {
        GlobalDedup::FirstSeen => None,
        GlobalDedup::LowestRegion => {
            let mut lowest: HashMap<(String, String), String> = HashMap::new();
            for q in batches.iter().flat_map(|(_, quotas)| quotas).filter(|q| q.global) {
                let key = (q.service_code.clone(), q.quota_code.clone());
                match lowest.get_mut(&key) {
                    Some(region) if q.region < *region => *region = q.region.clone(),
                    Some(_) => {}
                    None => {
                        lowest.insert(key, q.region.clone());
                    }
                }
            }
            Some(lowest)
        }
    };

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    for quota in batches.into_iter().flat_map(|(_, quotas)| quotas) {
        if !quota.global {
            out.push(quota);
            continue;
        }
        let key = (quota.service_code.clone(), quota.quota_code.clone());
        if let Some(winners) = &winners {
            if winners.get(&key) != Some(&quota.region) {
                continue;
            }
        }
        if seen.insert(key) {
            let mut quota = quota;
            quota.region = GLOBAL_REGION.to_string();
            out.push(quota);
        }
    }
    out
}
