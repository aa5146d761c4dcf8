//! Counting rules shared by [`ResourceInventory`](crate::provider::ResourceInventory)
//! implementations.
//!
//! Most kinds are a plain list length. The helpers here cover the ones that are
//! not: vCPU totals across instance types, state-filtered NAT gateways and
//! volume storage reported in TiB.

use std::collections::HashMap;
use tracing::warn;

const GIB_PER_TIB: f64 = 1024.0;

/// Whether `instance_type` (e.g. `m5.large`) belongs to one of `families`.
pub fn is_instance_in_families(instance_type: &str, families: &[char]) -> bool {
    instance_type
        .chars()
        .next()
        .map(|c| families.contains(&c.to_ascii_lowercase()))
        .unwrap_or(false)
}

/// CPU topology reported on a running instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuOptions {
    pub core_count: Option<u32>,
    pub threads_per_core: Option<u32>,
}

impl CpuOptions {
    fn vcpus(&self) -> Option<u64> {
        Some(u64::from(self.core_count?) * u64::from(self.threads_per_core?))
    }
}

/// Running instances grouped by type, with what is known about each type's vCPUs.
#[derive(Debug, Clone, Default)]
pub struct VcpuTally {
    counts: HashMap<String, u64>,
    cpu_options: HashMap<String, CpuOptions>,
    default_vcpus: HashMap<String, u32>,
}

impl VcpuTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one running instance if its type is in `families`.
    pub fn observe(&mut self, instance_type: &str, cpu: Option<CpuOptions>, families: &[char]) {
        if instance_type.is_empty() || !is_instance_in_families(instance_type, families) {
            return;
        }
        *self.counts.entry(instance_type.to_string()).or_insert(0) += 1;
        if let Some(cpu) = cpu {
            self.cpu_options.insert(instance_type.to_string(), cpu);
        }
    }

    /// Distinct instance types seen, to look up in the instance type catalog.
    pub fn instance_types(&self) -> Vec<&str> {
        self.counts.keys().map(String::as_str).collect()
    }

    /// Record the catalog's default vCPU count for a type.
    pub fn set_default_vcpus(&mut self, instance_type: &str, vcpus: u32) {
        self.default_vcpus.insert(instance_type.to_string(), vcpus);
    }

    /// Total vCPUs: catalog default first, then cores × threads.
    ///
    /// Types with neither are skipped with a warning.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|(instance_type, &count)| {
                let per_instance = self
                    .default_vcpus
                    .get(instance_type)
                    .filter(|&&v| v > 0)
                    .map(|&v| u64::from(v))
                    .or_else(|| self.cpu_options.get(instance_type).and_then(CpuOptions::vcpus));
                match per_instance {
                    Some(vcpus) => vcpus * count,
                    None => {
                        warn!(
                            target: "quotascope::usage",
                            instance_type = %instance_type,
                            count,
                            "missing vCPU info; skipping instances"
                        );
                        0
                    }
                }
            })
            .sum()
    }
}

/// NAT gateway states that count toward the quota.
pub fn nat_gateway_counts(state: &str) -> bool {
    matches!(state, "available" | "pending")
}

/// Convert summed volume sizes in GiB to TiB.
pub fn gib_to_tib(total_gib: u64) -> f64 {
    total_gib as f64 / GIB_PER_TIB
}
