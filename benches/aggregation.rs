use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quotascope::engine::dedup_global;
use quotascope::{ExpiringCache, GlobalDedup, Quota, QuotaDefinition, Service};
use std::time::Duration;

// Twenty regions, each with the same 50 global and 200 regional quotas.
fn batches() -> Vec<(String, Vec<Quota>)> {
    let service = Service::new("ec2", "Amazon EC2");
    (0..20)
        .map(|r| {
            let region = format!("region-{r:02}");
            let quotas = (0..250)
                .map(|q| {
                    let def = QuotaDefinition {
                        quota_code: format!("L-{q:04}"),
                        quota_name: format!("quota {q}"),
                        value: Some(100.0),
                        global: q < 50,
                        ..Default::default()
                    };
                    Quota::from_definition(&region, &service, &def)
                })
                .collect();
            (region, quotas)
        })
        .collect()
}

fn dedup(c: &mut Criterion) {
    let input = batches();
    c.bench_function("dedup_global_first_seen", |b| {
        b.iter(|| dedup_global(black_box(input.clone()), GlobalDedup::FirstSeen))
    });
    c.bench_function("dedup_global_lowest_region", |b| {
        b.iter(|| dedup_global(black_box(input.clone()), GlobalDedup::LowestRegion))
    });
}

fn cache_reads(c: &mut Criterion) {
    let cache: ExpiringCache<u64> = ExpiringCache::new(Duration::from_secs(300));
    for i in 0..1_000u64 {
        cache.set(format!("quotas:region-{i}:ec2"), i);
    }
    c.bench_function("cache_get_hit", |b| b.iter(|| cache.get(black_box("quotas:region-500:ec2"))));
    c.bench_function("cache_get_miss", |b| b.iter(|| cache.get(black_box("quotas:absent:ec2"))));
}

criterion_group!(benches, dedup, cache_reads);
criterion_main!(benches);
