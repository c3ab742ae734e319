//! Benchmarks SRV record ordering and a scripted resolver round trip. Runs entirely
//! against `FakeResolver` rather than live DNS, so results measure this crate's own
//! overhead (locking, sorting, async dispatch) rather than network latency.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use dynamic_backend::resolver::{order_srv_records, ResolverAdapter};
use dynamic_backend::testing::{FakeResolver, FakeSrvRecord};

fn sample_records(n: u16) -> Vec<FakeSrvRecord> {
    (0..n)
        .map(|i| FakeSrvRecord {
            target: format!("target-{i}.example.com."),
            port: 443,
            priority: i % 3,
            weight: (i % 10) + 1,
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut rng = rand::rng();
    let records = sample_records(64);

    let mut group = c.benchmark_group("order_srv_records");
    group.bench_function("64 records, 3 priority tiers", |b| {
        b.iter(|| {
            let mut records = records.clone();
            order_srv_records(&mut records, &mut rng);
        });
    });
    group.finish();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let resolver = FakeResolver::new();
    resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], Some(Duration::from_secs(30)));
    resolver.set_default_srv(sample_records(8), Some(Duration::from_secs(30)));

    let mut group = c.benchmark_group("FakeResolver round trip");
    group.bench_function("resolve_addresses", |b| {
        b.iter(|| runtime.block_on(resolver.resolve_addresses("bench.test")).unwrap());
    });
    group.bench_function("resolve_srv", |b| {
        b.iter(|| runtime.block_on(resolver.resolve_srv("_http._tcp.bench.test")).unwrap());
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
