//! Benchmarks the cost of a domain's reconcile step: acquiring/releasing backends as a
//! resolved address set changes shape, through the public `Director::backend` surface
//! rather than calling the worker loop directly.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use dynamic_backend::config::DirectorConfig;
use dynamic_backend::registry::BackendRegistry;
use dynamic_backend::stats::NullStats;
use dynamic_backend::testing::FakeResolver;
use dynamic_backend::Director;

fn addresses(n: u8) -> Vec<IpAddr> {
    (0..n).map(|i| IpAddr::from([127, 0, 0, i])).collect()
}

fn build_director(ttl: Duration) -> Director<FakeResolver> {
    let resolver = Arc::new(FakeResolver::new());
    resolver.set_default_addresses(addresses(16), None);
    Director::new(
        "bench",
        DirectorConfig::new().ttl(ttl),
        resolver,
        BackendRegistry::new(Arc::new(NullStats)),
    )
    .unwrap()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let director = build_director(Duration::from_secs(3600));
    director.backend(Some("warm.test"), Some("80"), None).unwrap();

    let mut group = c.benchmark_group("Director::backend");
    group.bench_function("steady state (address set unchanged)", |b| {
        b.iter(|| director.backend(Some("warm.test"), Some("80"), None).unwrap());
    });
    group.bench_function("new host per call (domain creation)", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let host = format!("host-{i}.test");
            director.backend(Some(&host), Some("80"), None).unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
