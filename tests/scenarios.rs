//! End-to-end scenarios driven entirely against `FakeResolver` (no real sockets, no
//! privileged sandbox): cold fetch, idle eviction, stale tolerance, weighted SRV
//! selection, backend sharing scope, and the whitelist gate.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dynamic_backend::config::DirectorConfig;
use dynamic_backend::error::ResolveFailure;
use dynamic_backend::key::ShareScope;
use dynamic_backend::probe::{Health, ProbeHandle, ProbeTemplate, StaticProbe};
use dynamic_backend::registry::BackendRegistry;
use dynamic_backend::stats::{CountingStats, NullStats};
use dynamic_backend::testing::{FakeResolver, FakeSrvRecord};
use dynamic_backend::Director;

struct AlwaysHealthy;

impl ProbeTemplate for AlwaysHealthy {
    fn attach(&self, _host_header: Option<&str>) -> Arc<dyn ProbeHandle> {
        Arc::new(StaticProbe::new(Health::Healthy))
    }
}

fn localhost_director(resolver: Arc<FakeResolver>, config: DirectorConfig) -> Director<FakeResolver> {
    Director::new(
        "test",
        config.probe(Arc::new(AlwaysHealthy)),
        resolver,
        BackendRegistry::new(Arc::new(NullStats)),
    )
    .unwrap()
}

#[test]
fn cold_fetch_returns_a_stable_backend() {
    let resolver = Arc::new(FakeResolver::new());
    resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], None);
    let director = localhost_director(resolver, DirectorConfig::new());

    let first = director.backend(Some("localhost"), Some("80"), None).unwrap();
    let second = director.backend(Some("localhost"), Some("80"), None).unwrap();
    assert!(std::ptr::eq(first.object(), second.object()));
    assert_eq!(first.object().address, "127.0.0.1".parse::<IpAddr>().unwrap());
}

#[test]
fn cold_fetch_registers_a_per_director_stats_name() {
    // Mirrors the `VBE.<vcl>.<dir>(<addr>:<port>).req` stats path: the registered
    // name must carry this director's own name, not just the bare endpoint.
    let stats = Arc::new(CountingStats::new());
    let resolver = Arc::new(FakeResolver::new());
    resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], None);
    let director = Director::new(
        "dir1",
        DirectorConfig::new().probe(Arc::new(AlwaysHealthy)),
        resolver,
        BackendRegistry::new(stats.clone()),
    )
    .unwrap();

    let backend = director.backend(Some("localhost"), Some("80"), None).unwrap();
    let expected_name = backend.object().stats_name_for("dir1");
    assert_eq!(expected_name, "dir1(127.0.0.1:80)");
    assert!(stats.is_registered(&expected_name));
}

#[test]
fn idle_domain_reaches_done_while_active_domain_stays_warm() {
    let resolver = Arc::new(FakeResolver::new());
    resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], None);
    let director = localhost_director(
        resolver,
        DirectorConfig::new()
            .ttl(Duration::from_millis(30))
            .domain_usage_timeout(Duration::from_millis(80)),
    );

    director.backend(Some("localhost"), Some("80"), None).unwrap();
    std::thread::sleep(Duration::from_millis(400));
    director.backend(Some("www.localhost"), Some("80"), None).unwrap();
    std::thread::sleep(Duration::from_millis(400));
    director.backend(Some("www.localhost"), Some("80"), None).unwrap();
    std::thread::sleep(Duration::from_millis(400));

    // `localhost`'s domain should have timed out and unlinked itself by now; a fresh
    // `.backend()` call for it creates a brand new (cold) domain rather than reusing one
    // that reached `Done`.
    let recreated = director.backend(Some("localhost"), Some("80"), None).unwrap();
    assert_eq!(recreated.object().address, "127.0.0.1".parse::<IpAddr>().unwrap());
}

#[test]
fn stale_resolve_failures_keep_serving_last_known_good_set() {
    let resolver = Arc::new(FakeResolver::new());
    resolver.push_addresses("flaky.test", vec!["127.0.0.1".parse().unwrap()], None);
    resolver.push_addresses("flaky.test", vec!["127.0.0.1".parse().unwrap()], None);
    resolver.push_address_failure("flaky.test", ResolveFailure::new(None, "server failure"));
    resolver.push_addresses("flaky.test", vec!["127.0.0.2".parse().unwrap()], None);

    let director = localhost_director(resolver, DirectorConfig::new().ttl(Duration::from_millis(30)));

    // First two cycles succeed with the same address.
    let first = director.backend(Some("flaky.test"), Some("80"), None).unwrap();
    assert_eq!(first.object().address, "127.0.0.1".parse::<IpAddr>().unwrap());

    // Wait past the third (failing) cycle: pick() must still serve the last good set.
    std::thread::sleep(Duration::from_millis(150));
    let still_good = director.backend(Some("flaky.test"), Some("80"), None).unwrap();
    assert_eq!(still_good.object().address, "127.0.0.1".parse::<IpAddr>().unwrap());

    // Wait past the fourth (successful, new address) cycle.
    std::thread::sleep(Duration::from_millis(150));
    let refreshed = director.backend(Some("flaky.test"), Some("80"), None).unwrap();
    assert_eq!(refreshed.object().address, "127.0.0.2".parse::<IpAddr>().unwrap());
}

#[test]
fn srv_priority_selects_the_lowest_tier_in_roughly_its_weight_ratio() {
    let resolver = Arc::new(FakeResolver::new());
    resolver.set_default_srv(
        vec![
            FakeSrvRecord { target: "t1.example.com.".into(), port: 80, priority: 10, weight: 1 },
            FakeSrvRecord { target: "t2.example.com.".into(), port: 80, priority: 10, weight: 3 },
            FakeSrvRecord { target: "t3.example.com.".into(), port: 80, priority: 20, weight: 1 },
        ],
        None,
    );
    resolver.push_addresses("t1.example.com", vec!["10.0.0.1".parse().unwrap()], None);
    resolver.push_addresses("t2.example.com", vec!["10.0.0.2".parse().unwrap()], None);
    resolver.push_addresses("t3.example.com", vec!["10.0.0.3".parse().unwrap()], None);
    resolver.set_default_addresses(vec!["10.0.0.1".parse().unwrap()], None);
    let director = localhost_director(resolver, DirectorConfig::new());

    let t1: IpAddr = "10.0.0.1".parse().unwrap();
    let t2: IpAddr = "10.0.0.2".parse().unwrap();
    let t3: IpAddr = "10.0.0.3".parse().unwrap();

    let (mut count_t1, mut count_t2, mut count_t3) = (0u32, 0u32, 0u32);
    for _ in 0..10_000 {
        let address = director.service("_http._tcp.example.com").unwrap().object().address;
        if address == t1 {
            count_t1 += 1;
        } else if address == t2 {
            count_t2 += 1;
        } else if address == t3 {
            count_t3 += 1;
        }
    }

    assert_eq!(count_t3, 0, "priority 20 must never be chosen while priority 10 peers are eligible");
    assert_eq!(count_t1 + count_t2, 10_000);
    let ratio = f64::from(count_t2) / f64::from(count_t1.max(1));
    assert!((2.0..4.0).contains(&ratio), "expected roughly a 1:3 split, got t1={count_t1} t2={count_t2} (ratio {ratio})");
}

#[test]
fn director_scope_shares_one_object_host_scope_keeps_them_distinct() {
    let registry = BackendRegistry::new(Arc::new(CountingStats::new()));

    let resolver_a = Arc::new(FakeResolver::new());
    resolver_a.set_default_addresses(vec!["203.0.113.10".parse().unwrap()], None);
    let director_a = Director::new(
        "a",
        DirectorConfig::new().share(ShareScope::Director),
        resolver_a,
        registry.clone(),
    )
    .unwrap();

    let resolver_b = Arc::new(FakeResolver::new());
    resolver_b.set_default_addresses(vec!["203.0.113.10".parse().unwrap()], None);
    let director_b = Director::new(
        "b",
        DirectorConfig::new().share(ShareScope::Director),
        resolver_b,
        registry.clone(),
    )
    .unwrap();

    let from_a = director_a.backend(Some("host-a.test"), Some("80"), None).unwrap();
    let from_b = director_b.backend(Some("host-b.test"), Some("80"), None).unwrap();
    assert!(std::ptr::eq(from_a.object(), from_b.object()));

    let host_registry = BackendRegistry::new(Arc::new(CountingStats::new()));
    let resolver_c = Arc::new(FakeResolver::new());
    resolver_c.set_default_addresses(vec!["203.0.113.10".parse().unwrap()], None);
    let director_c = Director::new(
        "c",
        DirectorConfig::new().share(ShareScope::Host),
        resolver_c,
        host_registry.clone(),
    )
    .unwrap();
    let resolver_d = Arc::new(FakeResolver::new());
    resolver_d.set_default_addresses(vec!["203.0.113.10".parse().unwrap()], None);
    let director_d = Director::new(
        "d",
        DirectorConfig::new().share(ShareScope::Host),
        resolver_d,
        host_registry,
    )
    .unwrap();

    let from_c = director_c.backend(Some("host-c.test"), Some("80"), None).unwrap();
    let from_d = director_d.backend(Some("host-d.test"), Some("80"), None).unwrap();
    assert!(!std::ptr::eq(from_c.object(), from_d.object()));
}

#[test]
fn whitelist_rejects_loopback_v6_but_keeps_v4() {
    use dynamic_backend::acl::Whitelist;

    struct RejectLoopbackV6;
    impl Whitelist for RejectLoopbackV6 {
        fn allows(&self, address: IpAddr) -> bool {
            address != "::1".parse::<IpAddr>().unwrap()
        }
    }

    let resolver = Arc::new(FakeResolver::new());
    resolver.set_default_addresses(
        vec!["::1".parse().unwrap(), "127.0.0.1".parse().unwrap()],
        None,
    );
    let director = localhost_director(
        resolver,
        DirectorConfig::new().whitelist(Arc::new(RejectLoopbackV6)),
    );

    let backend = director.backend(Some("mixed.test"), Some("80"), None).unwrap();
    assert_eq!(backend.object().address, "127.0.0.1".parse::<IpAddr>().unwrap());
}
