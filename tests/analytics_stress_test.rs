//! Stress tests for analytics module
//!
//! These tests ensure the aggregator keeps its counters consistent and never
//! double counts under concurrent recording, slow lookups and pruning.

use async_trait::async_trait;
use gmdserve::analytics::{
    AnalyticsAggregator, AnalyticsSnapshot, CountryResolver, EngineLabel, GeoLookup,
    GeoLookupError,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const CHROME: &str = "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const SAFARI: &str = "Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
const FIREFOX: &str = "Mozilla/5.0 (X11; rv:121.0) Gecko/20100101 Firefox/121.0";

/// Lookup that takes a while, so concurrent requests overlap inside it
struct SlowLookup {
    calls: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl GeoLookup for SlowLookup {
    async fn lookup(&self, ip: IpAddr) -> Result<String, GeoLookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        match ip {
            IpAddr::V4(v4) if v4.octets()[0] % 2 == 0 => Ok("DE".to_string()),
            _ => Ok("US".to_string()),
        }
    }
}

/// Helper to create an aggregator over a slow fake lookup
fn create_aggregator(cooldown: Duration, delay: Duration) -> (Arc<AnalyticsAggregator>, Arc<SlowLookup>) {
    let lookup = Arc::new(SlowLookup {
        calls: AtomicUsize::new(0),
        delay,
    });
    let resolver = Arc::new(CountryResolver::new(lookup.clone()));
    (
        Arc::new(AnalyticsAggregator::new(resolver, cooldown, true)),
        lookup,
    )
}

fn assert_consistent(snapshot: &AnalyticsSnapshot) {
    let total = snapshot.total_views;
    assert_eq!(snapshot.page_views.values().sum::<u64>(), total, "page sum");
    assert_eq!(snapshot.browser_engines.values().sum::<u64>(), total, "engine sum");
    assert_eq!(snapshot.countries.values().sum::<u64>(), total, "country sum");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_views_are_all_counted() {
    let (agg, _) = create_aggregator(Duration::from_secs(10), Duration::from_millis(5));

    let mut handles = vec![];

    // 10 clients each open 20 distinct pages
    for client in 0..10u8 {
        let agg = Arc::clone(&agg);
        handles.push(tokio::spawn(async move {
            let ip = format!("{}.0.0.1", 20 + client);
            let mut counted = 0;
            for page in 0..20 {
                let ua = [CHROME, SAFARI, FIREFOX][page % 3];
                if agg.record_view(&ip, &format!("/page{page}"), ua).await {
                    counted += 1;
                }
            }
            counted
        }));
    }

    let mut counted = 0;
    for handle in handles {
        counted += handle.await.unwrap();
    }

    let snapshot = agg.snapshot();
    assert_eq!(counted, 200);
    assert_eq!(snapshot.total_views, 200);
    assert_eq!(snapshot.page_views.len(), 20);
    assert_eq!(snapshot.page_count("/page0"), 10);
    assert_eq!(snapshot.engine_count(EngineLabel::Blink), 70);
    assert_eq!(snapshot.engine_count(EngineLabel::WebKit), 70);
    assert_eq!(snapshot.engine_count(EngineLabel::Gecko), 60);
    assert_eq!(snapshot.country_count("DE"), 100);
    assert_eq!(snapshot.country_count("US"), 100);
    assert_consistent(&snapshot);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_views_count_once() {
    // The lookup is slow enough that every task passes the first cooldown check
    let (agg, _) = create_aggregator(Duration::from_secs(10), Duration::from_millis(50));

    let mut handles = vec![];
    for _ in 0..50 {
        let agg = Arc::clone(&agg);
        handles.push(tokio::spawn(async move {
            agg.record_view("8.8.8.8", "/index", CHROME).await
        }));
    }

    let mut counted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            counted += 1;
        }
    }

    assert_eq!(counted, 1, "exactly one of the racing views is counted");
    let snapshot = agg.snapshot();
    assert_eq!(snapshot.total_views, 1);
    assert_eq!(snapshot.page_count("/index"), 1);
    assert_eq!(agg.tracked_keys(), 1);
    assert_consistent(&snapshot);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_duplicates_total_equals_distinct_keys() {
    let (agg, lookup) = create_aggregator(Duration::from_secs(10), Duration::from_millis(1));

    let mut handles = vec![];

    // 5 clients x 4 pages, each pair requested 5 times from different tasks
    for round in 0..5 {
        for client in 0..5u8 {
            let agg = Arc::clone(&agg);
            handles.push(tokio::spawn(async move {
                let ip = format!("9.9.9.{client}");
                for page in 0..4 {
                    agg.record_view(&ip, &format!("/p{}", (page + round) % 4), CHROME)
                        .await;
                }
            }));
        }
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = agg.snapshot();
    assert_eq!(snapshot.total_views, 20);
    assert_eq!(agg.tracked_keys(), 20);
    for page in 0..4 {
        assert_eq!(snapshot.page_count(&format!("/p{page}")), 5);
    }
    assert_consistent(&snapshot);

    // Racing first lookups may overlap, but never more than once per task
    assert!(lookup.calls.load(Ordering::SeqCst) <= 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pruning_during_recording_never_double_counts() {
    let (agg, _) = create_aggregator(Duration::from_secs(60), Duration::from_millis(1));
    let prune_task = agg.start_prune_task(Duration::from_millis(5));

    let mut handles = vec![];
    for client in 0..8u8 {
        let agg = Arc::clone(&agg);
        handles.push(tokio::spawn(async move {
            let ip = format!("1.2.3.{client}");
            for _ in 0..3 {
                for page in 0..10 {
                    agg.record_view(&ip, &format!("/doc{page}"), FIREFOX).await;
                }
                sleep(Duration::from_millis(10)).await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    agg.shutdown();
    prune_task.await.unwrap();

    // Nothing has expired, so repeat visits stay suppressed while the pruner runs
    let snapshot = agg.snapshot();
    assert_eq!(snapshot.total_views, 80);
    assert_eq!(snapshot.engine_count(EngineLabel::Gecko), 80);
    assert_eq!(agg.tracked_keys(), 80);
    assert_consistent(&snapshot);
}

#[tokio::test]
async fn test_snapshots_while_recording_are_consistent() {
    let (agg, _) = create_aggregator(Duration::from_secs(10), Duration::ZERO);

    let writer = {
        let agg = Arc::clone(&agg);
        tokio::spawn(async move {
            for i in 0..500u32 {
                let ip = format!("100.64.{}.{}", i / 256, i % 256);
                agg.record_view(&ip, "/index", SAFARI).await;
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    while !writer.is_finished() {
        assert_consistent(&agg.snapshot());
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();

    let snapshot = agg.snapshot();
    assert_eq!(snapshot.total_views, 500);
    assert_consistent(&snapshot);
}
