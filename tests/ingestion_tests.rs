mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coinwatch::{
    error::{FetchError, StoreError},
    models::{Alert, AlertTriggered, Condition, Event, PriceSample},
    services::{
        ingestion::{CycleOutcome, IngestSettings, PriceIngestor},
        price_store::{MemoryPriceStore, PriceStore},
    },
};
use common::{harness, FakeSource, Reply};
use mongodb::bson::oid::ObjectId;

fn completed(outcome: CycleOutcome) -> coinwatch::services::ingestion::CycleReport {
    match outcome {
        CycleOutcome::Completed(r) => r,
        CycleOutcome::Skipped(e) => panic!("cycle unexpectedly skipped: {e}"),
    }
}

fn drain(sub: &mut coinwatch::services::broadcast::Subscription) -> Vec<Event> {
    let mut out = Vec::new();
    while let Some(evt) = sub.try_recv() {
        out.push(evt);
    }
    out
}

#[tokio::test]
async fn threshold_hit_persists_triggers_and_publishes() {
    let h = harness(&["bitcoin"], FakeSource::with_prices(&[("bitcoin", 50000.0)]));
    let alert = Alert::new(ObjectId::new(), "bitcoin", 50000.0, Condition::Above, 1);
    h.alerts.insert_raw(alert.clone());

    let mut sub = h.state.events.subscribe();
    let report = completed(h.state.ingestor().run_cycle().await);

    assert_eq!(report.persisted, 1);
    assert_eq!(report.triggered, vec![alert.id]);

    let samples = h.prices.all();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].coin_id, "bitcoin");
    assert_eq!(samples[0].price, 50000.0);
    assert_eq!(samples[0].currency, "usd");

    assert!(h.alerts.get(alert.id).unwrap().triggered);

    let events = drain(&mut sub);
    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::PriceUpdate(u) => assert_eq!(u.prices["bitcoin"]["usd"], 50000.0),
        other => panic!("expected priceUpdate first, got {other:?}"),
    }
    assert_eq!(
        events[1],
        Event::AlertTriggered(AlertTriggered {
            coin: "bitcoin".to_string(),
            price: 50000.0,
            condition: Condition::Above,
            threshold: 50000.0,
        })
    );
}

#[tokio::test]
async fn rate_limited_cycle_is_a_complete_no_op() {
    let source = FakeSource::new(Reply::RateLimited);
    let h = harness(&["bitcoin"], source.clone());
    let alert = Alert::new(ObjectId::new(), "bitcoin", 1.0, Condition::Above, 1);
    h.alerts.insert_raw(alert.clone());

    let mut sub = h.state.events.subscribe();
    let ingestor = h.state.ingestor();

    match ingestor.run_cycle().await {
        CycleOutcome::Skipped(e) => assert!(e.is_rate_limited()),
        CycleOutcome::Completed(r) => panic!("expected skip, got {r:?}"),
    }

    assert!(h.prices.is_empty());
    assert!(!h.alerts.get(alert.id).unwrap().triggered);
    assert!(drain(&mut sub).is_empty());

    // the next tick carries on normally
    source.set_prices(&[("bitcoin", 2.0)]);
    let report = completed(ingestor.run_cycle().await);
    assert_eq!(report.triggered, vec![alert.id]);
    assert_eq!(drain(&mut sub).len(), 2);
}

#[tokio::test]
async fn other_fetch_failures_also_skip_the_cycle() {
    for reply in [Reply::Timeout, Reply::Upstream(503)] {
        let h = harness(&["bitcoin"], FakeSource::new(reply));
        let mut sub = h.state.events.subscribe();

        assert!(matches!(h.state.ingestor().run_cycle().await, CycleOutcome::Skipped(_)));
        assert!(h.prices.is_empty());
        assert!(drain(&mut sub).is_empty());
    }
}

#[tokio::test]
async fn zero_or_missing_prices_never_reach_history() {
    let h = harness(
        &["bitcoin", "ethereum", "solana"],
        FakeSource::with_prices(&[("bitcoin", 100.0), ("ethereum", 0.0)]),
    );

    let report = completed(h.state.ingestor().run_cycle().await);
    assert_eq!(report.persisted, 1);

    let coins: Vec<String> = h.prices.all().into_iter().map(|s| s.coin_id).collect();
    assert_eq!(coins, vec!["bitcoin"]);
}

#[tokio::test]
async fn zero_price_does_not_fire_a_below_alert() {
    let h = harness(&["ethereum"], FakeSource::with_prices(&[("ethereum", 0.0)]));
    let alert = Alert::new(ObjectId::new(), "ethereum", 10.0, Condition::Below, 1);
    h.alerts.insert_raw(alert.clone());

    let report = completed(h.state.ingestor().run_cycle().await);
    assert_eq!(report.evaluated, 0);
    assert!(!h.alerts.get(alert.id).unwrap().triggered);
}

#[tokio::test]
async fn below_threshold_is_inclusive() {
    let h = harness(&["solana"], FakeSource::with_prices(&[("solana", 100.0)]));
    let at = Alert::new(ObjectId::new(), "solana", 100.0, Condition::Below, 1);
    let under = Alert::new(ObjectId::new(), "solana", 99.0, Condition::Below, 2);
    h.alerts.insert_raw(at.clone());
    h.alerts.insert_raw(under.clone());

    let report = completed(h.state.ingestor().run_cycle().await);
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.triggered, vec![at.id]);
    assert!(!h.alerts.get(under.id).unwrap().triggered);
}

#[tokio::test]
async fn ownerless_alert_never_triggers() {
    let h = harness(&["bitcoin"], FakeSource::with_prices(&[("bitcoin", 1_000_000.0)]));
    let mut orphan = Alert::new(ObjectId::new(), "bitcoin", 1.0, Condition::Above, 1);
    orphan.owner_id = None;
    h.alerts.insert_raw(orphan.clone());

    let mut sub = h.state.events.subscribe();
    let report = completed(h.state.ingestor().run_cycle().await);

    assert_eq!(report.evaluated, 0);
    assert!(report.triggered.is_empty());
    assert!(!h.alerts.get(orphan.id).unwrap().triggered);

    let events = drain(&mut sub);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::PriceUpdate(_)));
}

#[tokio::test]
async fn alert_on_coin_without_price_is_skipped_quietly() {
    let h = harness(&["bitcoin"], FakeSource::with_prices(&[("bitcoin", 10.0)]));
    let alert = Alert::new(ObjectId::new(), "pepe", 1.0, Condition::Above, 1);
    h.alerts.insert_raw(alert.clone());

    let report = completed(h.state.ingestor().run_cycle().await);
    assert_eq!(report.evaluated, 0);
    assert!(!h.alerts.get(alert.id).unwrap().triggered);
}

#[tokio::test]
async fn triggered_alert_stays_triggered_and_fires_once() {
    let source = FakeSource::with_prices(&[("bitcoin", 200.0)]);
    let h = harness(&["bitcoin"], source.clone());
    let alert = Alert::new(ObjectId::new(), "bitcoin", 150.0, Condition::Above, 1);
    h.alerts.insert_raw(alert.clone());

    let ingestor = h.state.ingestor();
    let mut sub = h.state.events.subscribe();

    assert_eq!(completed(ingestor.run_cycle().await).triggered.len(), 1);

    // price drops away and comes back: nothing re-arms the alert
    source.set_prices(&[("bitcoin", 100.0)]);
    assert!(completed(ingestor.run_cycle().await).triggered.is_empty());
    source.set_prices(&[("bitcoin", 300.0)]);
    assert!(completed(ingestor.run_cycle().await).triggered.is_empty());

    assert!(h.alerts.get(alert.id).unwrap().triggered);

    let fired = drain(&mut sub)
        .into_iter()
        .filter(|e| matches!(e, Event::AlertTriggered(_)))
        .count();
    assert_eq!(fired, 1);
}

#[tokio::test]
async fn independent_ingestors_publish_one_trigger_per_alert() {
    let source = FakeSource::with_prices(&[("bitcoin", 500.0)]);
    source.set_delay(Duration::from_millis(50));
    let h = harness(&["bitcoin"], source);
    let alert = Alert::new(ObjectId::new(), "bitcoin", 400.0, Condition::Above, 1);
    h.alerts.insert_raw(alert.clone());

    let mut sub = h.state.events.subscribe();
    // Separate ingestors share no cycle lock; only the store CAS keeps this to one.
    let first = h.state.ingestor();
    let second = h.state.ingestor();

    let (a, b) = tokio::join!(first.run_cycle(), second.run_cycle());
    let total = completed(a).triggered.len() + completed(b).triggered.len();
    assert_eq!(total, 1);

    let fired: Vec<Event> = drain(&mut sub)
        .into_iter()
        .filter(|e| matches!(e, Event::AlertTriggered(_)))
        .collect();
    assert_eq!(fired.len(), 1);
}

/// Fails every append for one coin.
struct FlakyPriceStore {
    inner: MemoryPriceStore,
    broken_coin: String,
}

#[async_trait]
impl PriceStore for FlakyPriceStore {
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        if sample.coin_id == self.broken_coin {
            let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
            return Err(StoreError::Mongo(mongodb::error::Error::from(io)));
        }
        self.inner.append(sample).await
    }

    async fn latest(&self, coin_id: &str, currency: &str) -> Result<Option<PriceSample>, StoreError> {
        self.inner.latest(coin_id, currency).await
    }

    async fn latest_any(&self, coin_id: &str) -> Result<Option<PriceSample>, StoreError> {
        self.inner.latest_any(coin_id).await
    }

    async fn recent(&self, coin_id: &str, currency: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError> {
        self.inner.recent(coin_id, currency, limit).await
    }
}

#[tokio::test]
async fn failed_sample_write_does_not_block_other_coins_or_alerts() {
    let h = harness(&["bitcoin", "ethereum"], FakeSource::with_prices(&[("bitcoin", 10.0), ("ethereum", 20.0)]));
    let store = Arc::new(FlakyPriceStore {
        inner: MemoryPriceStore::new(),
        broken_coin: "bitcoin".to_string(),
    });
    let alert = Alert::new(ObjectId::new(), "bitcoin", 5.0, Condition::Above, 1);
    h.alerts.insert_raw(alert.clone());

    let ingestor = PriceIngestor::new(
        IngestSettings {
            tracked_coins: vec!["bitcoin".to_string(), "ethereum".to_string()],
            currency: "usd".to_string(),
            interval: Duration::from_secs(3600),
        },
        h.source.clone(),
        store.clone(),
        h.alerts.clone(),
        h.state.events.clone(),
    );

    let mut sub = h.state.events.subscribe();
    let report = completed(ingestor.run_cycle().await);

    assert_eq!(report.persisted, 1);
    assert_eq!(store.inner.all()[0].coin_id, "ethereum");
    assert_eq!(report.triggered, vec![alert.id]);
    assert_eq!(drain(&mut sub).len(), 2);
}

#[tokio::test]
async fn started_loop_runs_immediately_and_stops_cleanly() {
    let source = FakeSource::with_prices(&[("bitcoin", 1.0)]);
    let h = harness(&["bitcoin"], source.clone());
    let mut sub = h.state.events.subscribe();

    let handle = Arc::new(h.state.ingestor()).start();

    let first = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("first cycle should publish without waiting a full period");
    assert!(matches!(first, Some(Event::PriceUpdate(_))));
    assert!(handle.is_running());

    handle.stop().await;
    assert_eq!(source.calls(), 1);
    assert_eq!(source.requests()[0].1, "usd");
}

#[test]
fn fetch_error_classification() {
    assert!(FetchError::RateLimited.is_rate_limited());
    assert!(!FetchError::Timeout.is_rate_limited());
}
