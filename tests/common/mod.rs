#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use coinwatch::{
    config::{self, StoreBackend},
    error::FetchError,
    services::{
        alert_store::MemoryAlertStore,
        price_source::{PriceMap, PriceSource},
        price_store::MemoryPriceStore,
    },
    AppState,
};

#[derive(Clone)]
pub enum Reply {
    Prices(PriceMap),
    RateLimited,
    Timeout,
    Upstream(u16),
}

/// Scripted upstream: answers every call with the current reply and records
/// what it was asked for.
pub struct FakeSource {
    reply: Mutex<Reply>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<String>, String)>>,
}

impl FakeSource {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_prices(prices: &[(&str, f64)]) -> Arc<Self> {
        Self::new(Reply::Prices(price_map(prices)))
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn set_prices(&self, prices: &[(&str, f64)]) {
        self.set_reply(Reply::Prices(price_map(prices)));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Vec<String>, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    async fn fetch(&self, coin_ids: &[String], currency: &str) -> Result<PriceMap, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((coin_ids.to_vec(), currency.to_string()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Prices(p) => Ok(p
                .into_iter()
                .filter(|(coin, _)| coin_ids.contains(coin))
                .collect()),
            Reply::RateLimited => Err(FetchError::RateLimited),
            Reply::Timeout => Err(FetchError::Timeout),
            Reply::Upstream(status) => Err(FetchError::Upstream {
                status,
                body: "upstream trouble".to_string(),
            }),
        }
    }
}

pub fn price_map(prices: &[(&str, f64)]) -> PriceMap {
    prices
        .iter()
        .map(|(c, p)| (c.to_string(), *p))
        .collect::<HashMap<_, _>>()
}

pub fn test_settings(tracked: &[&str]) -> config::Settings {
    let mut settings = config::load();
    settings.store_backend = StoreBackend::Memory;
    settings.jwt_secret = "test-secret".to_string();
    settings.jwt_cookie_name = "auth".to_string();
    settings.tracked_coins = tracked.iter().map(|c| c.to_string()).collect();
    settings.alert_currency = "usd".to_string();
    settings.ingest_interval = Duration::from_secs(3600);
    settings.cache_freshness = Duration::from_secs(60);
    settings.events_capacity = 64;
    settings
}

pub struct Harness {
    pub state: AppState,
    pub source: Arc<FakeSource>,
    pub prices: Arc<MemoryPriceStore>,
    pub alerts: Arc<MemoryAlertStore>,
}

pub fn harness(tracked: &[&str], source: Arc<FakeSource>) -> Harness {
    let prices = Arc::new(MemoryPriceStore::new());
    let alerts = Arc::new(MemoryAlertStore::new());

    let state = AppState::new(test_settings(tracked), source.clone(), prices.clone(), alerts.clone());

    Harness {
        state,
        source,
        prices,
        alerts,
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
