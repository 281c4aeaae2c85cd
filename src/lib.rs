//! Library entrypoint for coinwatch.
//!
//! Integration tests under `tests/` import the app state, routers,
//! controllers and services from here.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;

#[path = "middleware/auth.rs"]
pub mod auth;

pub mod services;

pub mod controllers;
pub mod routes;

use services::{
    alert_store::AlertStore,
    broadcast::Broadcaster,
    ingestion::{IngestSettings, PriceIngestor},
    price_cache::PriceFetchCache,
    price_source::PriceSource,
    price_store::PriceStore,
};

#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    pub source: Arc<dyn PriceSource>,
    pub prices: Arc<dyn PriceStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub cache: Arc<PriceFetchCache>,
    pub events: Broadcaster,
}

impl AppState {
    pub fn new(
        settings: config::Settings,
        source: Arc<dyn PriceSource>,
        prices: Arc<dyn PriceStore>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        let cache = Arc::new(PriceFetchCache::new(
            source.clone(),
            prices.clone(),
            settings.cache_freshness,
        ));
        let events = Broadcaster::new(settings.events_capacity);

        Self {
            settings,
            source,
            prices,
            alerts,
            cache,
            events,
        }
    }

    /// Ingestion loop wired to this state's stores, source and broadcaster.
    pub fn ingestor(&self) -> PriceIngestor {
        PriceIngestor::new(
            IngestSettings {
                tracked_coins: self.settings.tracked_coins.clone(),
                currency: self.settings.alert_currency.clone(),
                interval: self.settings.ingest_interval,
            },
            self.source.clone(),
            self.prices.clone(),
            self.alerts.clone(),
            self.events.clone(),
        )
    }
}
