use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{
    models::{price::is_valid_price, PriceSample},
    services::{
        price_source::{PriceMap, PriceSource},
        price_store::PriceStore,
    },
};

/// Read-through cache for on-demand price lookups.
///
/// Serves the latest stored samples while every requested coin has one
/// younger than the freshness window; otherwise refetches the whole batch
/// in a single upstream call. Never fails: anything it cannot get falls back
/// to the newest sample in any currency, then to `0`.
pub struct PriceFetchCache {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    freshness: Duration,
}

impl PriceFetchCache {
    pub fn new(source: Arc<dyn PriceSource>, store: Arc<dyn PriceStore>, freshness: Duration) -> Self {
        Self {
            source,
            store,
            freshness,
        }
    }

    pub async fn get_prices(&self, coin_ids: &[String], currency: &str) -> PriceMap {
        if let Some(cached) = self.fresh_snapshot(coin_ids, currency).await {
            tracing::debug!("serving cached {} prices for {:?}", currency, coin_ids);
            return cached;
        }

        tracing::debug!("refreshing {} prices for {:?}", currency, coin_ids);
        let fetched = match self.source.fetch(coin_ids, currency).await {
            Ok(prices) => prices,
            Err(e) => {
                tracing::warn!("price refresh failed, serving stored prices: {}", e);
                return self.fallback_all(coin_ids).await;
            }
        };

        let now = Utc::now().timestamp_millis();
        let mut out = PriceMap::with_capacity(coin_ids.len());
        for coin in coin_ids {
            match fetched.get(coin).copied().filter(|p| is_valid_price(*p)) {
                Some(price) => {
                    let sample = PriceSample::new(coin, price, currency, now);
                    if let Err(e) = self.store.append(&sample).await {
                        tracing::error!("failed to record {} {} price: {}", coin, currency, e);
                    }
                    out.insert(coin.clone(), price);
                }
                None => {
                    tracing::warn!("no valid price for {} in {}", coin, currency);
                    out.insert(coin.clone(), self.fallback(coin).await);
                }
            }
        }
        out
    }

    /// The stored prices, if every coin has a sample inside the window.
    /// Each coin's freshness and value come from the same read.
    async fn fresh_snapshot(&self, coin_ids: &[String], currency: &str) -> Option<PriceMap> {
        let now = Utc::now().timestamp_millis();
        let window = i64::try_from(self.freshness.as_millis()).unwrap_or(i64::MAX);

        let mut out = PriceMap::with_capacity(coin_ids.len());
        for coin in coin_ids {
            let sample = match self.store.latest(coin, currency).await {
                Ok(Some(s)) => s,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!("cache lookup for {} failed: {}", coin, e);
                    return None;
                }
            };

            if sample.age_ms(now) > window {
                return None;
            }
            out.insert(coin.clone(), sample.price);
        }
        Some(out)
    }

    async fn fallback_all(&self, coin_ids: &[String]) -> PriceMap {
        let mut out = PriceMap::with_capacity(coin_ids.len());
        for coin in coin_ids {
            out.insert(coin.clone(), self.fallback(coin).await);
        }
        out
    }

    async fn fallback(&self, coin_id: &str) -> f64 {
        match self.store.latest_any(coin_id).await {
            Ok(Some(s)) => s.price,
            Ok(None) => 0.0,
            Err(e) => {
                tracing::warn!("fallback lookup for {} failed: {}", coin_id, e);
                0.0
            }
        }
    }
}
