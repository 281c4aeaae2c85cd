use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::{
    bson::doc,
    options::{FindOneOptions, FindOptions},
    Collection, Database,
};

use crate::{error::StoreError, models::PriceSample};

pub const PRICES_COLLECTION: &str = "prices";

/// Append-only price history.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Unconditional insert; duplicates are allowed.
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError>;

    /// Most recent sample for the coin in this currency.
    async fn latest(&self, coin_id: &str, currency: &str) -> Result<Option<PriceSample>, StoreError>;

    /// Most recent sample for the coin in any currency.
    async fn latest_any(&self, coin_id: &str) -> Result<Option<PriceSample>, StoreError>;

    /// Newest `limit` samples, returned oldest first.
    async fn recent(&self, coin_id: &str, currency: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError>;
}

#[derive(Clone)]
pub struct MongoPriceStore {
    col: Collection<PriceSample>,
}

impl MongoPriceStore {
    pub fn new(db: &Database) -> Self {
        Self {
            col: db.collection::<PriceSample>(PRICES_COLLECTION),
        }
    }

    async fn newest(&self, filter: mongodb::bson::Document) -> Result<Option<PriceSample>, StoreError> {
        let opts = FindOneOptions::builder().sort(doc! { "fetched_at": -1 }).build();
        Ok(self.col.find_one(filter, opts).await?)
    }
}

#[async_trait]
impl PriceStore for MongoPriceStore {
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        self.col.insert_one(sample, None).await?;
        Ok(())
    }

    async fn latest(&self, coin_id: &str, currency: &str) -> Result<Option<PriceSample>, StoreError> {
        self.newest(doc! { "coin_id": coin_id, "currency": currency }).await
    }

    async fn latest_any(&self, coin_id: &str) -> Result<Option<PriceSample>, StoreError> {
        self.newest(doc! { "coin_id": coin_id }).await
    }

    async fn recent(&self, coin_id: &str, currency: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let opts = FindOptions::builder()
            .sort(doc! { "fetched_at": -1 })
            .limit(limit as i64)
            .build();

        let mut cursor = self
            .col
            .find(doc! { "coin_id": coin_id, "currency": currency }, opts)
            .await?;

        let mut items = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }

        items.reverse();
        Ok(items)
    }
}

/// Process-local history; lost on restart.
///
/// Samples are kept per coin and currency, each series sorted by `fetched_at`,
/// so lookups never scan other coins. Nothing is evicted: memory grows with
/// every cycle for as long as the process runs.
#[derive(Default)]
pub struct MemoryPriceStore {
    inner: RwLock<MemorySeries>,
}

#[derive(Default)]
struct MemorySeries {
    next_seq: u64,
    by_coin: HashMap<String, HashMap<String, Vec<Stored>>>,
}

/// `seq` breaks `fetched_at` ties in favour of the later insert.
struct Stored {
    seq: u64,
    sample: PriceSample,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.by_coin.values().flat_map(|c| c.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every sample, oldest first.
    pub fn all(&self) -> Vec<PriceSample> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut items: Vec<&Stored> = guard.by_coin.values().flat_map(|c| c.values()).flatten().collect();
        items.sort_by_key(|s| (s.sample.fetched_at, s.seq));
        items.into_iter().map(|s| s.sample.clone()).collect()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let seq = guard.next_seq;
        guard.next_seq += 1;

        let series = guard
            .by_coin
            .entry(sample.coin_id.clone())
            .or_default()
            .entry(sample.currency.clone())
            .or_default();
        // equal timestamps land after existing ones, keeping insert order
        let at = series.partition_point(|s| s.sample.fetched_at <= sample.fetched_at);
        series.insert(at, Stored { seq, sample: sample.clone() });
        Ok(())
    }

    async fn latest(&self, coin_id: &str, currency: &str) -> Result<Option<PriceSample>, StoreError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .by_coin
            .get(coin_id)
            .and_then(|c| c.get(currency))
            .and_then(|series| series.last())
            .map(|s| s.sample.clone()))
    }

    async fn latest_any(&self, coin_id: &str) -> Result<Option<PriceSample>, StoreError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .by_coin
            .get(coin_id)
            .and_then(|c| {
                c.values()
                    .filter_map(|series| series.last())
                    .max_by_key(|s| (s.sample.fetched_at, s.seq))
            })
            .map(|s| s.sample.clone()))
    }

    async fn recent(&self, coin_id: &str, currency: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let Some(series) = guard.by_coin.get(coin_id).and_then(|c| c.get(currency)) else {
            return Ok(Vec::new());
        };

        let skip = series.len().saturating_sub(limit);
        Ok(series[skip..].iter().map(|s| s.sample.clone()).collect())
    }
}
