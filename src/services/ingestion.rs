//! Periodic price ingestion and alert evaluation.
//!
//! Each cycle runs fetch -> persist -> evaluate -> publish against a single
//! fetch result. A failed fetch makes the whole cycle a no-op. Cycles never
//! overlap: the timer delays missed ticks and `run_cycle` holds a lock for
//! its full duration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{
    error::FetchError,
    models::{price::is_valid_price, AlertTriggered, Event, PriceSample, PriceUpdate},
    services::{
        alert_store::AlertStore,
        broadcast::Broadcaster,
        price_source::{PriceMap, PriceSource},
        price_store::PriceStore,
    },
};

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub tracked_coins: Vec<String>,
    pub currency: String,
    pub interval: Duration,
}

/// What one cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The fetch failed; nothing was written, evaluated or published.
    Skipped(FetchError),
    Completed(CycleReport),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub persisted: usize,
    pub evaluated: usize,
    pub triggered: Vec<ObjectId>,
}

pub struct PriceIngestor {
    settings: IngestSettings,
    source: Arc<dyn PriceSource>,
    prices: Arc<dyn PriceStore>,
    alerts: Arc<dyn AlertStore>,
    events: Broadcaster,
    cycle_lock: Mutex<()>,
}

impl PriceIngestor {
    pub fn new(
        settings: IngestSettings,
        source: Arc<dyn PriceSource>,
        prices: Arc<dyn PriceStore>,
        alerts: Arc<dyn AlertStore>,
        events: Broadcaster,
    ) -> Self {
        Self {
            settings,
            source,
            prices,
            alerts,
            events,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Spawns the timer loop. The first cycle runs immediately.
    pub fn start(self: Arc<Self>) -> IngestorHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.settings.interval;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                "price ingestion started: every {:?} for {:?} in {}",
                period,
                self.settings.tracked_coins,
                self.settings.currency
            );

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        self.run_cycle().await;
                    }
                }
            }

            tracing::info!("price ingestion stopped");
        });

        IngestorHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        let currency = self.settings.currency.as_str();

        let prices = match self.source.fetch(&self.settings.tracked_coins, currency).await {
            Ok(p) => p,
            Err(e) => {
                if e.is_rate_limited() {
                    tracing::warn!("price API rate limit reached, waiting for next cycle");
                } else {
                    tracing::error!("price fetch failed, skipping cycle: {}", e);
                }
                return CycleOutcome::Skipped(e);
            }
        };

        let now = Utc::now().timestamp_millis();
        let persisted = self.persist(&prices, now).await;
        let mut report = CycleReport {
            persisted,
            ..CycleReport::default()
        };

        let mut fired = Vec::new();
        match self.alerts.find_untriggered().await {
            Ok(alerts) => {
                tracing::debug!("checking {} active alerts", alerts.len());

                for alert in alerts {
                    if !alert.is_armed() {
                        continue;
                    }
                    let Some(price) = prices.get(&alert.coin_id).copied().filter(|p| is_valid_price(*p)) else {
                        tracing::debug!("no price for {} this cycle", alert.coin_id);
                        continue;
                    };

                    report.evaluated += 1;
                    if !alert.is_hit(price) {
                        continue;
                    }

                    match self.alerts.mark_triggered(alert.id, now).await {
                        Ok(true) => {
                            tracing::info!(
                                "alert {} triggered: {} {} {} at {}",
                                alert.id,
                                alert.coin_id,
                                alert.condition,
                                alert.threshold,
                                price
                            );
                            report.triggered.push(alert.id);
                            fired.push(AlertTriggered {
                                coin: alert.coin_id.clone(),
                                price,
                                condition: alert.condition,
                                threshold: alert.threshold,
                            });
                        }
                        // lost the race to another writer or a delete
                        Ok(false) => {}
                        Err(e) => tracing::error!("failed to mark alert {} triggered: {}", alert.id, e),
                    }
                }
            }
            Err(e) => tracing::error!("failed to load active alerts: {}", e),
        }

        self.events.publish(Event::PriceUpdate(price_update(&prices, currency, now)));
        for evt in fired {
            self.events.publish(Event::AlertTriggered(evt));
        }

        tracing::debug!(
            "cycle done: {} samples, {} alerts evaluated, {} triggered",
            report.persisted,
            report.evaluated,
            report.triggered.len()
        );
        CycleOutcome::Completed(report)
    }

    /// Appends a sample per tracked coin with a valid price. A failed write
    /// only loses that coin's sample.
    async fn persist(&self, prices: &PriceMap, now: i64) -> usize {
        let currency = self.settings.currency.as_str();
        let mut written = 0;

        for coin in &self.settings.tracked_coins {
            let Some(price) = prices.get(coin).copied().filter(|p| is_valid_price(*p)) else {
                continue;
            };

            match self.prices.append(&PriceSample::new(coin, price, currency, now)).await {
                Ok(()) => written += 1,
                Err(e) => tracing::error!("failed to record {} price: {}", coin, e),
            }
        }
        written
    }
}

fn price_update(prices: &PriceMap, currency: &str, now: i64) -> PriceUpdate {
    let prices = prices
        .iter()
        .map(|(coin, price)| {
            let mut by_currency = BTreeMap::new();
            by_currency.insert(currency.to_string(), *price);
            (coin.clone(), by_currency)
        })
        .collect();

    PriceUpdate {
        prices,
        timestamp: now,
    }
}

/// Owned handle on a running ingestion loop. Dropping it also ends the loop.
pub struct IngestorHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl IngestorHandle {
    /// Stops the loop after any in-flight cycle finishes.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!("price ingestion task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
