use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Condition;

pub const PRICE_UPDATE: &str = "priceUpdate";
pub const ALERT_TRIGGERED: &str = "alertTriggered";

/// Payload of a `priceUpdate`: coin -> currency -> price, as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub prices: BTreeMap<String, BTreeMap<String, f64>>,
    // unix millis
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTriggered {
    pub coin: String,
    pub price: f64,
    pub condition: Condition,
    pub threshold: f64,
}

/// Everything the broadcaster can fan out. Serialises as
/// `{"event": "<topic>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    PriceUpdate(PriceUpdate),
    AlertTriggered(AlertTriggered),
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::PriceUpdate(_) => PRICE_UPDATE,
            Event::AlertTriggered(_) => ALERT_TRIGGERED,
        }
    }

    /// Payload alone, for transports that carry the topic out of band (SSE).
    pub fn payload_json(&self) -> String {
        let res = match self {
            Event::PriceUpdate(p) => serde_json::to_string(p),
            Event::AlertTriggered(a) => serde_json::to_string(a),
        };
        res.unwrap_or_else(|_| "{}".to_string())
    }
}
