use serde::{Deserialize, Serialize};

/// Currencies the on-demand price route will ask upstream for.
pub const SUPPORTED_CURRENCIES: [&str; 6] = ["usd", "eur", "gbp", "jpy", "inr", "aud"];

/// Maps a requested currency onto a supported code, serving unknown ones as `usd`.
pub fn normalize_currency(raw: &str) -> &'static str {
    let wanted = raw.trim().to_lowercase();
    SUPPORTED_CURRENCIES
        .iter()
        .copied()
        .find(|c| *c == wanted)
        .unwrap_or("usd")
}

/// One historical price observation. Only ever built from a successful
/// upstream fetch with a positive price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub coin_id: String,
    pub price: f64,
    pub currency: String,

    // unix millis
    pub fetched_at: i64,
}

impl PriceSample {
    pub fn new(coin_id: &str, price: f64, currency: &str, fetched_at: i64) -> Self {
        Self {
            coin_id: coin_id.to_string(),
            price,
            currency: currency.to_string(),
            fetched_at,
        }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.fetched_at)
    }
}

/// Upstream values that may be recorded as history.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}
