use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{error::FetchError, models::price::is_valid_price};

/// Current prices for a batch of coins in one currency. Coins the upstream
/// has no usable price for are simply absent.
pub type PriceMap = HashMap<String, f64>;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// One upstream call for the whole batch. No retries.
    async fn fetch(&self, coin_ids: &[String], currency: &str) -> Result<PriceMap, FetchError>;
}

/// `simple/price` client for CoinGecko-compatible APIs.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: Client,
    url: String,
    api_key: String,
}

impl CoinGeckoClient {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { http, url, api_key })
    }

    fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch(&self, coin_ids: &[String], currency: &str) -> Result<PriceMap, FetchError> {
        if coin_ids.is_empty() {
            return Ok(PriceMap::new());
        }

        let ids = coin_ids.join(",");
        let mut req = self
            .http
            .get(&self.url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", currency)]);
        if self.has_key() {
            req = req.header("x-cg-demo-api-key", &self.api_key);
        }

        let res = req.send().await?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = res.json::<Value>().await?;
        parse_simple_price(&body, coin_ids, currency)
    }
}

/// Extracts `{coin: {currency: price}}` for the requested coins. Missing,
/// non-numeric or non-positive entries are dropped; a body that is not an
/// object at all fails the call.
pub fn parse_simple_price(body: &Value, coin_ids: &[String], currency: &str) -> Result<PriceMap, FetchError> {
    let obj = body
        .as_object()
        .ok_or_else(|| FetchError::Malformed(format!("expected object, got {body}")))?;

    let mut out = PriceMap::new();
    for coin in coin_ids {
        let price = obj
            .get(coin)
            .and_then(|entry| entry.get(currency))
            .and_then(Value::as_f64);

        match price {
            Some(p) if is_valid_price(p) => {
                out.insert(coin.clone(), p);
            }
            _ => tracing::debug!("no valid {} price for {}", currency, coin),
        }
    }

    Ok(out)
}
