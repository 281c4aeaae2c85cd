use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    config::parse_coin_list,
    error::ApiError,
    models::{normalize_currency, PriceSample},
    services::price_source::PriceMap,
    AppState,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 500;

const PROBE_COINS: [&str; 2] = ["bitcoin", "ethereum"];

#[derive(Deserialize)]
pub struct PricesQuery {
    pub coins: Option<String>,
    pub currency: Option<String>,
}

// GET /api/prices?coins=bitcoin,ethereum&currency=usd
pub async fn get_prices(
    State(state): State<AppState>,
    Query(q): Query<PricesQuery>,
) -> Result<Json<PriceMap>, ApiError> {
    let coins = q.coins.as_deref().map(parse_coin_list).unwrap_or_default();
    if coins.is_empty() {
        return Err(ApiError::BadRequest("Coins parameter is required".to_string()));
    }

    let currency = normalize_currency(q.currency.as_deref().unwrap_or("usd"));
    Ok(Json(state.cache.get_prices(&coins, currency).await))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub currency: Option<String>,
    pub limit: Option<usize>,
}

fn sample_json(s: &PriceSample) -> Value {
    json!({
        "coinId": s.coin_id,
        "price": s.price,
        "currency": s.currency,
        "fetchedAt": s.fetched_at,
    })
}

// GET /api/prices/history/:coin_id
pub async fn get_history(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
    q: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let Query(q) = q.map_err(|_| ApiError::BadRequest("Invalid query parameters".to_string()))?;
    let coin = coin_id.trim().to_lowercase();
    let currency = normalize_currency(q.currency.as_deref().unwrap_or("usd"));
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);

    let history = state.prices.recent(&coin, currency, limit).await?;
    Ok(Json(history.iter().map(sample_json).collect()))
}

#[derive(Deserialize)]
pub struct ProbeQuery {
    pub currency: Option<String>,
}

// GET /api/prices/probe?currency=eur
pub async fn get_probe(
    State(state): State<AppState>,
    Query(q): Query<ProbeQuery>,
) -> Result<Json<Value>, ApiError> {
    let currency = normalize_currency(q.currency.as_deref().unwrap_or("eur"));
    let coins: Vec<String> = PROBE_COINS.iter().map(|c| c.to_string()).collect();

    let prices = state.source.fetch(&coins, currency).await?;

    let mut data = serde_json::Map::new();
    for (coin, price) in prices {
        let mut by_currency = serde_json::Map::new();
        by_currency.insert(currency.to_string(), json!(price));
        data.insert(coin, Value::Object(by_currency));
    }

    Ok(Json(json!({ "status": "success", "data": data })))
}
