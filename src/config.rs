use std::env;
use std::time::Duration;

pub const DEFAULT_TRACKED_COINS: [&str; 5] = ["bitcoin", "ethereum", "solana", "dogecoin", "cardano"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    pub store_backend: StoreBackend,
    pub mongodb_uri: String,
    pub mongodb_db: String,

    pub jwt_secret: String,
    pub jwt_cookie_name: String,

    pub price_api_url: String,
    pub price_api_key: String,
    pub price_api_timeout: Duration,

    pub tracked_coins: Vec<String>,
    pub alert_currency: String,
    pub ingest_interval: Duration,
    pub cache_freshness: Duration,
    pub events_capacity: usize,

    pub cors_origin: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Splits a comma separated coin list, lowercasing and dropping blanks/duplicates.
pub fn parse_coin_list(raw: &str) -> Vec<String> {
    let mut coins: Vec<String> = Vec::new();
    for c in raw.split(',').map(|s| s.trim().to_lowercase()) {
        if !c.is_empty() && !coins.contains(&c) {
            coins.push(c);
        }
    }
    coins
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let store_backend = match var_or("STORE_BACKEND", "mongo").to_lowercase().as_str() {
        "memory" => StoreBackend::Memory,
        _ => StoreBackend::Mongo,
    };

    let mut tracked_coins = parse_coin_list(&var_or("TRACKED_COINS", ""));
    if tracked_coins.is_empty() {
        tracked_coins = DEFAULT_TRACKED_COINS.iter().map(|c| c.to_string()).collect();
    }

    Settings {
        host: var_or("HOST", "127.0.0.1"),
        port: parsed_or("PORT", 5000),

        store_backend,
        mongodb_uri: var_or("MONGODB_URI", "mongodb://localhost:27017"),
        mongodb_db: var_or("MONGODB_DB", "coinwatch"),

        jwt_secret: var_or("JWT_SECRET", "change-me-dev-secret"),
        jwt_cookie_name: var_or("JWT_COOKIE_NAME", "auth"),

        price_api_url: var_or("PRICE_API_URL", "https://api.coingecko.com/api/v3/simple/price"),
        price_api_key: var_or("PRICE_API_KEY", ""),
        price_api_timeout: Duration::from_secs(parsed_or("PRICE_API_TIMEOUT_SECS", 10u64).max(1)),

        tracked_coins,
        alert_currency: var_or("ALERT_CURRENCY", "usd").trim().to_lowercase(),
        ingest_interval: Duration::from_secs(parsed_or("INGEST_INTERVAL_SECS", 30u64).max(1)),
        cache_freshness: Duration::from_secs(parsed_or("CACHE_FRESHNESS_SECS", 60u64)),
        events_capacity: parsed_or("EVENTS_CAPACITY", 256usize).max(1),

        cors_origin: var_or("CORS_ORIGIN", "http://localhost:3000"),
    }
}
