use std::net::SocketAddr;
use std::sync::Arc;

use mongodb::Client;
use tracing_subscriber::EnvFilter;

use coinwatch::{
    config::{self, StoreBackend},
    routes,
    services::{
        alert_store::{AlertStore, MemoryAlertStore, MongoAlertStore},
        alerts_service, db_init,
        price_source::CoinGeckoClient,
        price_store::{MemoryPriceStore, MongoPriceStore, PriceStore},
    },
    AppState,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coinwatch=info")),
        )
        .init();

    let settings = config::load();

    let (prices, alerts): (Arc<dyn PriceStore>, Arc<dyn AlertStore>) = match settings.store_backend {
        StoreBackend::Mongo => {
            let client = Client::with_uri_str(&settings.mongodb_uri)
                .await
                .expect("Failed to connect to MongoDB");
            let db = client.database(&settings.mongodb_db);

            if let Err(e) = db_init::ensure_indexes(&db).await {
                tracing::warn!("could not ensure indexes: {}", e);
            }

            let prices: Arc<dyn PriceStore> = Arc::new(MongoPriceStore::new(&db));
            let alerts: Arc<dyn AlertStore> = Arc::new(MongoAlertStore::new(&db));
            (prices, alerts)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory stores; nothing survives a restart");
            let prices: Arc<dyn PriceStore> = Arc::new(MemoryPriceStore::new());
            let alerts: Arc<dyn AlertStore> = Arc::new(MemoryAlertStore::new());
            (prices, alerts)
        }
    };

    let source = CoinGeckoClient::new(
        settings.price_api_url.clone(),
        settings.price_api_key.clone(),
        settings.price_api_timeout,
    )
    .expect("Failed to build HTTP client");

    let state = AppState::new(settings.clone(), Arc::new(source), prices, alerts);

    if let Err(e) = alerts_service::purge_orphaned(&state).await {
        tracing::error!("error cleaning corrupted alerts: {}", e);
    }

    let ingestion = Arc::new(state.ingestor()).start();

    let app = routes::app(state);

    let ip = settings
        .host
        .parse::<std::net::IpAddr>()
        .expect("HOST must be an IP address");
    let addr = SocketAddr::from((ip, settings.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    {
        tracing::error!("server error: {}", e);
    }

    ingestion.stop().await;
}
