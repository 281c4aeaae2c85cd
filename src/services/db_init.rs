use mongodb::{bson::doc, Database, IndexModel};

use crate::{
    error::StoreError,
    services::{alert_store::ALERTS_COLLECTION, price_store::PRICES_COLLECTION},
};

pub async fn ensure_indexes(db: &Database) -> Result<(), StoreError> {
    // prices: latest per (coin, currency), and history windows
    {
        let col = db.collection::<mongodb::bson::Document>(PRICES_COLLECTION);
        let by_currency = IndexModel::builder()
            .keys(doc! { "coin_id": 1, "currency": 1, "fetched_at": -1 })
            .build();
        let by_coin = IndexModel::builder()
            .keys(doc! { "coin_id": 1, "fetched_at": -1 })
            .build();

        col.create_indexes([by_currency, by_coin], None).await?;
    }

    // alerts: ingestion scan, and per-owner listing
    {
        let col = db.collection::<mongodb::bson::Document>(ALERTS_COLLECTION);
        let scan = IndexModel::builder()
            .keys(doc! { "triggered": 1, "owner_id": 1 })
            .build();
        let by_owner = IndexModel::builder()
            .keys(doc! { "owner_id": 1, "created_at": -1 })
            .build();

        col.create_indexes([scan, by_owner], None).await?;
    }

    Ok(())
}
