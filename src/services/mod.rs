pub mod price_source;
pub mod price_store;
pub mod alert_store;
pub mod price_cache;
pub mod broadcast;
pub mod ingestion;
pub mod db_init;

pub mod alerts_service;
