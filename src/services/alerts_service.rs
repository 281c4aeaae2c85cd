use chrono::Utc;
use mongodb::bson::oid::ObjectId;

use crate::{
    error::ApiError,
    models::{Alert, Condition},
    AppState,
};

/// Validates the raw fields of a new alert and stores it for `owner_id`.
pub async fn create_alert(
    state: &AppState,
    owner_id: ObjectId,
    coin_id: Option<&str>,
    threshold: Option<f64>,
    condition: Option<&str>,
) -> Result<Alert, ApiError> {
    let coin = coin_id.map(|c| c.trim().to_lowercase()).unwrap_or_default();
    let (Some(threshold), Some(condition)) = (threshold, condition) else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };
    if coin.is_empty() {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    }

    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ApiError::BadRequest("Threshold must be a positive number".to_string()));
    }

    let condition: Condition = condition
        .parse()
        .map_err(|_| ApiError::BadRequest("Condition must be 'above' or 'below'".to_string()))?;

    let alert = Alert::new(owner_id, &coin, threshold, condition, Utc::now().timestamp_millis());
    state.alerts.create(&alert).await?;

    tracing::info!("alert {} created: {} {} {}", alert.id, alert.coin_id, alert.condition, alert.threshold);
    Ok(alert)
}

pub async fn list_alerts(state: &AppState, owner_id: ObjectId) -> Result<Vec<Alert>, ApiError> {
    Ok(state.alerts.list_by_owner(owner_id).await?)
}

pub async fn delete_alert(state: &AppState, owner_id: ObjectId, alert_id: ObjectId) -> Result<(), ApiError> {
    if state.alerts.delete_for_owner(alert_id, owner_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound("Alert not found".to_string()))
    }
}

/// Removes alerts that have lost their owner.
pub async fn purge_orphaned(state: &AppState) -> Result<u64, ApiError> {
    let removed = state.alerts.purge_orphaned().await?;
    if removed > 0 {
        tracing::warn!("cleaned up {} corrupted alerts", removed);
    }
    Ok(removed)
}
