use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    models::{Alert, CurrentUser},
    services::alerts_service,
    AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertBody {
    pub coin_id: Option<String>,
    // number or numeric string
    pub threshold: Option<Value>,
    pub condition: Option<String>,
}

fn threshold_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn require_user(user: Option<Extension<CurrentUser>>) -> Result<CurrentUser, ApiError> {
    user.map(|Extension(u)| u).ok_or(ApiError::Unauthorized)
}

pub fn alert_json(a: &Alert) -> Value {
    json!({
        "id": a.id.to_hex(),
        "ownerId": a.owner_id.map(|o| o.to_hex()),
        "coinId": a.coin_id,
        "threshold": a.threshold,
        "condition": a.condition,
        "isTriggered": a.triggered,
        "triggeredAt": a.triggered_at,
        "createdAt": a.created_at,
    })
}

// POST /api/alerts
pub async fn post_create_alert(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    body: Result<Json<CreateAlertBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let u = require_user(user)?;
    let Json(body) = body.map_err(|e| {
        tracing::debug!("rejected alert body: {}", e);
        ApiError::BadRequest("Invalid request body".to_string())
    })?;

    // a present but non-numeric threshold is invalid rather than missing
    let threshold = match &body.threshold {
        None | Some(Value::Null) => None,
        Some(v) => Some(threshold_value(v).unwrap_or(f64::NAN)),
    };

    let alert = alerts_service::create_alert(
        &state,
        u.id,
        body.coin_id.as_deref(),
        threshold,
        body.condition.as_deref(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(alert_json(&alert))))
}

// GET /api/alerts
pub async fn get_alerts(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let u = require_user(user)?;
    let alerts = alerts_service::list_alerts(&state, u.id).await?;
    Ok(Json(alerts.iter().map(alert_json).collect()))
}

// DELETE /api/alerts/:id
pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Value>, ApiError> {
    let u = require_user(user)?;

    let oid = ObjectId::parse_str(&id).map_err(|_| ApiError::BadRequest("Invalid alert id".to_string()))?;
    alerts_service::delete_alert(&state, u.id, oid).await?;

    Ok(Json(json!({ "message": "Alert deleted" })))
}

// DELETE /api/alerts/admin/cleanup
pub async fn delete_orphaned_alerts(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Value>, ApiError> {
    require_user(user)?;

    let removed = alerts_service::purge_orphaned(&state).await?;
    Ok(Json(json!({
        "message": format!("Cleaned up {removed} corrupted alerts"),
        "deletedCount": removed,
    })))
}
