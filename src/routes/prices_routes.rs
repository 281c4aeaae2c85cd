use axum::{Router, routing::get};
use crate::{AppState, controllers::prices_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/prices", get(prices_controller::get_prices))
        .route("/api/prices/probe", get(prices_controller::get_probe))
        .route("/api/prices/history/:coin_id", get(prices_controller::get_history))
}
