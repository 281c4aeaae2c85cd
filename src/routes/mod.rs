use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::{controllers::home_controller, AppState};

pub mod home_routes;
pub mod prices_routes;
pub mod alerts_routes;
pub mod realtime_routes;

fn cors(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    match origin.parse::<HeaderValue>() {
        Ok(v) if origin != "*" => layer.allow_origin(v),
        _ => layer.allow_origin(Any),
    }
}

pub fn app(state: AppState) -> Router {
    let router = Router::<AppState>::new();

    let router = home_routes::add_routes(router);
    let router = prices_routes::add_routes(router);
    let router = alerts_routes::add_routes(router);
    let router = realtime_routes::add_routes(router);

    router
        .fallback(home_controller::not_found)
        .layer(from_fn_with_state(state.clone(), crate::auth::inject_current_user))
        .layer(cors(&state.settings.cors_origin))
        .with_state(state)
}
