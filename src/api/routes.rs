use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::ApiState};

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Read endpoints
        .route("/status", get(handlers::get_status))
        .route("/logs", get(handlers::get_logs))
        .route("/costs", get(handlers::get_costs))
        .route("/signals", get(handlers::get_signals))
        // Control endpoints (bearer token)
        .route("/config", post(handlers::post_config))
        .route("/enable", post(handlers::post_enable))
        .route("/disable", post(handlers::post_disable))
        .route("/trigger", post(handlers::post_trigger))
        // Kill switch (separate secret)
        .route("/kill", post(handlers::post_kill))
        // DEX book management
        .route("/dex/reset", post(handlers::post_dex_reset))
        .route("/dex/clear-cooldowns", post(handlers::post_dex_clear_cooldowns))
        .route("/dex/clear-breaker", post(handlers::post_dex_clear_breaker))
        // Crisis controls
        .route("/crisis/toggle", post(handlers::post_crisis_toggle))
        .route("/crisis/check", post(handlers::post_crisis_check))
        .with_state(state)
        .layer(cors)
}
