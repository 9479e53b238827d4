// routes.rs
use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        orders::orders_handler, referrals::referrals_handler, rewards::rewards_handler,
        users::users_handler,
    },
    AppState,
};

async fn health_check(Extension(app_state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "persistence": app_state.persistence.mode(),
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .route("/healthchecker", get(health_check))
        .nest("/users", users_handler())
        .nest("/referrals", referrals_handler())
        .nest("/rewards", rewards_handler())
        .nest("/orders", orders_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new().nest("/api", api_route)
}
