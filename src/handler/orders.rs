use std::sync::Arc;

use axum::{response::IntoResponse, routing::post, Extension, Json, Router};
use validator::Validate;

use super::require_user_id;
use crate::{
    dtos::{ApiResponse, OrderCompletedDto},
    error::HttpError,
    AppState,
};

pub fn orders_handler() -> Router {
    Router::new().route("/completed", post(order_completed))
}

pub async fn order_completed(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<OrderCompletedDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user_id = require_user_id(&body.user_id)?;

    let outcome = app_state
        .order_gateway
        .order_completed(&user_id, &body.order_id, body.order_amount)
        .await?;

    let message = if outcome.data.is_some() {
        "Referral completed for order"
    } else {
        "No pending referral for this order"
    };

    Ok(Json(ApiResponse::from_outcome(message, outcome)))
}
