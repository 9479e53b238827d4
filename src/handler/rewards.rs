use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use super::{parse_id, require_user_id};
use crate::{
    dtos::{ApiResponse, RewardQuery, UseRewardDto},
    error::HttpError,
    AppState,
};

pub fn rewards_handler() -> Router {
    Router::new()
        .route("/", get(list_available_rewards))
        .route("/:reward_id/use", post(use_reward))
}

pub async fn list_available_rewards(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(params): Query<RewardQuery>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user_id = require_user_id(&params.user_id)?;

    let outcome = app_state
        .ledger
        .list_available(&user_id, params.reward_type)
        .await?;

    Ok(Json(ApiResponse::from_outcome("Available rewards retrieved", outcome)))
}

pub async fn use_reward(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(reward_id): Path<String>,
    body: Option<Json<UseRewardDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let reward_id = parse_id(&reward_id)?;
    let Json(body) = body.unwrap_or_default();

    let outcome = app_state.ledger.use_reward(reward_id, body.order_id).await?;

    Ok(Json(ApiResponse::from_outcome("Reward redeemed", outcome)))
}
