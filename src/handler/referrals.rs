use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use super::{parse_id, require_user_id};
use crate::{
    dtos::{ApiResponse, ApplyReferralDto, CompleteReferralDto, UserQuery},
    error::{ErrorMessage, HttpError},
    service::referral_ledger::ApplyContext,
    AppState,
};

pub fn referrals_handler() -> Router {
    Router::new()
        .route("/", get(list_referrals))
        .route("/stats", get(get_referral_stats))
        .route("/apply", post(apply_referral))
        .route("/:referral_id/complete", post(complete_referral))
        .route("/:referral_id/cancel", post(cancel_referral))
}

pub async fn apply_referral(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<ApplyReferralDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user_id = require_user_id(&body.user_id)?;
    if body.referral_code.trim().is_empty() {
        return Err(HttpError::bad_request(ErrorMessage::ReferralCodeRequired.to_string()));
    }

    let outcome = app_state
        .ledger
        .apply_referral_code(&user_id, &body.referral_code, ApplyContext::PostSignup)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::from_outcome("Referral code applied successfully", outcome)),
    ))
}

pub async fn complete_referral(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(referral_id): Path<String>,
    Json(body): Json<CompleteReferralDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let referral_id = parse_id(&referral_id)?;
    if body.order_id.trim().is_empty() {
        return Err(HttpError::bad_request(ErrorMessage::OrderIdRequired.to_string()));
    }

    let outcome = app_state
        .ledger
        .complete_referral(referral_id, &body.order_id, body.order_amount)
        .await?;

    Ok(Json(ApiResponse::from_outcome("Referral completed", outcome)))
}

pub async fn cancel_referral(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(referral_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let referral_id = parse_id(&referral_id)?;

    let outcome = app_state.ledger.cancel_referral(referral_id).await?;

    Ok(Json(ApiResponse::from_outcome("Referral cancelled", outcome)))
}

pub async fn list_referrals(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user_id = require_user_id(&params.user_id)?;

    let outcome = app_state.ledger.list_referrals(&user_id).await?;

    Ok(Json(ApiResponse::from_outcome("Referrals retrieved successfully", outcome)))
}

pub async fn get_referral_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user_id = require_user_id(&params.user_id)?;

    let outcome = app_state.ledger.compute_statistics(&user_id).await?;

    Ok(Json(ApiResponse::from_outcome("Referral stats retrieved", outcome)))
}
