use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use super::require_user_id;
use crate::{
    dtos::{ApiResponse, RegisterUserDto, UpdateProfileDto},
    error::{ErrorMessage, HttpError},
    AppState,
};

pub fn users_handler() -> Router {
    Router::new()
        .route("/register", post(register_user))
        .route("/:user_id", get(get_user).put(update_profile))
        .route("/:user_id/referral-link", get(get_referral_link))
        .route("/:user_id/referral-status", get(check_referral_status))
}

pub async fn register_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state.user_service.register(body.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::from_outcome("Registration successful", outcome)),
    ))
}

pub async fn get_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let user_id = require_user_id(&user_id)?;

    let outcome = app_state.user_service.get_user(&user_id).await?;

    Ok(Json(ApiResponse::from_outcome("User retrieved successfully", outcome)))
}

pub async fn update_profile(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateProfileDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    if body.name.is_none() && body.mobile_number.is_none() {
        return Err(HttpError::bad_request(ErrorMessage::NothingToUpdate.to_string()));
    }

    let user_id = require_user_id(&user_id)?;

    let outcome = app_state
        .user_service
        .update_profile(&user_id, body.name, body.mobile_number)
        .await?;

    Ok(Json(ApiResponse::from_outcome("Profile updated successfully", outcome)))
}

pub async fn get_referral_link(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let user_id = require_user_id(&user_id)?;

    let outcome = app_state.user_service.referral_link(&user_id).await?;

    Ok(Json(ApiResponse::from_outcome("Referral link retrieved", outcome)))
}

pub async fn check_referral_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let user_id = require_user_id(&user_id)?;

    let outcome = app_state.ledger.referral_status(&user_id).await?;

    Ok(Json(ApiResponse::from_outcome("Referral status retrieved", outcome)))
}
