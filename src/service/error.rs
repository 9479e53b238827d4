use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::StoreError,
    error::HttpError,
    models::referralmodel::ReferralStatus,
};

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Expired,
    Unavailable,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Invalid referral code {0}")]
    InvalidReferralCode(String),

    #[error("Referral {0} not found")]
    ReferralNotFound(Uuid),

    #[error("Reward {0} not found")]
    RewardNotFound(Uuid),

    #[error("Cannot use your own referral code")]
    SelfReferral,

    #[error("User has already been referred")]
    AlreadyReferred,

    #[error("Referral {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Referral {0} is {1:?} and can no longer change")]
    InvalidReferralState(Uuid, ReferralStatus),

    #[error("Reward {0} has already been used")]
    RewardAlreadyUsed(Uuid),

    #[error("Reward {0} has expired")]
    RewardExpired(Uuid),

    #[error("Email {0} is already registered")]
    EmailTaken(String),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[source] StoreError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => ServiceError::Unavailable(reason),
            other => ServiceError::Database(other),
        }
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,

            ServiceError::UserNotFound(_)
            | ServiceError::InvalidReferralCode(_)
            | ServiceError::ReferralNotFound(_)
            | ServiceError::RewardNotFound(_) => ErrorKind::NotFound,

            ServiceError::SelfReferral
            | ServiceError::AlreadyReferred
            | ServiceError::AlreadyCompleted(_)
            | ServiceError::InvalidReferralState(_, _)
            | ServiceError::RewardAlreadyUsed(_)
            | ServiceError::EmailTaken(_) => ErrorKind::Conflict,

            ServiceError::RewardExpired(_) => ErrorKind::Expired,

            ServiceError::Unavailable(_) => ErrorKind::Unavailable,

            ServiceError::Database(_) | ServiceError::Other(_) => ErrorKind::Internal,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error.kind() {
            ErrorKind::Validation => HttpError::bad_request(error.to_string()),
            ErrorKind::NotFound => HttpError::not_found(error.to_string()),
            ErrorKind::Conflict => HttpError::conflict(error.to_string()),
            ErrorKind::Expired => HttpError::gone(error.to_string()),
            ErrorKind::Unavailable => HttpError::service_unavailable(error.to_string()),
            ErrorKind::Internal => {
                tracing::error!("internal error: {}", error);
                HttpError::server_error(crate::error::ErrorMessage::ServerError.to_string())
            }
        }
    }
}
