pub mod orders;
pub mod referrals;
pub mod rewards;
pub mod users;

use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::UserId,
};

pub(crate) fn require_user_id(raw: &str) -> Result<UserId, HttpError> {
    let user_id = UserId::new(raw);
    if user_id.is_empty() {
        return Err(HttpError::bad_request(ErrorMessage::UserIdRequired.to_string()));
    }
    Ok(user_id)
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| HttpError::bad_request(ErrorMessage::InvalidIdentifier.to_string()))
}
