use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::service::user_service::{is_valid_mobile, Registration};

fn validate_mobile(mobile: &str) -> Result<(), ValidationError> {
    if is_valid_mobile(mobile.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("mobile_number"))
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(custom(function = "validate_mobile", message = "Mobile number must be 10 to 15 digits"))]
    #[serde(rename = "mobileNumber", default)]
    pub mobile_number: Option<String>,

    #[serde(rename = "authUid", default)]
    pub auth_uid: Option<String>,

    #[serde(rename = "referralCode", default)]
    pub referral_code: Option<String>,
}

impl From<RegisterUserDto> for Registration {
    fn from(dto: RegisterUserDto) -> Self {
        Registration {
            name: dto.name,
            email: dto.email,
            mobile_number: dto.mobile_number,
            auth_uid: dto.auth_uid,
            referral_code: dto.referral_code,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct UpdateProfileDto {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,

    #[validate(custom(function = "validate_mobile", message = "Mobile number must be 10 to 15 digits"))]
    #[serde(rename = "mobileNumber", default)]
    pub mobile_number: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct UserQuery {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,
}
