use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{models::referralmodel::RewardType, service::Outcome};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
    pub mock: bool,
}

impl<T> ApiResponse<T> {
    pub fn from_outcome(message: &str, outcome: Outcome<T>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(outcome.data),
            mock: outcome.mock,
        }
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReferralDto {
    #[validate(length(min = 1, message = "User id is required"))]
    #[serde(rename = "userId")]
    pub user_id: String,

    #[validate(length(min = 1, message = "Referral code is required"))]
    #[serde(rename = "referralCode")]
    pub referral_code: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CompleteReferralDto {
    #[validate(length(min = 1, message = "Order id is required"))]
    #[serde(rename = "orderId")]
    pub order_id: String,

    #[validate(range(min = 0.01, message = "Order amount must be positive"))]
    #[serde(rename = "orderAmount")]
    pub order_amount: f64,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct UseRewardDto {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedDto {
    #[validate(length(min = 1, message = "User id is required"))]
    #[serde(rename = "userId")]
    pub user_id: String,

    #[validate(length(min = 1, message = "Order id is required"))]
    #[serde(rename = "orderId")]
    pub order_id: String,

    #[validate(range(min = 0.01, message = "Order amount must be positive"))]
    #[serde(rename = "orderAmount")]
    pub order_amount: f64,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RewardQuery {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    #[serde(rename = "type", default)]
    pub reward_type: Option<RewardType>,
}
