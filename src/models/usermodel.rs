use std::fmt;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier a caller uses to name a user.
///
/// Either the canonical account UUID or the identifier handed out by the
/// external auth provider. Only the user directory knows how to tell them
/// apart; everything above it passes the value through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new<T: Into<String>>(raw: T) -> Self {
        UserId(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        UserId(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_uid: Option<String>,
    pub email: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<String>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub auth_uid: Option<String>,
    pub email: String,
    pub name: String,
    pub mobile_number: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<String>,
}

/// Profile fields a user may change after registration.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub referred_by: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.mobile_number.is_none() && self.referred_by.is_none()
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(mobile) = &self.mobile_number {
            user.mobile_number = Some(mobile.clone());
        }
        if let Some(code) = &self.referred_by {
            user.referred_by = Some(code.clone());
        }
    }
}
