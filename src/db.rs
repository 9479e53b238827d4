// db.rs
use sqlx::{Pool, Postgres};
use thiserror::Error;
use uuid::Uuid;

use crate::models::usermodel::UserId;

pub mod memory;
pub mod referraldb;
pub mod rewarddb;
pub mod userdb;

pub use memory::MemoryStore;
pub use referraldb::ReferralExt;
pub use rewarddb::RewardExt;
pub use userdb::UserExt;

#[derive(Debug, Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.constraint().unwrap_or("unique").to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// How a [`UserId`] maps onto the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserKey {
    Id(Uuid),
    AuthUid(String),
}

impl UserKey {
    pub fn resolve(user_id: &UserId) -> Self {
        match Uuid::parse_str(user_id.as_str()) {
            Ok(id) => UserKey::Id(id),
            Err(_) => UserKey::AuthUid(user_id.as_str().to_string()),
        }
    }
}

/// Everything the ledger needs from persistence.
pub trait LedgerStore: UserExt + ReferralExt + RewardExt + Send + Sync {}

impl<T> LedgerStore for T where T: UserExt + ReferralExt + RewardExt + Send + Sync {}
