// db/userdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{DBClient, StoreError, UserKey};
use crate::models::usermodel::{NewUser, User, UserId, UserPatch};

#[async_trait]
pub trait UserExt {
    async fn find_user_by_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn update_user(
        &self,
        user_id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn find_user_by_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        let user = match UserKey::resolve(user_id) {
            UserKey::Id(id) => {
                sqlx::query_as::<_, User>(
                    r#"
                    SELECT id, auth_uid, email, name, mobile_number,
                        referral_code, referred_by, created_at, updated_at
                    FROM users
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            UserKey::AuthUid(auth_uid) => {
                sqlx::query_as::<_, User>(
                    r#"
                    SELECT id, auth_uid, email, name, mobile_number,
                        referral_code, referred_by, created_at, updated_at
                    FROM users
                    WHERE auth_uid = $1
                    "#,
                )
                .bind(auth_uid)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, auth_uid, email, name, mobile_number,
                referral_code, referred_by, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, auth_uid, email, name, mobile_number,
                referral_code, referred_by, created_at, updated_at
            FROM users
            WHERE referral_code = $1
            "#,
        )
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (auth_uid, email, name, mobile_number, referral_code, referred_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, auth_uid, email, name, mobile_number,
                referral_code, referred_by, created_at, updated_at
            "#,
        )
        .bind(new_user.auth_uid)
        .bind(new_user.email.trim().to_lowercase())
        .bind(new_user.name)
        .bind(new_user.mobile_number)
        .bind(new_user.referral_code)
        .bind(new_user.referred_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                mobile_number = COALESCE($3, mobile_number),
                referred_by = COALESCE($4, referred_by),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, auth_uid, email, name, mobile_number,
                referral_code, referred_by, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(patch.name)
        .bind(patch.mobile_number)
        .bind(patch.referred_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
