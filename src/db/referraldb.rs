// db/referraldb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DBClient, StoreError};
use crate::models::referralmodel::{
    NewReferral, Referral, ReferralStatus, Reward, RewardType,
};

/// Terms the store needs to close out a referral in one step.
#[derive(Debug, Clone)]
pub struct CompletionTerms {
    pub completed_at: DateTime<Utc>,
    pub bonus_description: String,
}

#[async_trait]
pub trait ReferralExt {
    /// Fails with [`StoreError::UniqueViolation`] when the referred user
    /// already has a referral.
    async fn insert_referral(&self, new_referral: NewReferral) -> Result<Referral, StoreError>;

    async fn get_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError>;

    async fn find_referral_by_referred(
        &self,
        referred_id: Uuid,
    ) -> Result<Option<Referral>, StoreError>;

    async fn find_referral_between(
        &self,
        referrer_id: Uuid,
        referred_id: Uuid,
    ) -> Result<Option<Referral>, StoreError>;

    /// Referrals where the user is on either side, newest first.
    async fn list_referrals_for_user(&self, user_id: Uuid) -> Result<Vec<Referral>, StoreError>;

    async fn list_referrals_by_referrer(
        &self,
        referrer_id: Uuid,
    ) -> Result<Vec<Referral>, StoreError>;

    /// Moves a pending referral to completed, issues the referrer bonus and
    /// marks it given. `None` when the referral was not pending.
    async fn complete_referral(
        &self,
        referral_id: Uuid,
        terms: CompletionTerms,
    ) -> Result<Option<(Referral, Reward)>, StoreError>;

    /// `None` when the referral was not pending.
    async fn cancel_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError>;
}

#[async_trait]
impl ReferralExt for DBClient {
    async fn insert_referral(&self, new_referral: NewReferral) -> Result<Referral, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            r#"
            INSERT INTO referrals
                (referrer_id, referred_id, referral_code, status, reward_amount, reward_given, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6)
            RETURNING id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            "#,
        )
        .bind(new_referral.referrer_id)
        .bind(new_referral.referred_id)
        .bind(new_referral.referral_code)
        .bind(ReferralStatus::Pending)
        .bind(new_referral.reward_amount)
        .bind(new_referral.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn get_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            FROM referrals
            WHERE id = $1
            "#,
        )
        .bind(referral_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn find_referral_by_referred(
        &self,
        referred_id: Uuid,
    ) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            FROM referrals
            WHERE referred_id = $1
            "#,
        )
        .bind(referred_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn find_referral_between(
        &self,
        referrer_id: Uuid,
        referred_id: Uuid,
    ) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            FROM referrals
            WHERE referrer_id = $1 AND referred_id = $2
            "#,
        )
        .bind(referrer_id)
        .bind(referred_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn list_referrals_for_user(&self, user_id: Uuid) -> Result<Vec<Referral>, StoreError> {
        let referrals = sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            FROM referrals
            WHERE referrer_id = $1 OR referred_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }

    async fn list_referrals_by_referrer(
        &self,
        referrer_id: Uuid,
    ) -> Result<Vec<Referral>, StoreError> {
        let referrals = sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            FROM referrals
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }

    async fn complete_referral(
        &self,
        referral_id: Uuid,
        terms: CompletionTerms,
    ) -> Result<Option<(Referral, Reward)>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Conditional on status so concurrent completions pay out once.
        let completed = sqlx::query_as::<_, Referral>(
            r#"
            UPDATE referrals
            SET status = $2, completed_at = $3
            WHERE id = $1 AND status = $4
            RETURNING id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            "#,
        )
        .bind(referral_id)
        .bind(ReferralStatus::Completed)
        .bind(terms.completed_at)
        .bind(ReferralStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(completed) = completed else {
            return Ok(None);
        };

        let bonus = sqlx::query_as::<_, Reward>(
            r#"
            INSERT INTO referral_rewards
                (user_id, referral_id, type, amount, description, used, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, false, NULL, $6)
            RETURNING id, user_id, referral_id, type, amount, description,
                used, used_order_id, expires_at, created_at
            "#,
        )
        .bind(completed.referrer_id)
        .bind(completed.id)
        .bind(RewardType::ReferralBonus)
        .bind(completed.reward_amount)
        .bind(terms.bonus_description)
        .bind(terms.completed_at)
        .fetch_one(&mut *tx)
        .await?;

        let referral = sqlx::query_as::<_, Referral>(
            r#"
            UPDATE referrals
            SET reward_given = true
            WHERE id = $1 AND status = $2
            RETURNING id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            "#,
        )
        .bind(completed.id)
        .bind(ReferralStatus::Completed)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some((referral, bonus)))
    }

    async fn cancel_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            r#"
            UPDATE referrals
            SET status = $2
            WHERE id = $1 AND status = $3
            RETURNING id, referrer_id, referred_id, referral_code, status,
                reward_amount, reward_given, created_at, completed_at
            "#,
        )
        .bind(referral_id)
        .bind(ReferralStatus::Cancelled)
        .bind(ReferralStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }
}
