// db/rewarddb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DBClient, StoreError};
use crate::models::referralmodel::{NewReward, Reward};

#[async_trait]
pub trait RewardExt {
    async fn insert_reward(&self, new_reward: NewReward) -> Result<Reward, StoreError>;

    async fn get_reward(&self, reward_id: Uuid) -> Result<Option<Reward>, StoreError>;

    /// All rewards held by the user, newest first.
    async fn list_rewards_for_user(&self, user_id: Uuid) -> Result<Vec<Reward>, StoreError>;

    /// Flips `used` only if the reward is still available at `now`.
    async fn mark_reward_used(
        &self,
        reward_id: Uuid,
        order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Reward>, StoreError>;
}

#[async_trait]
impl RewardExt for DBClient {
    async fn insert_reward(&self, new_reward: NewReward) -> Result<Reward, StoreError> {
        let reward = sqlx::query_as::<_, Reward>(
            r#"
            INSERT INTO referral_rewards
                (user_id, referral_id, type, amount, description, used, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6, $7)
            RETURNING id, user_id, referral_id, type, amount, description,
                used, used_order_id, expires_at, created_at
            "#,
        )
        .bind(new_reward.user_id)
        .bind(new_reward.referral_id)
        .bind(new_reward.reward_type)
        .bind(new_reward.amount)
        .bind(new_reward.description)
        .bind(new_reward.expires_at)
        .bind(new_reward.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(reward)
    }

    async fn get_reward(&self, reward_id: Uuid) -> Result<Option<Reward>, StoreError> {
        let reward = sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, user_id, referral_id, type, amount, description,
                used, used_order_id, expires_at, created_at
            FROM referral_rewards
            WHERE id = $1
            "#,
        )
        .bind(reward_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }

    async fn list_rewards_for_user(&self, user_id: Uuid) -> Result<Vec<Reward>, StoreError> {
        let rewards = sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, user_id, referral_id, type, amount, description,
                used, used_order_id, expires_at, created_at
            FROM referral_rewards
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rewards)
    }

    async fn mark_reward_used(
        &self,
        reward_id: Uuid,
        order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Reward>, StoreError> {
        let reward = sqlx::query_as::<_, Reward>(
            r#"
            UPDATE referral_rewards
            SET used = true, used_order_id = $2
            WHERE id = $1
                AND used = false
                AND (expires_at IS NULL OR expires_at > $3)
            RETURNING id, user_id, referral_id, type, amount, description,
                used, used_order_id, expires_at, created_at
            "#,
        )
        .bind(reward_id)
        .bind(order_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }
}
