//! In-process store backing development runs and tests.
//!
//! Holds the same three tables as the Postgres schema and enforces the same
//! uniqueness rules. Every check-and-write happens under one write lock, which
//! stands in for the database constraints and conditional updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    referraldb::CompletionTerms, ReferralExt, RewardExt, StoreError, UserExt, UserKey,
};
use crate::models::{
    referralmodel::{NewReferral, NewReward, Referral, ReferralStatus, Reward, RewardType},
    usermodel::{NewUser, User, UserId, UserPatch},
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    referrals: HashMap<Uuid, Referral>,
    rewards: HashMap<Uuid, Reward>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    online: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates losing the database; every call then reports
    /// [`StoreError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }

    #[cfg(test)]
    pub async fn referral_count(&self) -> usize {
        self.tables.read().await.referrals.len()
    }

    #[cfg(test)]
    pub async fn reward_count(&self) -> usize {
        self.tables.read().await.rewards.len()
    }

    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows
}

#[async_trait]
impl UserExt for MemoryStore {
    async fn find_user_by_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;

        let user = match UserKey::resolve(user_id) {
            UserKey::Id(id) => tables.users.get(&id).cloned(),
            UserKey::AuthUid(auth_uid) => tables
                .users
                .values()
                .find(|u| u.auth_uid.as_deref() == Some(auth_uid.as_str()))
                .cloned(),
        };

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        let email = email.trim().to_lowercase();
        let tables = self.tables.read().await;

        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;

        Ok(tables
            .users
            .values()
            .find(|u| u.referral_code == referral_code)
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.ensure_online()?;
        let email = new_user.email.trim().to_lowercase();
        let mut tables = self.tables.write().await;

        for existing in tables.users.values() {
            if existing.email == email {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
            if existing.referral_code == new_user.referral_code {
                return Err(StoreError::UniqueViolation(
                    "users_referral_code_key".to_string(),
                ));
            }
            if new_user.auth_uid.is_some() && existing.auth_uid == new_user.auth_uid {
                return Err(StoreError::UniqueViolation("users_auth_uid_key".to_string()));
            }
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            auth_uid: new_user.auth_uid,
            email,
            name: new_user.name,
            mobile_number: new_user.mobile_number,
            referral_code: new_user.referral_code,
            referred_by: new_user.referred_by,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;

        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        patch.apply_to(user);
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl ReferralExt for MemoryStore {
    async fn insert_referral(&self, new_referral: NewReferral) -> Result<Referral, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;

        if tables
            .referrals
            .values()
            .any(|r| r.referred_id == new_referral.referred_id)
        {
            return Err(StoreError::UniqueViolation(
                "referrals_referred_id_key".to_string(),
            ));
        }

        let referral = Referral {
            id: Uuid::new_v4(),
            referrer_id: new_referral.referrer_id,
            referred_id: new_referral.referred_id,
            referral_code: new_referral.referral_code,
            status: ReferralStatus::Pending,
            reward_amount: new_referral.reward_amount,
            reward_given: false,
            created_at: new_referral.created_at,
            completed_at: None,
        };
        tables.referrals.insert(referral.id, referral.clone());

        Ok(referral)
    }

    async fn get_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.referrals.get(&referral_id).cloned())
    }

    async fn find_referral_by_referred(
        &self,
        referred_id: Uuid,
    ) -> Result<Option<Referral>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;

        Ok(tables
            .referrals
            .values()
            .find(|r| r.referred_id == referred_id)
            .cloned())
    }

    async fn find_referral_between(
        &self,
        referrer_id: Uuid,
        referred_id: Uuid,
    ) -> Result<Option<Referral>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;

        Ok(tables
            .referrals
            .values()
            .find(|r| r.referrer_id == referrer_id && r.referred_id == referred_id)
            .cloned())
    }

    async fn list_referrals_for_user(&self, user_id: Uuid) -> Result<Vec<Referral>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let rows = tables
            .referrals
            .values()
            .filter(|r| r.involves(user_id))
            .cloned()
            .collect();

        Ok(newest_first(rows, |r: &Referral| r.created_at))
    }

    async fn list_referrals_by_referrer(
        &self,
        referrer_id: Uuid,
    ) -> Result<Vec<Referral>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let rows = tables
            .referrals
            .values()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect();

        Ok(newest_first(rows, |r: &Referral| r.created_at))
    }

    async fn complete_referral(
        &self,
        referral_id: Uuid,
        terms: CompletionTerms,
    ) -> Result<Option<(Referral, Reward)>, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;

        let Some(referral) = tables.referrals.get_mut(&referral_id) else {
            return Ok(None);
        };
        if referral.status != ReferralStatus::Pending {
            return Ok(None);
        }

        referral.status = ReferralStatus::Completed;
        referral.completed_at = Some(terms.completed_at);
        referral.reward_given = true;
        let referral = referral.clone();

        let bonus = Reward {
            id: Uuid::new_v4(),
            user_id: referral.referrer_id,
            referral_id: Some(referral.id),
            reward_type: RewardType::ReferralBonus,
            amount: referral.reward_amount,
            description: terms.bonus_description,
            used: false,
            used_order_id: None,
            expires_at: None,
            created_at: terms.completed_at,
        };
        tables.rewards.insert(bonus.id, bonus.clone());

        Ok(Some((referral, bonus)))
    }

    async fn cancel_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;

        match tables.referrals.get_mut(&referral_id) {
            Some(referral) if referral.status == ReferralStatus::Pending => {
                referral.status = ReferralStatus::Cancelled;
                Ok(Some(referral.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl RewardExt for MemoryStore {
    async fn insert_reward(&self, new_reward: NewReward) -> Result<Reward, StoreError> {
        self.ensure_online()?;
        let reward = Reward {
            id: Uuid::new_v4(),
            user_id: new_reward.user_id,
            referral_id: new_reward.referral_id,
            reward_type: new_reward.reward_type,
            amount: new_reward.amount,
            description: new_reward.description,
            used: false,
            used_order_id: None,
            expires_at: new_reward.expires_at,
            created_at: new_reward.created_at,
        };
        self.tables
            .write()
            .await
            .rewards
            .insert(reward.id, reward.clone());

        Ok(reward)
    }

    async fn get_reward(&self, reward_id: Uuid) -> Result<Option<Reward>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.rewards.get(&reward_id).cloned())
    }

    async fn list_rewards_for_user(&self, user_id: Uuid) -> Result<Vec<Reward>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let rows = tables
            .rewards
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();

        Ok(newest_first(rows, |r: &Reward| r.created_at))
    }

    async fn mark_reward_used(
        &self,
        reward_id: Uuid,
        order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Reward>, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;

        match tables.rewards.get_mut(&reward_id) {
            Some(reward) if reward.is_available(now) => {
                reward.used = true;
                reward.used_order_id = order_id;
                Ok(Some(reward.clone()))
            }
            _ => Ok(None),
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_user(email: &str, code: &str) -> NewUser {
        NewUser {
            auth_uid: None,
            email: email.to_string(),
            name: "Priya Sharma".to_string(),
            mobile_number: None,
            referral_code: code.to_string(),
            referred_by: None,
        }
    }

    fn new_referral(referrer_id: Uuid, referred_id: Uuid) -> NewReferral {
        NewReferral {
            referrer_id,
            referred_id,
            referral_code: "PRIY0042".to_string(),
            reward_amount: 500,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.create_user(new_user("priya@example.com", "PRIY0042")).await.unwrap();

        let err = store
            .create_user(new_user("Priya@Example.com", "PRIY0043"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_by_auth_uid() {
        let store = MemoryStore::new();
        let mut user = new_user("neha@example.com", "NEHA0101");
        user.auth_uid = Some("fb_Neha01".to_string());
        let created = store.create_user(user).await.unwrap();

        let found = store
            .find_user_by_id(&UserId::new("fb_Neha01"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_referred_user_unique() {
        let store = MemoryStore::new();
        let referred = Uuid::new_v4();

        store.insert_referral(new_referral(Uuid::new_v4(), referred)).await.unwrap();
        let err = store
            .insert_referral(new_referral(Uuid::new_v4(), referred))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_complete_only_once() {
        let store = MemoryStore::new();
        let referral = store
            .insert_referral(new_referral(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        let terms = CompletionTerms {
            completed_at: Utc::now(),
            bonus_description: "Referral bonus for order ORD-1".to_string(),
        };

        let first = store.complete_referral(referral.id, terms.clone()).await.unwrap();
        let second = store.complete_referral(referral.id, terms).await.unwrap();

        let (completed, bonus) = first.unwrap();
        assert!(completed.reward_given);
        assert_eq!(bonus.user_id, referral.referrer_id);
        assert!(second.is_none());
        assert_eq!(store.reward_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_used_respects_expiry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let reward = store
            .insert_reward(NewReward {
                user_id: Uuid::new_v4(),
                referral_id: None,
                reward_type: RewardType::OrderDiscount,
                amount: 200,
                description: "First order discount".to_string(),
                expires_at: Some(now - Duration::minutes(5)),
                created_at: now - Duration::days(31),
            })
            .await
            .unwrap();

        let marked = store.mark_reward_used(reward.id, None, now).await.unwrap();

        assert!(marked.is_none());
        assert!(!store.get_reward(reward.id).await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_online(false);

        let err = store.get_reward(Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
