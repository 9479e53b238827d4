// service/referral_ledger.rs
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    error::ServiceError,
    mock,
    referral::{is_well_formed_code, normalize_referral_code},
    Outcome, Persistence,
};
use crate::{
    config::RewardPolicy,
    db::{referraldb::CompletionTerms, LedgerStore, ReferralExt, RewardExt, StoreError, UserExt},
    models::{
        referralmodel::{
            NewReferral, NewReward, Referral, ReferralStats, ReferralStatus, Reward, RewardType,
        },
        usermodel::{User, UserId, UserPatch},
    },
};

/// Where a referral code is being applied from. The signup bonus is only
/// paid when the code arrives with the registration itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyContext {
    Registration,
    PostSignup,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppliedReferral {
    pub referral: Referral,
    pub rewards: Vec<Reward>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletedReferral {
    pub referral: Referral,
    pub reward: Reward,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct AvailableRewards {
    pub rewards: Vec<Reward>,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ReferralStatusView {
    pub was_referred: bool,
    pub referral: Option<Referral>,
}

pub fn bonus_description(order_id: &str) -> String {
    format!("Referral bonus for order {}", order_id)
}

/// Rewards the referred user receives when a referral is recorded.
pub fn reward_grants(
    policy: &RewardPolicy,
    referral: &Referral,
    context: ApplyContext,
    now: DateTime<Utc>,
) -> Vec<NewReward> {
    let expires_at = Duration::try_days(policy.reward_expiry_days)
        .and_then(|lifetime| now.checked_add_signed(lifetime));
    if expires_at.is_none() {
        warn!(
            "Reward lifetime of {} days overflows; issuing without expiry",
            policy.reward_expiry_days
        );
    }
    let mut grants = Vec::with_capacity(2);

    if context == ApplyContext::Registration {
        grants.push(NewReward {
            user_id: referral.referred_id,
            referral_id: Some(referral.id),
            reward_type: RewardType::SignupBonus,
            amount: policy.signup_bonus_amount,
            description: format!(
                "Welcome bonus for joining with referral code {}",
                referral.referral_code
            ),
            expires_at,
            created_at: now,
        });
    }

    grants.push(NewReward {
        user_id: referral.referred_id,
        referral_id: Some(referral.id),
        reward_type: RewardType::OrderDiscount,
        amount: policy.order_discount_amount,
        description: format!(
            "First order discount from referral code {}",
            referral.referral_code
        ),
        expires_at,
        created_at: now,
    });

    grants
}

fn require_user_id(user_id: &UserId) -> Result<(), ServiceError> {
    if user_id.is_empty() {
        return Err(ServiceError::Validation("user id is required".to_string()));
    }
    Ok(())
}

/// Error for a referral that is no longer pending.
fn transition_conflict(referral: &Referral) -> ServiceError {
    match referral.status {
        ReferralStatus::Completed => ServiceError::AlreadyCompleted(referral.id),
        status => ServiceError::InvalidReferralState(referral.id, status),
    }
}

/// Degrades a read to `T::default()` on store failure. A store that
/// reports unavailable yields a mock outcome.
fn degrade<T: Default>(what: &str, user_id: &UserId, read: Result<T, StoreError>) -> Outcome<T> {
    match read {
        Ok(data) => Outcome::real(data),
        Err(StoreError::Unavailable(reason)) => {
            warn!("Store unavailable for {} of {}: {}", what, user_id, reason);
            Outcome::mock(T::default())
        }
        Err(err) => {
            warn!("{} for {} degraded to empty: {}", what, user_id, err);
            Outcome::real(T::default())
        }
    }
}

/// Owns the referral lifecycle and the rewards it pays out.
///
/// All entry points (registration, the apply endpoint, order completion)
/// go through this type; none of them re-derive the rules.
#[derive(Debug, Clone)]
pub struct ReferralLedger {
    persistence: Persistence,
    policy: RewardPolicy,
}

impl ReferralLedger {
    pub fn new(persistence: Persistence, policy: RewardPolicy) -> Self {
        Self {
            persistence,
            policy: policy.sanitized(),
        }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    pub async fn apply_referral_code(
        &self,
        user_id: &UserId,
        raw_code: &str,
        context: ApplyContext,
    ) -> Result<Outcome<AppliedReferral>, ServiceError> {
        require_user_id(user_id)?;

        let code = normalize_referral_code(raw_code);
        if code.is_empty() {
            return Err(ServiceError::Validation("referral code is required".to_string()));
        }
        if !is_well_formed_code(&code) {
            return Err(ServiceError::Validation(format!(
                "referral code {} is malformed",
                code
            )));
        }

        let store = match &self.persistence {
            Persistence::Available(store) => store,
            Persistence::Unavailable => {
                return Ok(Outcome::mock(mock::applied_referral(
                    user_id,
                    &code,
                    context,
                    &self.policy,
                    Utc::now(),
                )))
            }
        };

        match self.apply_with(store.as_ref(), user_id, &code, context).await {
            Err(ServiceError::Unavailable(reason)) => {
                warn!("Store unavailable while applying {}: {}; answering with mock", code, reason);
                Ok(Outcome::mock(mock::applied_referral(
                    user_id,
                    &code,
                    context,
                    &self.policy,
                    Utc::now(),
                )))
            }
            result => result.map(Outcome::real),
        }
    }

    async fn apply_with(
        &self,
        store: &dyn LedgerStore,
        user_id: &UserId,
        code: &str,
        context: ApplyContext,
    ) -> Result<AppliedReferral, ServiceError> {
        let user = store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound(user_id.to_string()))?;

        let referrer = store
            .find_user_by_referral_code(code)
            .await?
            .ok_or_else(|| ServiceError::InvalidReferralCode(code.to_string()))?;

        if referrer.id == user.id {
            return Err(ServiceError::SelfReferral);
        }

        if store.find_referral_by_referred(user.id).await?.is_some()
            || store.find_referral_between(user.id, referrer.id).await?.is_some()
        {
            return Err(ServiceError::AlreadyReferred);
        }

        let now = Utc::now();
        let referral = store
            .insert_referral(NewReferral {
                referrer_id: referrer.id,
                referred_id: user.id,
                referral_code: code.to_string(),
                reward_amount: self.policy.referral_reward_amount,
                created_at: now,
            })
            .await
            .map_err(|err| match err {
                StoreError::UniqueViolation(_) => ServiceError::AlreadyReferred,
                other => other.into(),
            })?;

        info!(
            "Referral {} recorded: {} referred {} with code {}",
            referral.id, referrer.id, user.id, code
        );

        let patch = UserPatch {
            referred_by: Some(code.to_string()),
            ..Default::default()
        };
        if let Err(err) = store.update_user(user.id, patch).await {
            warn!("Could not record referred_by on user {}: {}", user.id, err);
        }

        // No rollback: a failure here leaves the referral in place.
        let mut rewards = Vec::new();
        for grant in reward_grants(&self.policy, &referral, context, now) {
            match self.insert_reward(store, grant).await {
                Ok(reward) => rewards.push(reward),
                Err(err) => {
                    warn!(
                        "Referral {} kept without its {} rewards: {}",
                        referral.id,
                        rewards.len(),
                        err
                    );
                    return Err(err);
                }
            }
        }

        Ok(AppliedReferral { referral, rewards })
    }

    pub async fn complete_referral(
        &self,
        referral_id: Uuid,
        order_id: &str,
        order_amount: f64,
    ) -> Result<Outcome<CompletedReferral>, ServiceError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ServiceError::Validation("order id is required".to_string()));
        }
        if !order_amount.is_finite() || order_amount <= 0.0 {
            return Err(ServiceError::Validation(
                "order amount must be positive".to_string(),
            ));
        }
        if order_amount < self.policy.min_qualifying_order {
            return Err(ServiceError::Validation(format!(
                "order amount {} is below the qualifying minimum {}",
                order_amount, self.policy.min_qualifying_order
            )));
        }

        let store = match &self.persistence {
            Persistence::Available(store) => store,
            Persistence::Unavailable => {
                return Ok(Outcome::mock(mock::completed_referral(
                    referral_id,
                    order_id,
                    &self.policy,
                    Utc::now(),
                )))
            }
        };

        match self.complete_with(store.as_ref(), referral_id, order_id).await {
            Err(ServiceError::Unavailable(reason)) => {
                warn!(
                    "Store unavailable while completing referral {}: {}; answering with mock",
                    referral_id, reason
                );
                Ok(Outcome::mock(mock::completed_referral(
                    referral_id,
                    order_id,
                    &self.policy,
                    Utc::now(),
                )))
            }
            result => result.map(Outcome::real),
        }
    }

    async fn complete_with(
        &self,
        store: &dyn LedgerStore,
        referral_id: Uuid,
        order_id: &str,
    ) -> Result<CompletedReferral, ServiceError> {
        let referral = store
            .get_referral(referral_id)
            .await?
            .ok_or(ServiceError::ReferralNotFound(referral_id))?;

        if !referral.status.can_transition_to(ReferralStatus::Completed) {
            return Err(transition_conflict(&referral));
        }

        let terms = CompletionTerms {
            completed_at: Utc::now(),
            bonus_description: bonus_description(order_id),
        };

        match store.complete_referral(referral_id, terms).await? {
            Some((referral, reward)) => {
                info!(
                    "Referral {} completed by order {}; {} credited {}",
                    referral.id, order_id, referral.referrer_id, reward.amount
                );
                Ok(CompletedReferral { referral, reward })
            }
            None => {
                // Another request moved it first.
                let current = store
                    .get_referral(referral_id)
                    .await?
                    .ok_or(ServiceError::ReferralNotFound(referral_id))?;
                Err(transition_conflict(&current))
            }
        }
    }

    pub async fn cancel_referral(
        &self,
        referral_id: Uuid,
    ) -> Result<Outcome<Referral>, ServiceError> {
        let store = match &self.persistence {
            Persistence::Available(store) => store,
            Persistence::Unavailable => {
                return Ok(Outcome::mock(mock::cancelled_referral(
                    referral_id,
                    &self.policy,
                    Utc::now(),
                )))
            }
        };

        let result: Result<Referral, ServiceError> = async {
            let referral = store
                .get_referral(referral_id)
                .await?
                .ok_or(ServiceError::ReferralNotFound(referral_id))?;
            if !referral.status.can_transition_to(ReferralStatus::Cancelled) {
                return Err(transition_conflict(&referral));
            }

            match store.cancel_referral(referral_id).await? {
                Some(cancelled) => {
                    info!("Referral {} cancelled", cancelled.id);
                    Ok(cancelled)
                }
                None => {
                    let current = store
                        .get_referral(referral_id)
                        .await?
                        .ok_or(ServiceError::ReferralNotFound(referral_id))?;
                    Err(transition_conflict(&current))
                }
            }
        }
        .await;

        match result {
            Err(ServiceError::Unavailable(reason)) => {
                warn!("Store unavailable while cancelling {}: {}", referral_id, reason);
                Ok(Outcome::mock(mock::cancelled_referral(
                    referral_id,
                    &self.policy,
                    Utc::now(),
                )))
            }
            result => result.map(Outcome::real),
        }
    }

    /// `Ok(None)` means the user is unknown and the read returns empty.
    async fn resolve_for_read(
        store: &dyn LedgerStore,
        user_id: &UserId,
    ) -> Result<Option<User>, StoreError> {
        let user = store.find_user_by_id(user_id).await?;
        if user.is_none() {
            debug!("No user {} for read; returning empty result", user_id);
        }
        Ok(user)
    }

    async fn read_referrals(
        store: &dyn LedgerStore,
        user_id: &UserId,
    ) -> Result<Vec<Referral>, StoreError> {
        match Self::resolve_for_read(store, user_id).await? {
            Some(user) => store.list_referrals_for_user(user.id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn read_statistics(
        store: &dyn LedgerStore,
        user_id: &UserId,
    ) -> Result<ReferralStats, StoreError> {
        let Some(user) = Self::resolve_for_read(store, user_id).await? else {
            return Ok(ReferralStats::default());
        };
        let referrals = store.list_referrals_by_referrer(user.id).await?;
        let rewards = store.list_rewards_for_user(user.id).await?;

        Ok(ReferralStats::tally(&referrals, &rewards, Utc::now()))
    }

    async fn read_status(
        store: &dyn LedgerStore,
        user_id: &UserId,
    ) -> Result<ReferralStatusView, StoreError> {
        let Some(user) = Self::resolve_for_read(store, user_id).await? else {
            return Ok(ReferralStatusView::default());
        };
        let referral = store.find_referral_by_referred(user.id).await?;

        Ok(ReferralStatusView {
            was_referred: referral.is_some(),
            referral,
        })
    }

    async fn read_available(
        store: &dyn LedgerStore,
        user_id: &UserId,
        reward_type: Option<RewardType>,
    ) -> Result<AvailableRewards, StoreError> {
        let Some(user) = Self::resolve_for_read(store, user_id).await? else {
            return Ok(AvailableRewards::default());
        };
        let now = Utc::now();
        let rewards: Vec<Reward> = store
            .list_rewards_for_user(user.id)
            .await?
            .into_iter()
            .filter(|reward| reward.is_available(now))
            .filter(|reward| reward_type.map_or(true, |ty| reward.reward_type == ty))
            .collect();
        let total_amount = rewards.iter().map(|reward| reward.amount).sum();

        Ok(AvailableRewards {
            rewards,
            total_amount,
        })
    }

    pub async fn list_referrals(
        &self,
        user_id: &UserId,
    ) -> Result<Outcome<Vec<Referral>>, ServiceError> {
        require_user_id(user_id)?;
        let Persistence::Available(store) = &self.persistence else {
            return Ok(Outcome::mock(Vec::new()));
        };

        let read = Self::read_referrals(store.as_ref(), user_id).await;
        Ok(degrade("referral list", user_id, read))
    }

    pub async fn compute_statistics(
        &self,
        user_id: &UserId,
    ) -> Result<Outcome<ReferralStats>, ServiceError> {
        require_user_id(user_id)?;
        let Persistence::Available(store) = &self.persistence else {
            return Ok(Outcome::mock(ReferralStats::default()));
        };

        let read = Self::read_statistics(store.as_ref(), user_id).await;
        Ok(degrade("referral stats", user_id, read))
    }

    pub async fn referral_status(
        &self,
        user_id: &UserId,
    ) -> Result<Outcome<ReferralStatusView>, ServiceError> {
        require_user_id(user_id)?;
        let Persistence::Available(store) = &self.persistence else {
            return Ok(Outcome::mock(ReferralStatusView::default()));
        };

        let read = Self::read_status(store.as_ref(), user_id).await;
        Ok(degrade("referral status", user_id, read))
    }

    /// The pending referral naming this user as the referred party, if any.
    pub async fn pending_referral_for(
        &self,
        user_id: &UserId,
    ) -> Result<Outcome<Option<Referral>>, ServiceError> {
        let status = self.referral_status(user_id).await?;
        Ok(status.map(|view| {
            view.referral
                .filter(|referral| referral.status == ReferralStatus::Pending)
        }))
    }

    async fn insert_reward(
        &self,
        store: &dyn LedgerStore,
        new_reward: NewReward,
    ) -> Result<Reward, ServiceError> {
        if new_reward.amount <= 0 {
            return Err(ServiceError::Validation(format!(
                "reward amount must be positive, got {}",
                new_reward.amount
            )));
        }
        Ok(store.insert_reward(new_reward).await?)
    }

    pub async fn create_reward(&self, new_reward: NewReward) -> Result<Outcome<Reward>, ServiceError> {
        let store = match &self.persistence {
            Persistence::Available(store) => store,
            Persistence::Unavailable => {
                if new_reward.amount <= 0 {
                    return Err(ServiceError::Validation(
                        "reward amount must be positive".to_string(),
                    ));
                }
                return Ok(Outcome::mock(mock::created_reward(new_reward)));
            }
        };

        let reward = self.insert_reward(store.as_ref(), new_reward).await?;
        debug!("Reward {} issued to {}", reward.id, reward.user_id);
        Ok(Outcome::real(reward))
    }

    pub async fn use_reward(
        &self,
        reward_id: Uuid,
        order_id: Option<String>,
    ) -> Result<Outcome<Reward>, ServiceError> {
        let order_id = order_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let store = match &self.persistence {
            Persistence::Available(store) => store,
            Persistence::Unavailable => {
                return Ok(Outcome::mock(mock::used_reward(
                    reward_id,
                    order_id,
                    &self.policy,
                    Utc::now(),
                )))
            }
        };

        let result: Result<Reward, ServiceError> = async {
            let reward = store
                .get_reward(reward_id)
                .await?
                .ok_or(ServiceError::RewardNotFound(reward_id))?;

            let now = Utc::now();
            if reward.used {
                return Err(ServiceError::RewardAlreadyUsed(reward_id));
            }
            if reward.is_expired(now) {
                return Err(ServiceError::RewardExpired(reward_id));
            }

            match store.mark_reward_used(reward_id, order_id.clone(), now).await? {
                Some(used) => {
                    info!(
                        "Reward {} ({}) redeemed on order {:?}",
                        used.id,
                        used.reward_type.to_str(),
                        used.used_order_id
                    );
                    Ok(used)
                }
                None => {
                    let current = store
                        .get_reward(reward_id)
                        .await?
                        .ok_or(ServiceError::RewardNotFound(reward_id))?;
                    if current.used {
                        Err(ServiceError::RewardAlreadyUsed(reward_id))
                    } else {
                        Err(ServiceError::RewardExpired(reward_id))
                    }
                }
            }
        }
        .await;

        match result {
            Err(ServiceError::Unavailable(reason)) => {
                warn!("Store unavailable while redeeming {}: {}", reward_id, reason);
                Ok(Outcome::mock(mock::used_reward(
                    reward_id,
                    order_id,
                    &self.policy,
                    Utc::now(),
                )))
            }
            result => result.map(Outcome::real),
        }
    }

    pub async fn list_available(
        &self,
        user_id: &UserId,
        reward_type: Option<RewardType>,
    ) -> Result<Outcome<AvailableRewards>, ServiceError> {
        require_user_id(user_id)?;
        let Persistence::Available(store) = &self.persistence else {
            return Ok(Outcome::mock(AvailableRewards::default()));
        };

        let read = Self::read_available(store.as_ref(), user_id, reward_type).await;
        Ok(degrade("available rewards", user_id, read))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        db::{memory::faults::FailingReferralInserts, MemoryStore},
        models::usermodel::NewUser,
    };

    async fn seed_user(store: &MemoryStore, name: &str, email: &str, code: &str) -> User {
        store
            .create_user(NewUser {
                auth_uid: None,
                email: email.to_string(),
                name: name.to_string(),
                mobile_number: None,
                referral_code: code.to_string(),
                referred_by: None,
            })
            .await
            .unwrap()
    }

    fn ledger_over(store: &MemoryStore) -> ReferralLedger {
        ReferralLedger::new(
            Persistence::Available(Arc::new(store.clone())),
            RewardPolicy::default(),
        )
    }

    struct Fixture {
        store: MemoryStore,
        ledger: ReferralLedger,
        referrer: User,
        referred: User,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let referrer = seed_user(&store, "Priya Sharma", "priya@example.com", "PRIY0042").await;
        let referred = seed_user(&store, "Neha Kapoor", "neha@example.com", "NEHA0101").await;
        let ledger = ledger_over(&store);
        Fixture {
            store,
            ledger,
            referrer,
            referred,
        }
    }

    #[tokio::test]
    async fn test_apply_at_registration_issues_two_rewards() {
        let f = fixture().await;

        let outcome = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), " priy0042 ", ApplyContext::Registration)
            .await
            .unwrap();

        assert!(!outcome.mock);
        let applied = outcome.data;
        assert_eq!(applied.referral.status, ReferralStatus::Pending);
        assert_eq!(applied.referral.referrer_id, f.referrer.id);
        assert_eq!(applied.referral.referred_id, f.referred.id);
        assert_eq!(applied.referral.reward_amount, 500);
        assert!(!applied.referral.reward_given);

        assert_eq!(applied.rewards.len(), 2);
        let signup = applied
            .rewards
            .iter()
            .find(|r| r.reward_type == RewardType::SignupBonus)
            .unwrap();
        let discount = applied
            .rewards
            .iter()
            .find(|r| r.reward_type == RewardType::OrderDiscount)
            .unwrap();
        assert_eq!(signup.amount, 100);
        assert_eq!(discount.amount, 200);
        for reward in &applied.rewards {
            assert_eq!(reward.user_id, f.referred.id);
            assert_eq!(reward.expires_at, Some(reward.created_at + Duration::days(30)));
        }

        let referred = f
            .store
            .find_user_by_id(&UserId::from(f.referred.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(referred.referred_by.as_deref(), Some("PRIY0042"));
    }

    #[tokio::test]
    async fn test_apply_after_signup_skips_signup_bonus() {
        let f = fixture().await;

        let applied = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::PostSignup)
            .await
            .unwrap()
            .data;

        assert_eq!(applied.rewards.len(), 1);
        assert_eq!(applied.rewards[0].reward_type, RewardType::OrderDiscount);
    }

    #[tokio::test]
    async fn test_apply_twice_conflicts() {
        let f = fixture().await;
        let user = UserId::from(f.referred.id);

        f.ledger
            .apply_referral_code(&user, "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap();
        let err = f
            .ledger
            .apply_referral_code(&user, "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::AlreadyReferred));
        assert_eq!(err.kind(), crate::service::error::ErrorKind::Conflict);
        assert_eq!(f.store.referral_count().await, 1);
        assert_eq!(f.store.reward_count().await, 2);
    }

    #[tokio::test]
    async fn test_reverse_referral_conflicts() {
        let f = fixture().await;

        f.ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::PostSignup)
            .await
            .unwrap();
        let err = f
            .ledger
            .apply_referral_code(&UserId::from(f.referrer.id), "NEHA0101", ApplyContext::PostSignup)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::AlreadyReferred));
    }

    #[tokio::test]
    async fn test_racing_insert_maps_to_already_referred() {
        let f = fixture().await;
        let racing = FailingReferralInserts::unique_violation(f.store.clone());
        let ledger = ReferralLedger::new(
            Persistence::Available(Arc::new(racing)),
            RewardPolicy::default(),
        );

        let err = ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::AlreadyReferred));
        assert_eq!(f.store.referral_count().await, 0);
        assert_eq!(f.store.reward_count().await, 0);
        let referred = f
            .store
            .find_user_by_id(&UserId::from(f.referred.id))
            .await
            .unwrap()
            .unwrap();
        assert!(referred.referred_by.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_policy_is_replaced_before_issuing() {
        let f = fixture().await;
        let ledger = ReferralLedger::new(
            Persistence::Available(Arc::new(f.store.clone())),
            RewardPolicy {
                signup_bonus_amount: 0,
                reward_expiry_days: 1_000_000_000_000,
                ..RewardPolicy::default()
            },
        );
        assert_eq!(ledger.policy(), &RewardPolicy::default());

        let applied = ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap()
            .data;

        assert_eq!(applied.rewards.len(), 2);
        let signup = applied
            .rewards
            .iter()
            .find(|r| r.reward_type == RewardType::SignupBonus)
            .unwrap();
        assert_eq!(signup.amount, 100);
        assert_eq!(signup.expires_at, Some(signup.created_at + Duration::days(30)));
        assert_eq!(f.store.reward_count().await, 2);
    }

    #[test]
    fn test_reward_grants_without_expiry_when_lifetime_overflows() {
        let now = Utc::now();
        let referral = Referral {
            id: Uuid::new_v4(),
            referrer_id: Uuid::new_v4(),
            referred_id: Uuid::new_v4(),
            referral_code: "PRIY0042".to_string(),
            status: ReferralStatus::Pending,
            reward_amount: 500,
            reward_given: false,
            created_at: now,
            completed_at: None,
        };
        let policy = RewardPolicy {
            reward_expiry_days: i64::MAX,
            ..RewardPolicy::default()
        };

        let grants = reward_grants(&policy, &referral, ApplyContext::Registration, now);

        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|grant| grant.expires_at.is_none()));
    }

    #[tokio::test]
    async fn test_self_referral_conflicts() {
        let f = fixture().await;

        let err = f
            .ledger
            .apply_referral_code(&UserId::from(f.referrer.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::SelfReferral));
        assert_eq!(err.kind(), crate::service::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_code_creates_nothing() {
        let f = fixture().await;

        let err = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "ZZZZ9999", ApplyContext::Registration)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidReferralCode(_)));
        assert_eq!(err.kind(), crate::service::error::ErrorKind::NotFound);
        assert_eq!(f.store.referral_count().await, 0);
        assert_eq!(f.store.reward_count().await, 0);
    }

    #[tokio::test]
    async fn test_apply_validates_input() {
        let f = fixture().await;

        let missing_user = f
            .ledger
            .apply_referral_code(&UserId::new("  "), "PRIY0042", ApplyContext::PostSignup)
            .await
            .unwrap_err();
        let missing_code = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "   ", ApplyContext::PostSignup)
            .await
            .unwrap_err();

        assert!(matches!(missing_user, ServiceError::Validation(_)));
        assert!(matches!(missing_code, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_complete_twice_pays_once() {
        let f = fixture().await;
        let applied = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap()
            .data;

        let completed = f
            .ledger
            .complete_referral(applied.referral.id, "ORD-1001", 4999.0)
            .await
            .unwrap()
            .data;
        let again = f
            .ledger
            .complete_referral(applied.referral.id, "ORD-1001", 4999.0)
            .await
            .unwrap_err();

        assert_eq!(completed.referral.status, ReferralStatus::Completed);
        assert!(completed.referral.reward_given);
        assert!(completed.referral.completed_at.is_some());
        assert_eq!(completed.reward.user_id, f.referrer.id);
        assert_eq!(completed.reward.reward_type, RewardType::ReferralBonus);
        assert_eq!(completed.reward.amount, 500);
        assert!(completed.reward.description.contains("ORD-1001"));
        assert!(matches!(again, ServiceError::AlreadyCompleted(_)));

        let bonuses = f
            .store
            .list_rewards_for_user(f.referrer.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.reward_type == RewardType::ReferralBonus)
            .count();
        assert_eq!(bonuses, 1);
    }

    #[tokio::test]
    async fn test_concurrent_completion_pays_once() {
        let f = fixture().await;
        let applied = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::PostSignup)
            .await
            .unwrap()
            .data;
        let id = applied.referral.id;

        let (a, b) = tokio::join!(
            f.ledger.complete_referral(id, "ORD-1", 100.0),
            f.ledger.complete_referral(id, "ORD-2", 100.0),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let bonuses = f.store.list_rewards_for_user(f.referrer.id).await.unwrap();
        assert_eq!(bonuses.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_missing_referral() {
        let f = fixture().await;

        let err = f
            .ledger
            .complete_referral(Uuid::new_v4(), "ORD-1", 10.0)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::ReferralNotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_rejects_bad_orders() {
        let store = MemoryStore::new();
        let ledger = ReferralLedger::new(
            Persistence::Available(Arc::new(store)),
            RewardPolicy {
                min_qualifying_order: 1000.0,
                ..RewardPolicy::default()
            },
        );

        for (order_id, amount) in [("", 2000.0), ("ORD-1", 0.0), ("ORD-1", f64::NAN), ("ORD-1", 999.0)] {
            let err = ledger
                .complete_referral(Uuid::new_v4(), order_id, amount)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_cancelled_referral_is_terminal() {
        let f = fixture().await;
        let applied = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::PostSignup)
            .await
            .unwrap()
            .data;

        let cancelled = f.ledger.cancel_referral(applied.referral.id).await.unwrap().data;
        let complete_err = f
            .ledger
            .complete_referral(applied.referral.id, "ORD-1", 10.0)
            .await
            .unwrap_err();
        let cancel_err = f.ledger.cancel_referral(applied.referral.id).await.unwrap_err();

        assert_eq!(cancelled.status, ReferralStatus::Cancelled);
        assert!(matches!(
            complete_err,
            ServiceError::InvalidReferralState(_, ReferralStatus::Cancelled)
        ));
        assert!(matches!(cancel_err, ServiceError::InvalidReferralState(_, _)));
    }

    #[tokio::test]
    async fn test_use_reward_lifecycle() {
        let f = fixture().await;
        let applied = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap()
            .data;
        let reward_id = applied.rewards[0].id;

        let used = f
            .ledger
            .use_reward(reward_id, Some("ORD-55".to_string()))
            .await
            .unwrap()
            .data;
        let err = f.ledger.use_reward(reward_id, None).await.unwrap_err();

        assert!(used.used);
        assert_eq!(used.used_order_id.as_deref(), Some("ORD-55"));
        assert!(matches!(err, ServiceError::RewardAlreadyUsed(_)));
        let stored = f.store.get_reward(reward_id).await.unwrap().unwrap();
        assert_eq!(stored.used_order_id.as_deref(), Some("ORD-55"));
    }

    #[tokio::test]
    async fn test_use_expired_reward() {
        let f = fixture().await;
        let now = Utc::now();
        let reward = f
            .ledger
            .create_reward(NewReward {
                user_id: f.referred.id,
                referral_id: None,
                reward_type: RewardType::OrderDiscount,
                amount: 200,
                description: "Stale discount".to_string(),
                expires_at: Some(now - Duration::hours(1)),
                created_at: now - Duration::days(31),
            })
            .await
            .unwrap()
            .data;

        let err = f.ledger.use_reward(reward.id, None).await.unwrap_err();
        let missing = f.ledger.use_reward(Uuid::new_v4(), None).await.unwrap_err();

        assert!(matches!(err, ServiceError::RewardExpired(_)));
        assert_eq!(err.kind(), crate::service::error::ErrorKind::Expired);
        assert!(!f.store.get_reward(reward.id).await.unwrap().unwrap().used);
        assert!(matches!(missing, ServiceError::RewardNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_reward_rejects_non_positive() {
        let f = fixture().await;

        let err = f
            .ledger
            .create_reward(NewReward {
                user_id: f.referred.id,
                referral_id: None,
                reward_type: RewardType::SignupBonus,
                amount: 0,
                description: "Nothing".to_string(),
                expires_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(f.store.reward_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_available_filters_expired_and_type() {
        let f = fixture().await;
        let user = UserId::from(f.referred.id);
        f.ledger
            .apply_referral_code(&user, "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap();
        let now = Utc::now();
        f.ledger
            .create_reward(NewReward {
                user_id: f.referred.id,
                referral_id: None,
                reward_type: RewardType::OrderDiscount,
                amount: 750,
                description: "Expired festive discount".to_string(),
                expires_at: Some(now - Duration::days(1)),
                created_at: now - Duration::days(40),
            })
            .await
            .unwrap();

        let all = f.ledger.list_available(&user, None).await.unwrap().data;
        let discounts = f
            .ledger
            .list_available(&user, Some(RewardType::OrderDiscount))
            .await
            .unwrap()
            .data;

        assert_eq!(all.rewards.len(), 2);
        assert_eq!(all.total_amount, 300);
        assert_eq!(discounts.rewards.len(), 1);
        assert_eq!(discounts.total_amount, 200);
    }

    #[tokio::test]
    async fn test_statistics_after_completion() {
        let f = fixture().await;
        let applied = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap()
            .data;
        f.ledger
            .complete_referral(applied.referral.id, "ORD-9", 2500.0)
            .await
            .unwrap();

        let stats = f
            .ledger
            .compute_statistics(&UserId::from(f.referrer.id))
            .await
            .unwrap()
            .data;

        assert_eq!(stats.total_referrals, 1);
        assert_eq!(stats.completed_referrals, 1);
        assert_eq!(stats.pending_referrals, 0);
        assert_eq!(stats.total_earnings, 500);
        assert_eq!(stats.pending_earnings, 0);
        assert_eq!(stats.active_rewards, 1);
        assert_eq!(stats.expired_rewards, 0);
    }

    #[tokio::test]
    async fn test_statistics_for_new_user_are_zero() {
        let f = fixture().await;

        let outcome = f
            .ledger
            .compute_statistics(&UserId::from(f.referrer.id))
            .await
            .unwrap();
        let unknown = f
            .ledger
            .compute_statistics(&UserId::new("fb_nobody"))
            .await
            .unwrap();

        assert!(!outcome.mock);
        assert_eq!(outcome.data, ReferralStats::default());
        assert_eq!(unknown.data, ReferralStats::default());
    }

    #[tokio::test]
    async fn test_list_referrals_both_sides_newest_first() {
        let f = fixture().await;
        let third = seed_user(&f.store, "Arjun Mehta", "arjun@example.com", "ARJU0007").await;
        f.ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::PostSignup)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        f.ledger
            .apply_referral_code(&UserId::from(third.id), "NEHA0101", ApplyContext::PostSignup)
            .await
            .unwrap();

        let referrals = f
            .ledger
            .list_referrals(&UserId::from(f.referred.id))
            .await
            .unwrap()
            .data;

        assert_eq!(referrals.len(), 2);
        assert_eq!(referrals[0].referred_id, third.id);
        assert_eq!(referrals[1].referrer_id, f.referrer.id);
    }

    #[tokio::test]
    async fn test_reads_degrade_when_store_goes_offline() {
        let f = fixture().await;
        f.store.set_online(false);
        let user = UserId::from(f.referrer.id);

        let stats = f.ledger.compute_statistics(&user).await.unwrap();
        let rewards = f.ledger.list_available(&user, None).await.unwrap();

        assert!(stats.mock);
        assert_eq!(stats.data, ReferralStats::default());
        assert!(rewards.mock);
        assert!(rewards.data.rewards.is_empty());
    }

    #[tokio::test]
    async fn test_writes_fall_back_to_mock_when_store_goes_offline() {
        let f = fixture().await;
        f.store.set_online(false);

        let outcome = f
            .ledger
            .apply_referral_code(&UserId::from(f.referred.id), "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap();

        assert!(outcome.mock);
        assert_eq!(outcome.data.rewards.len(), 2);
        f.store.set_online(true);
        assert_eq!(f.store.referral_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_mode_is_labelled_and_deterministic() {
        let ledger = ReferralLedger::new(Persistence::Unavailable, RewardPolicy::default());
        let user = UserId::new("fb_N3ha");

        let first = ledger
            .apply_referral_code(&user, "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap();
        let second = ledger
            .apply_referral_code(&user, "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap();
        let stats = ledger.compute_statistics(&user).await.unwrap();
        let used = ledger.use_reward(Uuid::new_v4(), None).await.unwrap();

        assert!(first.mock && second.mock && stats.mock && used.mock);
        assert_eq!(first.data.referral.id, second.data.referral.id);
        assert_eq!(stats.data, ReferralStats::default());
    }

    #[tokio::test]
    async fn test_referral_scenario_end_to_end() {
        let f = fixture().await;
        let referred = UserId::from(f.referred.id);

        let applied = f
            .ledger
            .apply_referral_code(&referred, "PRIY0042", ApplyContext::Registration)
            .await
            .unwrap()
            .data;
        let earned: i64 = applied.rewards.iter().map(|r| r.amount).sum();
        assert_eq!(earned, 300);

        let pending = f.ledger.pending_referral_for(&referred).await.unwrap().data.unwrap();
        assert_eq!(pending.id, applied.referral.id);

        let completed = f
            .ledger
            .complete_referral(pending.id, "ORD-2024-17", 18_500.0)
            .await
            .unwrap()
            .data;
        assert_eq!(completed.referral.status, ReferralStatus::Completed);
        assert!(completed.referral.reward_given);
        assert_eq!(completed.reward.amount, 500);

        let stored = f.store.get_referral(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReferralStatus::Completed);
        assert!(f.ledger.pending_referral_for(&referred).await.unwrap().data.is_none());
    }
}
