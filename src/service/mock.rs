//! Fabricated records returned while no store is reachable.
//!
//! Ids are UUIDv5 values derived from the request inputs, so the same call
//! always fabricates the same records. Nothing here touches storage.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::referral::code_prefix;
use super::referral_ledger::{reward_grants, AppliedReferral, ApplyContext, CompletedReferral};
use crate::{
    config::RewardPolicy,
    models::{
        referralmodel::{NewReward, Referral, ReferralStatus, Reward, RewardType},
        usermodel::{NewUser, User, UserId},
    },
};

fn mock_id(kind: &str, key: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("jewelstore:mock:{}:{}", kind, key).as_bytes(),
    )
}

fn reward_from(new_reward: NewReward, key: &str) -> Reward {
    Reward {
        id: mock_id("reward", &format!("{}:{}", key, new_reward.reward_type.to_str())),
        user_id: new_reward.user_id,
        referral_id: new_reward.referral_id,
        reward_type: new_reward.reward_type,
        amount: new_reward.amount,
        description: new_reward.description,
        used: false,
        used_order_id: None,
        expires_at: new_reward.expires_at,
        created_at: new_reward.created_at,
    }
}

pub fn user_uuid(user_id: &UserId) -> Uuid {
    mock_id("user", user_id.as_str())
}

pub fn applied_referral(
    user_id: &UserId,
    code: &str,
    context: ApplyContext,
    policy: &RewardPolicy,
    now: DateTime<Utc>,
) -> AppliedReferral {
    let key = format!("{}:{}", user_id, code);
    let referral = Referral {
        id: mock_id("referral", &key),
        referrer_id: mock_id("referrer", code),
        referred_id: user_uuid(user_id),
        referral_code: code.to_string(),
        status: ReferralStatus::Pending,
        reward_amount: policy.referral_reward_amount,
        reward_given: false,
        created_at: now,
        completed_at: None,
    };
    let rewards = reward_grants(policy, &referral, context, now)
        .into_iter()
        .map(|grant| reward_from(grant, &key))
        .collect();

    AppliedReferral { referral, rewards }
}

pub fn completed_referral(
    referral_id: Uuid,
    order_id: &str,
    policy: &RewardPolicy,
    now: DateTime<Utc>,
) -> CompletedReferral {
    let referral = Referral {
        id: referral_id,
        referrer_id: mock_id("referrer", &referral_id.to_string()),
        referred_id: mock_id("referred", &referral_id.to_string()),
        referral_code: String::new(),
        status: ReferralStatus::Completed,
        reward_amount: policy.referral_reward_amount,
        reward_given: true,
        created_at: now,
        completed_at: Some(now),
    };
    let reward = reward_from(
        NewReward {
            user_id: referral.referrer_id,
            referral_id: Some(referral.id),
            reward_type: RewardType::ReferralBonus,
            amount: referral.reward_amount,
            description: super::referral_ledger::bonus_description(order_id),
            expires_at: None,
            created_at: now,
        },
        &referral_id.to_string(),
    );

    CompletedReferral { referral, reward }
}

pub fn cancelled_referral(referral_id: Uuid, policy: &RewardPolicy, now: DateTime<Utc>) -> Referral {
    Referral {
        id: referral_id,
        referrer_id: mock_id("referrer", &referral_id.to_string()),
        referred_id: mock_id("referred", &referral_id.to_string()),
        referral_code: String::new(),
        status: ReferralStatus::Cancelled,
        reward_amount: policy.referral_reward_amount,
        reward_given: false,
        created_at: now,
        completed_at: None,
    }
}

pub fn created_reward(new_reward: NewReward) -> Reward {
    let key = format!("{}:{}", new_reward.user_id, new_reward.created_at.timestamp());
    reward_from(new_reward, &key)
}

pub fn used_reward(
    reward_id: Uuid,
    order_id: Option<String>,
    policy: &RewardPolicy,
    now: DateTime<Utc>,
) -> Reward {
    Reward {
        id: reward_id,
        user_id: mock_id("holder", &reward_id.to_string()),
        referral_id: None,
        reward_type: RewardType::OrderDiscount,
        amount: policy.order_discount_amount,
        description: "Order discount".to_string(),
        used: true,
        used_order_id: order_id,
        expires_at: None,
        created_at: now,
    }
}

pub fn user(new_user: NewUser, now: DateTime<Utc>) -> User {
    let email = new_user.email.trim().to_lowercase();
    User {
        id: mock_id("user", &email),
        auth_uid: new_user.auth_uid,
        referral_code: format!("{}0000", code_prefix(&new_user.name)),
        email,
        name: new_user.name,
        mobile_number: new_user.mobile_number,
        referred_by: new_user.referred_by,
        created_at: now,
        updated_at: now,
    }
}

pub fn known_user(user_id: &UserId, now: DateTime<Utc>) -> User {
    User {
        id: user_uuid(user_id),
        auth_uid: None,
        email: String::new(),
        name: String::new(),
        mobile_number: None,
        referral_code: format!("{}0000", code_prefix("")),
        referred_by: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_referral_is_deterministic() {
        let policy = RewardPolicy::default();
        let now = Utc::now();
        let user = UserId::new("fb_N3ha");

        let first = applied_referral(&user, "PRIY0042", ApplyContext::Registration, &policy, now);
        let second = applied_referral(&user, "PRIY0042", ApplyContext::Registration, &policy, now);

        assert_eq!(first.referral.id, second.referral.id);
        assert_eq!(first.rewards[0].id, second.rewards[0].id);
        assert_eq!(first.rewards.len(), 2);
        assert_ne!(first.rewards[0].id, first.rewards[1].id);
    }

    #[test]
    fn test_completed_referral_pays_policy_amount() {
        let policy = RewardPolicy::default();
        let completed = completed_referral(Uuid::new_v4(), "ORD-7", &policy, Utc::now());

        assert_eq!(completed.referral.status, ReferralStatus::Completed);
        assert_eq!(completed.reward.amount, 500);
        assert_eq!(completed.reward.reward_type, RewardType::ReferralBonus);
        assert!(completed.reward.description.contains("ORD-7"));
    }
}
