use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "referral_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ReferralStatus {
    /// Only a pending referral may move, and only forward.
    pub fn can_transition_to(&self, to: ReferralStatus) -> bool {
        matches!(
            (self, to),
            (ReferralStatus::Pending, ReferralStatus::Completed)
                | (ReferralStatus::Pending, ReferralStatus::Cancelled)
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "reward_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    SignupBonus,
    ReferralBonus,
    OrderDiscount,
}

impl RewardType {
    pub fn to_str(&self) -> &str {
        match self {
            RewardType::SignupBonus => "signup_bonus",
            RewardType::ReferralBonus => "referral_bonus",
            RewardType::OrderDiscount => "order_discount",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub reward_amount: i64,
    pub reward_given: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Referral {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.referrer_id == user_id || self.referred_id == user_id
    }
}

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub referral_code: String,
    pub reward_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Reward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub referral_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub amount: i64,
    pub description: String,
    pub used: bool,
    pub used_order_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Unused and not past its expiry.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now)
    }
}

/// Everything needed to issue a reward; id, `used` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewReward {
    pub user_id: Uuid,
    pub referral_id: Option<Uuid>,
    pub reward_type: RewardType,
    pub amount: i64,
    pub description: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ReferralStats {
    pub total_referrals: i64,
    pub completed_referrals: i64,
    pub pending_referrals: i64,
    pub total_earnings: i64,
    pub pending_earnings: i64,
    pub active_rewards: i64,
    pub expired_rewards: i64,
}

impl ReferralStats {
    /// Folds the referrals a user made and the rewards they hold into counters.
    pub fn tally(referrals: &[Referral], rewards: &[Reward], now: DateTime<Utc>) -> Self {
        let mut stats = ReferralStats::default();

        for referral in referrals {
            stats.total_referrals += 1;
            match referral.status {
                ReferralStatus::Completed => stats.completed_referrals += 1,
                ReferralStatus::Pending => stats.pending_referrals += 1,
                ReferralStatus::Cancelled => {}
            }
            if referral.reward_given {
                stats.total_earnings += referral.reward_amount;
            } else if referral.status == ReferralStatus::Completed {
                stats.pending_earnings += referral.reward_amount;
            }
        }

        for reward in rewards {
            if reward.is_available(now) {
                stats.active_rewards += 1;
            } else if !reward.used && reward.is_expired(now) {
                stats.expired_rewards += 1;
            }
        }

        stats
    }
}
