// config.rs
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Amounts and lifetimes of everything the referral program pays out.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardPolicy {
    pub referral_reward_amount: i64,
    pub signup_bonus_amount: i64,
    pub order_discount_amount: i64,
    pub reward_expiry_days: i64,
    pub min_qualifying_order: f64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            referral_reward_amount: 500,
            signup_bonus_amount: 100,
            order_discount_amount: 200,
            reward_expiry_days: 30,
            min_qualifying_order: 0.0,
        }
    }
}

const MAX_REWARD_EXPIRY_DAYS: i64 = 3650;

impl RewardPolicy {
    /// Replaces out-of-range figures with their defaults. Every payout must
    /// be positive and rewards must expire within ten years.
    pub fn sanitized(self) -> Self {
        let defaults = RewardPolicy::default();

        let positive = |name: &str, value: i64, default: i64| {
            if value > 0 {
                value
            } else {
                tracing::warn!("{} must be positive, got {}; using {}", name, value, default);
                default
            }
        };

        let reward_expiry_days = if (1..=MAX_REWARD_EXPIRY_DAYS).contains(&self.reward_expiry_days) {
            self.reward_expiry_days
        } else {
            tracing::warn!(
                "REWARD_EXPIRY_DAYS must be between 1 and {}, got {}; using {}",
                MAX_REWARD_EXPIRY_DAYS,
                self.reward_expiry_days,
                defaults.reward_expiry_days
            );
            defaults.reward_expiry_days
        };

        let min_qualifying_order =
            if self.min_qualifying_order.is_finite() && self.min_qualifying_order >= 0.0 {
                self.min_qualifying_order
            } else {
                tracing::warn!(
                    "MIN_QUALIFYING_ORDER must be a non-negative amount, got {}; using {}",
                    self.min_qualifying_order,
                    defaults.min_qualifying_order
                );
                defaults.min_qualifying_order
            };

        RewardPolicy {
            referral_reward_amount: positive(
                "REFERRAL_REWARD_AMOUNT",
                self.referral_reward_amount,
                defaults.referral_reward_amount,
            ),
            signup_bonus_amount: positive(
                "SIGNUP_BONUS_AMOUNT",
                self.signup_bonus_amount,
                defaults.signup_bonus_amount,
            ),
            order_discount_amount: positive(
                "ORDER_DISCOUNT_AMOUNT",
                self.order_discount_amount,
                defaults.order_discount_amount,
            ),
            reward_expiry_days,
            min_qualifying_order,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub db_max_connections: u32,
    pub app_url: String,
    pub port: u16,
    pub reward_policy: RewardPolicy,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let storage_backend = env_or("STORAGE_BACKEND", StorageBackend::Postgres);
        let app_url = std::env::var("APP_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let defaults = RewardPolicy::default();
        let reward_policy = RewardPolicy {
            referral_reward_amount: env_or("REFERRAL_REWARD_AMOUNT", defaults.referral_reward_amount),
            signup_bonus_amount: env_or("SIGNUP_BONUS_AMOUNT", defaults.signup_bonus_amount),
            order_discount_amount: env_or("ORDER_DISCOUNT_AMOUNT", defaults.order_discount_amount),
            reward_expiry_days: env_or("REWARD_EXPIRY_DAYS", defaults.reward_expiry_days),
            min_qualifying_order: env_or("MIN_QUALIFYING_ORDER", defaults.min_qualifying_order),
        }
        .sanitized();

        Config {
            database_url,
            storage_backend,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            app_url,
            port: env_or("PORT", 8000),
            reward_policy,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Config {
        Config {
            database_url: None,
            storage_backend: StorageBackend::Memory,
            db_max_connections: 1,
            app_url: "http://localhost:3000".to_string(),
            port: 8000,
            reward_policy: RewardPolicy::default(),
        }
    }
}
