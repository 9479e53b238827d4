// service/user_service.rs
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    error::ServiceError,
    mock,
    referral::{generate_referral_code, generate_referral_link, normalize_referral_code},
    referral_ledger::{AppliedReferral, ApplyContext, ReferralLedger},
    Outcome, Persistence,
};
use crate::{
    db::{LedgerStore, StoreError, UserExt},
    models::usermodel::{NewUser, User, UserId, UserPatch},
};

const CODE_ATTEMPTS: usize = 5;

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("static regex"))
}

pub fn is_valid_mobile(mobile: &str) -> bool {
    mobile_pattern().is_match(mobile)
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub mobile_number: Option<String>,
    pub auth_uid: Option<String>,
    pub referral_code: Option<String>,
}

impl Registration {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::Validation("name is required".to_string()));
        }
        if !validator::validate_email(self.email.trim()) {
            return Err(ServiceError::Validation(format!(
                "email {} is invalid",
                self.email
            )));
        }
        if let Some(mobile) = &self.mobile_number {
            if !is_valid_mobile(mobile.trim()) {
                return Err(ServiceError::Validation(
                    "mobile number must be 10 to 15 digits".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn referral_code(&self) -> Option<String> {
        self.referral_code
            .as_deref()
            .map(normalize_referral_code)
            .filter(|code| !code.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegisteredUser {
    pub user: User,
    pub referral: Option<AppliedReferral>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferralLink {
    pub referral_code: String,
    pub referral_link: String,
}

/// Account creation and lookups. Referral bookkeeping is delegated to the
/// ledger so registration and the apply endpoint share one code path.
#[derive(Debug, Clone)]
pub struct UserService {
    persistence: Persistence,
    ledger: Arc<ReferralLedger>,
    app_url: String,
}

impl UserService {
    pub fn new(persistence: Persistence, ledger: Arc<ReferralLedger>, app_url: String) -> Self {
        Self {
            persistence,
            ledger,
            app_url,
        }
    }

    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<Outcome<RegisteredUser>, ServiceError> {
        registration.validate()?;

        let store = match &self.persistence {
            Persistence::Available(store) => store,
            Persistence::Unavailable => return self.mock_registration(registration).await,
        };

        match self.register_with(store.as_ref(), &registration).await {
            Err(ServiceError::Unavailable(reason)) => {
                warn!("Store unavailable during registration: {}; answering with mock", reason);
                self.mock_registration(registration).await
            }
            result => result.map(Outcome::real),
        }
    }

    async fn register_with(
        &self,
        store: &dyn LedgerStore,
        registration: &Registration,
    ) -> Result<RegisteredUser, ServiceError> {
        let email = registration.email.trim().to_lowercase();
        if store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailTaken(email));
        }

        let referral_code = registration.referral_code();
        if let Some(code) = &referral_code {
            if store.find_user_by_referral_code(code).await?.is_none() {
                return Err(ServiceError::InvalidReferralCode(code.clone()));
            }
        }

        let user = self.create_with_fresh_code(store, registration, &email).await?;
        info!("Registered user {} with referral code {}", user.id, user.referral_code);

        let Some(code) = referral_code else {
            return Ok(RegisteredUser {
                user,
                referral: None,
            });
        };

        let referral = match self
            .ledger
            .apply_referral_code(&UserId::from(user.id), &code, ApplyContext::Registration)
            .await
        {
            Ok(outcome) if outcome.mock => {
                warn!(
                    "Registration of {} kept without referral {}: store unavailable",
                    user.id, code
                );
                None
            }
            Ok(outcome) => Some(outcome.data),
            Err(err) => {
                warn!("Registration of {} kept without referral {}: {}", user.id, code, err);
                None
            }
        };

        // Re-read so referred_by reflects the applied code.
        let user = match store.find_user_by_id(&UserId::from(user.id)).await {
            Ok(Some(fresh)) => fresh,
            _ => user,
        };

        Ok(RegisteredUser { user, referral })
    }

    async fn create_with_fresh_code(
        &self,
        store: &dyn LedgerStore,
        registration: &Registration,
        email: &str,
    ) -> Result<User, ServiceError> {
        for attempt in 1..=CODE_ATTEMPTS {
            let code = generate_referral_code(&registration.name);
            if store.find_user_by_referral_code(&code).await?.is_some() {
                debug!("Referral code {} taken (attempt {})", code, attempt);
                continue;
            }

            let new_user = NewUser {
                auth_uid: registration.auth_uid.clone(),
                email: email.to_string(),
                name: registration.name.trim().to_string(),
                mobile_number: registration.mobile_number.as_ref().map(|m| m.trim().to_string()),
                referral_code: code.clone(),
                referred_by: None,
            };

            match store.create_user(new_user).await {
                Ok(user) => return Ok(user),
                Err(StoreError::UniqueViolation(constraint)) if constraint.contains("referral_code") => {
                    debug!("Referral code {} raced (attempt {})", code, attempt);
                }
                Err(StoreError::UniqueViolation(constraint)) if constraint.contains("email") => {
                    return Err(ServiceError::EmailTaken(email.to_string()));
                }
                Err(StoreError::UniqueViolation(constraint)) => {
                    return Err(ServiceError::Validation(format!(
                        "account already exists ({})",
                        constraint
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::Other(format!(
            "could not allocate a unique referral code after {} attempts",
            CODE_ATTEMPTS
        )))
    }

    async fn mock_registration(
        &self,
        registration: Registration,
    ) -> Result<Outcome<RegisteredUser>, ServiceError> {
        let referral_code = registration.referral_code();
        let mut user = mock::user(
            NewUser {
                auth_uid: registration.auth_uid,
                email: registration.email,
                name: registration.name.trim().to_string(),
                mobile_number: registration.mobile_number,
                referral_code: String::new(),
                referred_by: referral_code.clone(),
            },
            Utc::now(),
        );

        let referral = match referral_code {
            Some(code) => {
                let applied = self
                    .ledger
                    .apply_referral_code(&UserId::from(user.id), &code, ApplyContext::Registration)
                    .await;
                match applied {
                    Ok(outcome) => Some(outcome.data),
                    Err(err) => {
                        warn!("Mock registration without referral {}: {}", code, err);
                        user.referred_by = None;
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Outcome::mock(RegisteredUser { user, referral }))
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<Outcome<User>, ServiceError> {
        if user_id.is_empty() {
            return Err(ServiceError::Validation("user id is required".to_string()));
        }

        let Persistence::Available(store) = &self.persistence else {
            return Ok(Outcome::mock(mock::known_user(user_id, Utc::now())));
        };

        match store.find_user_by_id(user_id).await {
            Ok(Some(user)) => Ok(Outcome::real(user)),
            Ok(None) => Err(ServiceError::UserNotFound(user_id.to_string())),
            Err(StoreError::Unavailable(reason)) => {
                warn!("Store unavailable looking up {}: {}", user_id, reason);
                Ok(Outcome::mock(mock::known_user(user_id, Utc::now())))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Only name and mobile number are editable.
    pub async fn update_profile(
        &self,
        user_id: &UserId,
        name: Option<String>,
        mobile_number: Option<String>,
    ) -> Result<Outcome<User>, ServiceError> {
        let patch = UserPatch {
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            mobile_number: mobile_number
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            referred_by: None,
        };
        if patch.is_empty() {
            return Err(ServiceError::Validation("no profile fields to update".to_string()));
        }
        if let Some(mobile) = &patch.mobile_number {
            if !is_valid_mobile(mobile) {
                return Err(ServiceError::Validation(
                    "mobile number must be 10 to 15 digits".to_string(),
                ));
            }
        }

        let current = self.get_user(user_id).await?;
        if current.mock {
            let mut user = current.data;
            patch.apply_to(&mut user);
            return Ok(Outcome::mock(user));
        }

        let Persistence::Available(store) = &self.persistence else {
            return Err(ServiceError::Unavailable("no store".to_string()));
        };

        match store.update_user(current.data.id, patch.clone()).await {
            Ok(Some(user)) => {
                info!("Profile of {} updated", user.id);
                Ok(Outcome::real(user))
            }
            Ok(None) => Err(ServiceError::UserNotFound(user_id.to_string())),
            Err(StoreError::Unavailable(reason)) => {
                warn!("Store unavailable updating {}: {}", user_id, reason);
                let mut user = current.data;
                patch.apply_to(&mut user);
                Ok(Outcome::mock(user))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn referral_link(&self, user_id: &UserId) -> Result<Outcome<ReferralLink>, ServiceError> {
        let user = self.get_user(user_id).await?;
        Ok(user.map(|user| ReferralLink {
            referral_link: generate_referral_link(&self.app_url, &user.referral_code),
            referral_code: user.referral_code,
        }))
    }
}
