// service/order_gateway.rs
use std::sync::Arc;

use tracing::{debug, info};

use super::{
    error::ServiceError,
    referral_ledger::{CompletedReferral, ReferralLedger},
    Outcome,
};
use crate::models::usermodel::UserId;

/// Entry point the checkout flow calls once an order is paid.
#[derive(Debug, Clone)]
pub struct OrderGateway {
    ledger: Arc<ReferralLedger>,
}

impl OrderGateway {
    pub fn new(ledger: Arc<ReferralLedger>) -> Self {
        Self { ledger }
    }

    /// Completes the buyer's pending referral, if they have one. Only the
    /// first qualifying order pays the referrer; later orders return `None`.
    pub async fn order_completed(
        &self,
        user_id: &UserId,
        order_id: &str,
        order_amount: f64,
    ) -> Result<Outcome<Option<CompletedReferral>>, ServiceError> {
        if order_id.trim().is_empty() {
            return Err(ServiceError::Validation("order id is required".to_string()));
        }

        let pending = self.ledger.pending_referral_for(user_id).await?;
        let Some(referral) = pending.data else {
            debug!("Order {} by {}: no pending referral", order_id, user_id);
            return Ok(Outcome {
                data: None,
                mock: pending.mock,
            });
        };

        if order_amount < self.ledger.policy().min_qualifying_order {
            debug!(
                "Order {} ({}) below qualifying minimum; referral {} stays pending",
                order_id, order_amount, referral.id
            );
            return Ok(Outcome::real(None));
        }

        let completed = self
            .ledger
            .complete_referral(referral.id, order_id, order_amount)
            .await?;
        info!("Order {} completed referral {}", order_id, referral.id);

        Ok(completed.map(Some))
    }
}
