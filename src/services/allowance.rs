use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::db::ledger_repository::LedgerRepository;
use crate::models::credit::{Charge, CreditBalance};

/// Remaining generation capacity for one user.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Allowance {
    pub subscription_remaining: i64,
    pub credits_remaining: i64,
    pub total_remaining: i64,
    pub has_subscription: bool,
}

#[derive(Debug, Error)]
pub enum AllowanceError {
    #[error("no allowance left")]
    Exhausted,
    #[error("ledger store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Consumes and refunds single generation units.
///
/// The monthly subscription allowance is spent before standalone credits.
/// Every mutation is a conditional update in the store.
#[derive(Clone)]
pub struct AllowanceManager {
    ledger: Arc<dyn LedgerRepository>,
}

impl AllowanceManager {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    pub async fn remaining(&self, user_id: Uuid) -> Result<Allowance, sqlx::Error> {
        let balance = self.ledger.ensure_balance(user_id).await?;
        let subscription = self.ledger.current_subscription(user_id).await?;

        let subscription_remaining = subscription.as_ref().map_or(0, |s| s.remaining());
        let credits_remaining = balance.credits.max(0);

        Ok(Allowance {
            subscription_remaining,
            credits_remaining,
            total_remaining: subscription_remaining + credits_remaining,
            has_subscription: subscription.is_some(),
        })
    }

    pub async fn consume_one(&self, user_id: Uuid) -> Result<Charge, AllowanceError> {
        if let Some(subscription) = self.ledger.current_subscription(user_id).await? {
            if subscription.remaining() > 0
                && self
                    .ledger
                    .consume_subscription_unit(subscription.id)
                    .await?
                    .is_some()
            {
                return Ok(Charge::Subscription(subscription.id));
            }
        }

        match self.ledger.consume_credit(user_id).await? {
            Some(_) => Ok(Charge::Credits),
            None => Err(AllowanceError::Exhausted),
        }
    }

    /// Gives back a unit taken by [`consume_one`](Self::consume_one).
    ///
    /// Store failures are logged, not returned.
    pub async fn refund_one(&self, user_id: Uuid, charge: Charge) {
        let outcome = match charge {
            Charge::Subscription(subscription_id) => {
                self.ledger.refund_subscription_unit(subscription_id).await
            }
            Charge::Credits => self.ledger.refund_credit(user_id).await,
        };

        match outcome {
            Ok(true) => {}
            Ok(false) => warn!(%user_id, ?charge, "refund found nothing to give back"),
            Err(err) => error!(%user_id, ?charge, ?err, "failed to refund allowance"),
        }
    }

    pub async fn add_credits(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<CreditBalance, sqlx::Error> {
        self.ledger.add_credits(user_id, amount).await
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<CreditBalance, sqlx::Error> {
        self.ledger.ensure_balance(user_id).await
    }
}
