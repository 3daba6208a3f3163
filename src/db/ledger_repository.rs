use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    credit::CreditBalance,
    subscription::{Subscription, SubscriptionStatus, SubscriptionSync},
};

/// Credit balances and subscription usage counters.
///
/// Every mutating method is a single conditional update evaluated by the
/// store; `Ok(false)` / `Ok(None)` means the condition did not hold at
/// mutation time and nothing changed.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Returns the balance row, creating an empty one if missing.
    async fn ensure_balance(&self, user_id: Uuid) -> Result<CreditBalance, sqlx::Error>;

    async fn add_credits(&self, user_id: Uuid, amount: i64)
        -> Result<CreditBalance, sqlx::Error>;

    /// Decrements `credits` and increments `total_used` only while `credits > 0`.
    async fn consume_credit(&self, user_id: Uuid) -> Result<Option<CreditBalance>, sqlx::Error>;

    /// Gives one credit back only while `total_used > 0`.
    async fn refund_credit(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    /// The user's active or past-due subscription, if any.
    async fn current_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    /// Increments `used_this_month` only while it is below `monthly_allowance`
    /// and the subscription is still current.
    async fn consume_subscription_unit(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    /// Decrements `used_this_month` only while it is above zero.
    async fn refund_subscription_unit(&self, subscription_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Creates or refreshes the row for `sync.external_subscription_id`.
    /// A current subscription cancels any other current one of the same user.
    async fn upsert_subscription(
        &self,
        sync: &SubscriptionSync,
    ) -> Result<Subscription, sqlx::Error>;

    async fn find_subscription_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    /// Renewal: zeroes `used_this_month` and moves the billing period.
    async fn reset_subscription_usage(
        &self,
        external_subscription_id: &str,
        period_start: OffsetDateTime,
        period_end: OffsetDateTime,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    async fn set_subscription_status(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    ) -> Result<Option<Subscription>, sqlx::Error>;
}
