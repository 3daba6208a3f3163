use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    /// Active and past-due subscriptions still grant their monthly allowance.
    pub fn is_current(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }

    /// Maps a Stripe subscription status onto the local lifecycle.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub external_subscription_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub monthly_allowance: i64,
    pub used_this_month: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub period_end: OffsetDateTime,
    pub cancel_at_period_end: bool,
}

impl Subscription {
    pub fn remaining(&self) -> i64 {
        (self.monthly_allowance - self.used_this_month).max(0)
    }
}

/// Mirror of the provider-side subscription used to create or refresh the local row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSync {
    pub user_id: Uuid,
    pub external_subscription_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub monthly_allowance: i64,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub cancel_at_period_end: bool,
}
