use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    OneTime,
    Subscription,
}

/// Audit record of one checkout attempt, keyed by the provider's session id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct PaymentTransaction {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub external_session_id: String,
    pub plan_id: String,
    /// Amount in cents.
    pub amount: i64,
    /// Credits for one-time packs, monthly messages for subscriptions.
    pub quantity: i64,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub user_id: Uuid,
    pub external_session_id: String,
    pub plan_id: String,
    pub amount: i64,
    pub quantity: i64,
    pub transaction_type: TransactionType,
}
