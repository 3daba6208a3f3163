use async_trait::async_trait;
use uuid::Uuid;

use crate::models::payment::{NewPaymentTransaction, PaymentTransaction};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_transaction(
        &self,
        transaction: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction, sqlx::Error>;

    async fn find_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error>;

    /// pending -> completed. Exactly one caller gets `Some` for a given session.
    async fn claim_transaction(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error>;

    /// completed -> pending, used when applying a claimed payment failed.
    async fn revert_transaction(&self, session_id: &str) -> Result<(), sqlx::Error>;

    /// pending -> failed.
    async fn mark_transaction_failed(&self, session_id: &str) -> Result<bool, sqlx::Error>;

    /// Newest first.
    async fn list_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, sqlx::Error>;
}
