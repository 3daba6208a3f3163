use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::payment_repository::PaymentRepository,
    models::payment::{NewPaymentTransaction, PaymentTransaction},
};

const TRANSACTION_COLUMNS: &str = "id, user_id, external_session_id, plan_id, amount, quantity, \
     status, transaction_type, created_at, updated_at";

pub struct PostgresPaymentRepository {
    pub pool: PgPool,
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create_transaction(
        &self,
        transaction: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            INSERT INTO payment_transactions (
                id, user_id, external_session_id, plan_id, amount, quantity,
                status, transaction_type, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $8)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(transaction.user_id)
        .bind(&transaction.external_session_id)
        .bind(&transaction.plan_id)
        .bind(transaction.amount)
        .bind(transaction.quantity)
        .bind(transaction.transaction_type)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE external_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn claim_transaction(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            UPDATE payment_transactions
            SET status = 'completed', updated_at = now()
            WHERE external_session_id = $1 AND status = 'pending'
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn revert_transaction(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'pending', updated_at = now()
            WHERE external_session_id = $1 AND status = 'completed'
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_transaction_failed(&self, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'failed', updated_at = now()
            WHERE external_session_id = $1 AND status = 'pending'
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM payment_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
