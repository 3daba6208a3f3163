use crate::db::stripe_event_log_repository::StripeEventLogRepository;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

pub struct PostgresStripeEventLogRepository {
    pub pool: PgPool,
}

#[async_trait]
impl StripeEventLogRepository for PostgresStripeEventLogRepository {
    async fn has_processed_event(&self, event_id: &str) -> Result<bool, sqlx::Error> {
        let exists = sqlx::query_scalar::<Postgres, i32>(
            "SELECT 1 FROM stripe_event_log WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .is_some();

        Ok(exists)
    }

    async fn record_event(&self, event_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            INSERT INTO stripe_event_log (event_id)
            VALUES ($1)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
