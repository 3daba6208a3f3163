use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::ledger_repository::LedgerRepository,
    models::{
        credit::CreditBalance,
        subscription::{Subscription, SubscriptionStatus, SubscriptionSync},
    },
};

const BALANCE_COLUMNS: &str = "user_id, credits, total_earned, total_used";
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, external_subscription_id, plan_id, status, \
     monthly_allowance, used_this_month, period_start, period_end, cancel_at_period_end";

pub struct PostgresLedgerRepository {
    pub pool: PgPool,
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn ensure_balance(&self, user_id: Uuid) -> Result<CreditBalance, sqlx::Error> {
        sqlx::query(
            "INSERT INTO credit_balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, CreditBalance>(&format!(
            "SELECT {BALANCE_COLUMNS} FROM credit_balances WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn add_credits(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<CreditBalance, sqlx::Error> {
        sqlx::query_as::<_, CreditBalance>(&format!(
            r#"
            INSERT INTO credit_balances (user_id, credits, total_earned, total_used)
            VALUES ($1, $2, $2, 0)
            ON CONFLICT (user_id) DO UPDATE
            SET credits = credit_balances.credits + EXCLUDED.credits,
                total_earned = credit_balances.total_earned + EXCLUDED.total_earned,
                updated_at = now()
            RETURNING {BALANCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
    }

    async fn consume_credit(&self, user_id: Uuid) -> Result<Option<CreditBalance>, sqlx::Error> {
        sqlx::query_as::<_, CreditBalance>(&format!(
            r#"
            UPDATE credit_balances
            SET credits = credits - 1,
                total_used = total_used + 1,
                updated_at = now()
            WHERE user_id = $1 AND credits > 0
            RETURNING {BALANCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn refund_credit(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE credit_balances
            SET credits = credits + 1,
                total_used = total_used - 1,
                updated_at = now()
            WHERE user_id = $1 AND total_used > 0
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn current_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE user_id = $1 AND status IN ('active', 'past_due')
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn consume_subscription_unit(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        // Field-to-field comparison is evaluated against the locked row.
        sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET used_this_month = used_this_month + 1,
                updated_at = now()
            WHERE id = $1
              AND status IN ('active', 'past_due')
              AND used_this_month < monthly_allowance
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn refund_subscription_unit(&self, subscription_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET used_this_month = used_this_month - 1,
                updated_at = now()
            WHERE id = $1 AND used_this_month > 0
            "#,
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_subscription(
        &self,
        sync: &SubscriptionSync,
    ) -> Result<Subscription, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if sync.status.is_current() {
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET status = 'canceled', updated_at = now()
                WHERE user_id = $1
                  AND external_subscription_id <> $2
                  AND status IN ('active', 'past_due')
                "#,
            )
            .bind(sync.user_id)
            .bind(&sync.external_subscription_id)
            .execute(&mut *tx)
            .await?;
        }

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (
                id, user_id, external_subscription_id, plan_id, status,
                monthly_allowance, used_this_month, period_start, period_end,
                cancel_at_period_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9)
            ON CONFLICT (external_subscription_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                status = EXCLUDED.status,
                monthly_allowance = EXCLUDED.monthly_allowance,
                period_start = EXCLUDED.period_start,
                period_end = EXCLUDED.period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = now()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(sync.user_id)
        .bind(&sync.external_subscription_id)
        .bind(&sync.plan_id)
        .bind(sync.status)
        .bind(sync.monthly_allowance)
        .bind(sync.period_start)
        .bind(sync.period_end)
        .bind(sync.cancel_at_period_end)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(subscription)
    }

    async fn find_subscription_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE external_subscription_id = $1"
        ))
        .bind(external_subscription_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn reset_subscription_usage(
        &self,
        external_subscription_id: &str,
        period_start: OffsetDateTime,
        period_end: OffsetDateTime,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET used_this_month = 0,
                period_start = $2,
                period_end = $3,
                updated_at = now()
            WHERE external_subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(external_subscription_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_subscription_status(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2,
                cancel_at_period_end = $3,
                updated_at = now()
            WHERE external_subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(external_subscription_id)
        .bind(status)
        .bind(cancel_at_period_end)
        .fetch_optional(&self.pool)
        .await
    }
}
