use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::user_repository::UserRepository,
    models::{signup::SignupPayload, user::User},
};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, email_verified, created_at, deletion_requested_at";

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email.to_lowercase())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_user(
        &self,
        payload: &SignupPayload,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, email_verified, created_at)
            VALUES ($1, $2, $3, $4, false, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(payload.email.trim().to_lowercase())
        .bind(password_hash)
        .bind(payload.name.trim())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
    }

    async fn replace_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        let email = email.to_lowercase();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE email = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO verification_codes (id, email, code, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(code)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    async fn consume_verification_code(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE verification_codes
            SET used_at = $3
            WHERE email = $1
              AND code = $2
              AND used_at IS NULL
              AND expires_at > $3
            "#,
        )
        .bind(email.to_lowercase())
        .bind(code)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_user_verified(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET email_verified = true WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO password_resets (user_id, token, expires_at)
            VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_password_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE password_resets
            SET used_at = $2
            WHERE token = $1
              AND used_at IS NULL
              AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_account_for_deletion(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET deletion_requested_at = $2
            WHERE id = $1 AND deletion_requested_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_deleted_accounts(&self, cutoff: OffsetDateTime) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM users WHERE deletion_requested_at IS NOT NULL AND deletion_requested_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
