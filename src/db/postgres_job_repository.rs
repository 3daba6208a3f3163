use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::job_repository::JobRepository,
    models::{
        credit::Charge,
        job::{GenerationJob, GenerationResult, JobStatus},
        message::{Message, NewMessage},
    },
};

const JOB_COLUMNS: &str = "id, user_id, project_id, username, status, result, charge_source, \
     charge_subscription_id, created_at, started_at, completed_at";

pub struct PostgresJobRepository {
    pub pool: PgPool,
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn create_job(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        username: &str,
    ) -> Result<GenerationJob, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"
            INSERT INTO generation_jobs (id, user_id, project_id, username, status, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(project_id)
        .bind(username)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<GenerationJob>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_job_for_user(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1 AND user_id = $2"
        ))
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_jobs_for_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generation_jobs
            WHERE project_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn claim_job(
        &self,
        job_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"
            UPDATE generation_jobs
            SET status = 'processing', started_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn record_charge(&self, job_id: Uuid, charge: Charge) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET charge_source = $2, charge_subscription_id = $3
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(charge.source())
        .bind(charge.subscription_id())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: &GenerationResult,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = $2, result = $3, completed_at = $4
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(Json(result))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        message: &NewMessage,
        now: OffsetDateTime,
    ) -> Result<Option<Message>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let owned = sqlx::query(
            "SELECT id FROM generation_jobs WHERE id = $1 AND status = 'processing' FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_none() {
            return Ok(None);
        }

        let stored = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages
                (id, project_id, username, generated_message, user_info, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, project_id, username, generated_message, user_info, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.project_id)
        .bind(&message.username)
        .bind(&message.generated_message)
        .bind(Json(&message.user_info))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let result = GenerationResult::completed(
            stored.generated_message.clone(),
            message.user_info.clone(),
            stored.id,
        );
        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'completed', result = $2, completed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(Json(&result))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn delete_pending_job(&self, user_id: Uuid, job_id: Uuid) -> Result<bool, sqlx::Error> {
        let deleted = sqlx::query(
            "DELETE FROM generation_jobs WHERE id = $1 AND user_id = $2 AND status = 'pending'",
        )
        .bind(job_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn list_pending_jobs(&self, limit: i64) -> Result<Vec<GenerationJob>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generation_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_stale_jobs(
        &self,
        started_before: OffsetDateTime,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generation_jobs
            WHERE status = 'processing' AND started_at < $1
            ORDER BY started_at ASC
            "#
        ))
        .bind(started_before)
        .fetch_all(&self.pool)
        .await
    }
}
