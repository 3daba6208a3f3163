use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    credit::Charge,
    job::{GenerationJob, GenerationResult, JobStatus},
    message::{Message, NewMessage},
};

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_job(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        username: &str,
    ) -> Result<GenerationJob, sqlx::Error>;

    async fn find_job(&self, job_id: Uuid) -> Result<Option<GenerationJob>, sqlx::Error>;

    async fn find_job_for_user(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<GenerationJob>, sqlx::Error>;

    /// Newest first.
    async fn list_jobs_for_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<GenerationJob>, sqlx::Error>;

    /// Moves a pending job to processing. `None` if it is missing or already claimed.
    async fn claim_job(
        &self,
        job_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<GenerationJob>, sqlx::Error>;

    async fn record_charge(&self, job_id: Uuid, charge: Charge) -> Result<(), sqlx::Error>;

    /// Stores the result and moves a processing job to `status`.
    /// Returns false when the job was no longer processing.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: &GenerationResult,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    /// Stores the message and completes the job in one step, only while the
    /// job is still processing. `None` means nothing was written.
    async fn complete_job(
        &self,
        job_id: Uuid,
        message: &NewMessage,
        now: OffsetDateTime,
    ) -> Result<Option<Message>, sqlx::Error>;

    /// Deletes the job only while it is still pending.
    async fn delete_pending_job(&self, user_id: Uuid, job_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Oldest first.
    async fn list_pending_jobs(&self, limit: i64) -> Result<Vec<GenerationJob>, sqlx::Error>;

    async fn list_stale_jobs(
        &self,
        started_before: OffsetDateTime,
    ) -> Result<Vec<GenerationJob>, sqlx::Error>;
}
