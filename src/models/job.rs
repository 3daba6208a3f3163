use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use super::credit::{Charge, ChargeSource};
use super::message::ProfileSummary;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one generation, shared by queued jobs and the synchronous endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub success: bool,
    pub message: Option<String>,
    pub user_info: Option<ProfileSummary>,
    pub message_id: Option<Uuid>,
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn completed(message: String, user_info: ProfileSummary, message_id: Uuid) -> Self {
        GenerationResult {
            success: true,
            message: Some(message),
            user_info: Some(user_info),
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        GenerationResult {
            success: false,
            message: None,
            user_info: None,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub username: String,
    pub status: JobStatus,
    pub result: Option<Json<GenerationResult>>,
    #[serde(skip_serializing)]
    pub charge_source: Option<ChargeSource>,
    #[serde(skip_serializing)]
    pub charge_subscription_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl GenerationJob {
    pub fn charge(&self) -> Option<Charge> {
        Charge::from_parts(self.charge_source, self.charge_subscription_id)
    }
}
