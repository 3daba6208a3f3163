use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Snapshot of the scraped profile that a message was written for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileSummary {
    pub full_name: String,
    pub biography: String,
    pub followers_count: i64,
    pub posts_count: i64,
    #[serde(default)]
    pub captions: Vec<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub project_id: Uuid,
    pub username: String,
    pub generated_message: String,
    pub user_info: Json<ProfileSummary>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub project_id: Uuid,
    pub username: String,
    pub generated_message: String,
    pub user_info: ProfileSummary,
}
