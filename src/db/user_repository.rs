use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{signup::SignupPayload, user::User};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error>;
    async fn create_user(
        &self,
        payload: &SignupPayload,
        password_hash: &str,
    ) -> Result<User, sqlx::Error>;

    /// Stores a fresh code for `email`, discarding every earlier one.
    async fn replace_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// Marks a matching, unexpired, unused code as used. Returns whether one matched.
    async fn consume_verification_code(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;
    async fn set_user_verified(&self, user_id: Uuid) -> Result<(), sqlx::Error>;

    async fn insert_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// Marks an unexpired, unused reset token as used and returns its owner.
    async fn consume_password_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error>;

    async fn mark_account_for_deletion(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    /// Hard-deletes accounts whose deletion was requested before `cutoff`.
    async fn purge_deleted_accounts(&self, cutoff: OffsetDateTime) -> Result<u64, sqlx::Error>;
}
