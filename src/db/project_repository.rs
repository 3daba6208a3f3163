use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    message::{Message, NewMessage},
    project::{CreateProject, Project, ProjectUpdate},
};

/// Projects and the messages generated inside them.
///
/// Every lookup is scoped to the owning user; a project that belongs to
/// someone else is indistinguishable from one that does not exist.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create_project(
        &self,
        user_id: Uuid,
        input: &CreateProject,
    ) -> Result<Project, sqlx::Error>;

    async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, sqlx::Error>;

    async fn find_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, sqlx::Error>;

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        update: &ProjectUpdate,
    ) -> Result<Option<Project>, sqlx::Error>;

    /// Removes the project together with its messages and jobs.
    async fn delete_project(&self, user_id: Uuid, project_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn insert_message(&self, message: &NewMessage) -> Result<Message, sqlx::Error>;

    /// Newest first.
    async fn list_messages(&self, project_id: Uuid) -> Result<Vec<Message>, sqlx::Error>;

    /// Messages across every project the user owns, newest first.
    async fn list_messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, sqlx::Error>;

    async fn find_message(
        &self,
        project_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<Message>, sqlx::Error>;

    async fn update_message_text(
        &self,
        project_id: Uuid,
        message_id: Uuid,
        text: &str,
    ) -> Result<Option<Message>, sqlx::Error>;

    async fn delete_message(&self, project_id: Uuid, message_id: Uuid)
        -> Result<bool, sqlx::Error>;
}
