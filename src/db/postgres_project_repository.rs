use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::project_repository::ProjectRepository,
    models::{
        message::{Message, NewMessage},
        project::{CreateProject, Project, ProjectUpdate},
    },
};

const PROJECT_COLUMNS: &str = "id, user_id, name, product_info, offer_info, created_at";
const MESSAGE_COLUMNS: &str =
    "id, project_id, username, generated_message, user_info, created_at, updated_at";

pub struct PostgresProjectRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn create_project(
        &self,
        user_id: Uuid,
        input: &CreateProject,
    ) -> Result<Project, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (id, user_id, name, product_info, offer_info, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(input.name.trim())
        .bind(input.product_info.trim())
        .bind(input.offer_info.trim())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
    }

    async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND user_id = $2"
        ))
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        update: &ProjectUpdate,
    ) -> Result<Option<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET name = COALESCE($3, name),
                product_info = COALESCE($4, product_info),
                offer_info = COALESCE($5, offer_info)
            WHERE id = $1 AND user_id = $2
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(user_id)
        .bind(update.name.as_deref())
        .bind(update.product_info.as_deref())
        .bind(update.offer_info.as_deref())
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_project(&self, user_id: Uuid, project_id: Uuid) -> Result<bool, sqlx::Error> {
        // messages and generation_jobs go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages
                (id, project_id, username, generated_message, user_info, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(message.project_id)
        .bind(&message.username)
        .bind(&message.generated_message)
        .bind(Json(&message.user_info))
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_messages(&self, project_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE project_id = $1 ORDER BY created_at DESC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT m.id, m.project_id, m.username, m.generated_message, m.user_info,
                   m.created_at, m.updated_at
            FROM messages m
            JOIN projects p ON p.id = m.project_id
            WHERE p.user_id = $1
            ORDER BY m.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_message(
        &self,
        project_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND project_id = $2"
        ))
        .bind(message_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_message_text(
        &self,
        project_id: Uuid,
        message_id: Uuid,
        text: &str,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET generated_message = $3, updated_at = now()
            WHERE id = $1 AND project_id = $2
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message_id)
        .bind(project_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_message(
        &self,
        project_id: Uuid,
        message_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1 AND project_id = $2")
            .bind(message_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
