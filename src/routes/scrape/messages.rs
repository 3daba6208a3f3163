use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::routes::auth::session::AuthSession;
use crate::routes::projects::owned_project;
use crate::routes::session_user;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateMessageRequest {
    pub generated_message: String,
}

#[derive(Deserialize)]
pub struct MessagePath {
    pub project_id: Uuid,
    pub message_id: Uuid,
}

pub async fn list_project_messages(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(response) = owned_project(&state, user.id, project_id).await {
        return response;
    }

    match state.projects.list_messages(project_id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(err) => {
            error!(?err, %project_id, "failed to list messages");
            JsonResponse::server_error("Failed to load messages").into_response()
        }
    }
}

pub async fn get_message(
    State(state): State<AppState>,
    session: AuthSession,
    Path(path): Path<MessagePath>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(response) = owned_project(&state, user.id, path.project_id).await {
        return response;
    }

    match state
        .projects
        .find_message(path.project_id, path.message_id)
        .await
    {
        Ok(Some(message)) => Json(message).into_response(),
        Ok(None) => JsonResponse::not_found("Message not found").into_response(),
        Err(err) => {
            error!(?err, message_id = %path.message_id, "failed to load message");
            JsonResponse::server_error("Failed to load message").into_response()
        }
    }
}

pub async fn update_message(
    State(state): State<AppState>,
    session: AuthSession,
    Path(path): Path<MessagePath>,
    Json(payload): Json<UpdateMessageRequest>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(response) = owned_project(&state, user.id, path.project_id).await {
        return response;
    }

    let text = payload.generated_message.trim();
    if text.is_empty() {
        return JsonResponse::bad_request("Message cannot be empty").into_response();
    }

    match state
        .projects
        .update_message_text(path.project_id, path.message_id, text)
        .await
    {
        Ok(Some(message)) => Json(message).into_response(),
        Ok(None) => JsonResponse::not_found("Message not found").into_response(),
        Err(err) => {
            error!(?err, message_id = %path.message_id, "failed to update message");
            JsonResponse::server_error("Failed to update message").into_response()
        }
    }
}

pub async fn delete_message(
    State(state): State<AppState>,
    session: AuthSession,
    Path(path): Path<MessagePath>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(response) = owned_project(&state, user.id, path.project_id).await {
        return response;
    }

    match state
        .projects
        .delete_message(path.project_id, path.message_id)
        .await
    {
        Ok(true) => {
            info!(message_id = %path.message_id, "message deleted");
            JsonResponse::success("Message deleted successfully").into_response()
        }
        Ok(false) => JsonResponse::not_found("Message not found").into_response(),
        Err(err) => {
            error!(?err, message_id = %path.message_id, "failed to delete message");
            JsonResponse::server_error("Failed to delete message").into_response()
        }
    }
}

/// Every message the caller owns across projects, newest first.
pub async fn list_user_messages(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.projects.list_messages_for_user(user.id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to list user messages");
            JsonResponse::server_error("Failed to load messages").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{Method, StatusCode},
        routing::get,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::db::project_repository::ProjectRepository;
    use crate::models::message::{Message, NewMessage, ProfileSummary};
    use crate::routes::test_helpers::{body_json, empty_request, json_request};
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        Router::new()
            .route("/projects/{project_id}/messages", get(list_project_messages))
            .route(
                "/projects/{project_id}/messages/{message_id}",
                get(get_message).put(update_message).delete(delete_message),
            )
            .route("/messages", get(list_user_messages))
            .with_state(app.state.clone())
    }

    async fn add_message(app: &TestApp, project_id: Uuid, username: &str) -> Message {
        app.db
            .insert_message(&NewMessage {
                project_id,
                username: username.into(),
                generated_message: format!("Hey {username}! Cheers, Jane"),
                user_info: ProfileSummary::default(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn messages_are_listed_per_project_and_across_projects() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let first = app.db.seed_project(user.id);
        let second = app.db.seed_project(user.id);
        add_message(&app, first.id, "one").await;
        add_message(&app, second.id, "two").await;
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(empty_request(
                Method::GET,
                &format!("/projects/{}/messages", first.id),
                Some(&token),
            ))
            .await
            .unwrap();
        let listed = body_json(res).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["username"], "one");

        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/messages", Some(&token)))
            .await
            .unwrap();
        assert_eq!(body_json(res).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn message_can_be_edited_and_deleted() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let project = app.db.seed_project(user.id);
        let message = add_message(&app, project.id, "one").await;
        let token = app.token_for(&user);
        let uri = format!("/projects/{}/messages/{}", project.id, message.id);

        let res = router(&app)
            .oneshot(json_request(
                Method::PUT,
                &uri,
                Some(&token),
                json!({ "generated_message": "  Edited text  " }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["generated_message"], "Edited text");

        let res = router(&app)
            .oneshot(json_request(
                Method::PUT,
                &uri,
                Some(&token),
                json!({ "generated_message": "   " }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = router(&app)
            .oneshot(empty_request(Method::DELETE, &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = router(&app)
            .oneshot(empty_request(Method::GET, &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn messages_in_foreign_projects_are_not_found() {
        let app = TestApp::new();
        let owner = app.db.seed_user("owner@example.com");
        let intruder = app.db.seed_user("intruder@example.com");
        let project = app.db.seed_project(owner.id);
        let message = add_message(&app, project.id, "one").await;
        let token = app.token_for(&intruder);

        let res = router(&app)
            .oneshot(empty_request(
                Method::DELETE,
                &format!("/projects/{}/messages/{}", project.id, message.id),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(app.db.messages().len(), 1);
    }
}
