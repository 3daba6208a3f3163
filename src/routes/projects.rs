use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use super::auth::session::AuthSession;
use super::session_user;
use crate::models::project::{CreateProject, Project, ProjectUpdate};
use crate::responses::JsonResponse;
use crate::services::export::{export_filename, is_export_eligible, messages_workbook};
use crate::state::AppState;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const EXPORT_UPGRADE_MESSAGE: &str = "Excel export is only available for Growth and Pro plan subscribers. Please upgrade your plan to access this feature.";

/// The caller's project, or a 404 that does not reveal whether it exists.
pub(crate) async fn owned_project(
    state: &AppState,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Project, Response> {
    match state.projects.find_project(user_id, project_id).await {
        Ok(Some(project)) => Ok(project),
        Ok(None) => Err(JsonResponse::not_found("Project not found").into_response()),
        Err(err) => {
            error!(?err, %project_id, "failed to load project");
            Err(JsonResponse::server_error("Database error").into_response())
        }
    }
}

pub async fn list_projects(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.projects.list_projects(user.id).await {
        Ok(projects) => Json(projects).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to list projects");
            JsonResponse::server_error("Failed to load projects").into_response()
        }
    }
}

pub async fn create_project(
    State(state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<CreateProject>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let input = CreateProject {
        name: payload.name.trim().to_string(),
        product_info: payload.product_info.trim().to_string(),
        offer_info: payload.offer_info.trim().to_string(),
    };
    if input.name.is_empty() {
        return JsonResponse::bad_request("Project name cannot be empty").into_response();
    }
    if input.product_info.is_empty() {
        return JsonResponse::bad_request("Product info cannot be empty").into_response();
    }
    if input.offer_info.is_empty() {
        return JsonResponse::bad_request("Offer info cannot be empty").into_response();
    }

    match state.projects.create_project(user.id, &input).await {
        Ok(project) => {
            info!(user_id = %user.id, project_id = %project.id, "project created");
            Json(project).into_response()
        }
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to create project");
            JsonResponse::server_error("Failed to create project").into_response()
        }
    }
}

pub async fn get_project(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match owned_project(&state, user.id, project_id).await {
        Ok(project) => Json(project).into_response(),
        Err(response) => response,
    }
}

pub async fn update_project(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ProjectUpdate>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(response) = owned_project(&state, user.id, project_id).await {
        return response;
    }

    let update = payload.normalized();
    if update.is_empty() {
        return JsonResponse::bad_request("No valid updates provided").into_response();
    }

    match state
        .projects
        .update_project(user.id, project_id, &update)
        .await
    {
        Ok(Some(project)) => Json(project).into_response(),
        Ok(None) => JsonResponse::not_found("Project not found").into_response(),
        Err(err) => {
            error!(?err, %project_id, "failed to update project");
            JsonResponse::server_error("Failed to update project").into_response()
        }
    }
}

pub async fn delete_project(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.projects.delete_project(user.id, project_id).await {
        Ok(true) => {
            info!(user_id = %user.id, %project_id, "project deleted");
            JsonResponse::success("Project deleted successfully").into_response()
        }
        Ok(false) => JsonResponse::not_found("Project not found").into_response(),
        Err(err) => {
            error!(?err, %project_id, "failed to delete project");
            JsonResponse::server_error("Failed to delete project").into_response()
        }
    }
}

/// Spreadsheet of every message in the project, for Growth and Pro subscribers.
pub async fn export_messages(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    let project = match owned_project(&state, user.id, project_id).await {
        Ok(project) => project,
        Err(response) => return response,
    };

    let subscription = match state.ledger.current_subscription(user.id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to load subscription for export");
            return JsonResponse::server_error("Failed to export messages. Please try again.")
                .into_response();
        }
    };
    if !is_export_eligible(subscription.as_ref()) {
        return JsonResponse::forbidden(EXPORT_UPGRADE_MESSAGE).into_response();
    }

    let messages = match state.projects.list_messages(project.id).await {
        Ok(messages) => messages,
        Err(err) => {
            error!(?err, %project_id, "failed to load messages for export");
            return JsonResponse::server_error("Failed to export messages. Please try again.")
                .into_response();
        }
    };
    if messages.is_empty() {
        return JsonResponse::not_found("No messages found for this project").into_response();
    }

    let now = OffsetDateTime::now_utc();
    let built = messages_workbook(&project.name, &messages, now)
        .and_then(|bytes| Ok((bytes, export_filename(&project.name, now)?)));
    let (bytes, filename) = match built {
        Ok(built) => built,
        Err(err) => {
            error!(?err, %project_id, "failed to build export");
            return JsonResponse::server_error("Failed to export messages. Please try again.")
                .into_response();
        }
    };

    info!(user_id = %user.id, %project_id, messages = messages.len(), "messages exported");
    let disposition = HeaderValue::from_str(&format!("attachment; filename={filename}"))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{header, Method, StatusCode},
        routing::get,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::db::project_repository::ProjectRepository;
    use crate::models::message::{NewMessage, ProfileSummary};
    use crate::routes::test_helpers::{body_json, empty_request, json_request};
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        Router::new()
            .route("/", get(list_projects).post(create_project))
            .route(
                "/{project_id}",
                get(get_project).put(update_project).delete(delete_project),
            )
            .route("/{project_id}/export", get(export_messages))
            .with_state(app.state.clone())
    }

    async fn add_message(app: &TestApp, project_id: Uuid) {
        app.db
            .insert_message(&NewMessage {
                project_id,
                username: "candle_lover".into(),
                generated_message: "Hey! Cheers, Jane".into(),
                user_info: ProfileSummary::default(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_then_list_returns_trimmed_project() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/",
                Some(&token),
                json!({ "name": " Launch ", "product_info": "Candles", "offer_info": "20% off" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let created = body_json(res).await;
        assert_eq!(created["name"], "Launch");
        assert!(created.get("user_id").is_none());

        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/", Some(&token)))
            .await
            .unwrap();
        let listed = body_json(res).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/",
                Some(&token),
                json!({ "name": "Launch", "product_info": "  ", "offer_info": "20% off" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Product info cannot be empty");

        let project = app.db.seed_project(user.id);
        let res = router(&app)
            .oneshot(json_request(
                Method::PUT,
                &format!("/{}", project.id),
                Some(&token),
                json!({ "name": "   " }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let project = app.db.seed_project(user.id);
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::PUT,
                &format!("/{}", project.id),
                Some(&token),
                json!({ "offer_info": "Free shipping" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["offer_info"], "Free shipping");
        assert_eq!(body["name"], project.name);
    }

    #[tokio::test]
    async fn other_users_projects_are_not_found() {
        let app = TestApp::new();
        let owner = app.db.seed_user("owner@example.com");
        let intruder = app.db.seed_user("intruder@example.com");
        let project = app.db.seed_project(owner.id);
        let token = app.token_for(&intruder);

        for method in [Method::GET, Method::DELETE] {
            let res = router(&app)
                .oneshot(empty_request(method, &format!("/{}", project.id), Some(&token)))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
        }
        assert!(app.db.find_project(owner.id, project.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn export_requires_growth_or_pro() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let project = app.db.seed_project(user.id);
        add_message(&app, project.id).await;
        let token = app.token_for(&user);
        let uri = format!("/{}/export", project.id);

        let res = router(&app)
            .oneshot(empty_request(Method::GET, &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        app.db.seed_subscription(user.id, "plan_1", 100, 0);
        let res = router(&app)
            .oneshot(empty_request(Method::GET, &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn export_returns_an_attachment() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let project = app.db.seed_project(user.id);
        app.db.seed_subscription(user.id, "plan_2", 500, 0);
        let token = app.token_for(&user);
        let uri = format!("/{}/export", project.id);

        let res = router(&app)
            .oneshot(empty_request(Method::GET, &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        add_message(&app, project.id).await;
        let res = router(&app)
            .oneshot(empty_request(Method::GET, &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
        let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=DMify_Messages_Launch_"));
    }
}
