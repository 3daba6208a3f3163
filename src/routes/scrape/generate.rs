use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::{allowance_exhausted, require_allowance};
use crate::models::{project::Project, user::User};
use crate::responses::JsonResponse;
use crate::routes::auth::session::AuthSession;
use crate::routes::projects::owned_project;
use crate::routes::session_user;
use crate::services::allowance::AllowanceError;
use crate::state::AppState;
use crate::utils::validation::normalize_username;
use crate::worker::{generate_charged, spawn_job};

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub username: String,
}

/// Shared preamble: caller, cleaned username, owned project, allowance check.
async fn prepare(
    state: &AppState,
    session: &AuthSession,
    project_id: Uuid,
    raw_username: &str,
) -> Result<(User, Project, String), Response> {
    let user = session_user(state, session).await?;
    let username = normalize_username(raw_username)
        .ok_or_else(|| JsonResponse::bad_request("Username cannot be empty").into_response())?;
    let project = owned_project(state, user.id, project_id).await?;
    require_allowance(state, user.id).await?;
    Ok((user, project, username))
}

/// Generates one message inline. External failures come back as
/// `{success: false, error}` with a 200 and the unit refunded.
pub async fn generate_message(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<GenerateRequest>,
) -> Response {
    let (user, project, username) =
        match prepare(&state, &session, project_id, &payload.username).await {
            Ok(prepared) => prepared,
            Err(response) => return response,
        };

    let charge = match state.allowance.consume_one(user.id).await {
        Ok(charge) => charge,
        Err(AllowanceError::Exhausted) => return allowance_exhausted(&state, user.id).await,
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to consume allowance");
            return JsonResponse::server_error("Failed to use allowance").into_response();
        }
    };

    let result = generate_charged(&state, &user, &project, &username, charge).await;
    info!(
        user_id = %user.id,
        project_id = %project.id,
        %username,
        success = result.success,
        "synchronous generation finished"
    );
    Json(result).into_response()
}

/// Records a pending job and processes it in the background.
pub async fn queue_generation(
    State(state): State<AppState>,
    session: AuthSession,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<GenerateRequest>,
) -> Response {
    let (user, project, username) =
        match prepare(&state, &session, project_id, &payload.username).await {
            Ok(prepared) => prepared,
            Err(response) => return response,
        };

    let job = match state.jobs.create_job(user.id, project.id, &username).await {
        Ok(job) => job,
        Err(err) => {
            error!(?err, user_id = %user.id, project_id = %project.id, "failed to create job");
            return JsonResponse::server_error("Failed to queue generation").into_response();
        }
    };

    info!(job_id = %job.id, user_id = %user.id, %username, "generation job queued");
    spawn_job(state.clone(), job.id);

    Json(json!({
        "success": true,
        "job_id": job.id,
        "status": job.status,
    }))
    .into_response()
}
