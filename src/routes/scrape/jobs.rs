use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::routes::auth::session::AuthSession;
use crate::routes::projects::owned_project;
use crate::routes::session_user;
use crate::state::AppState;

pub async fn list_project_jobs(
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

    match state.jobs.list_jobs_for_project(user.id, project_id).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => {
            error!(?err, %project_id, "failed to list jobs");
            JsonResponse::server_error("Failed to load jobs").into_response()
        }
    }
}

pub async fn get_job(
    State(state): State<AppState>,
    session: AuthSession,
    Path(job_id): Path<Uuid>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.jobs.find_job_for_user(user.id, job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => JsonResponse::not_found("Job not found").into_response(),
        Err(err) => {
            error!(?err, %job_id, "failed to load job");
            JsonResponse::server_error("Failed to load job").into_response()
        }
    }
}

/// Deletes a job that has not started yet. Started jobs run to completion.
pub async fn cancel_job(
    State(state): State<AppState>,
    session: AuthSession,
    Path(job_id): Path<Uuid>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.jobs.delete_pending_job(user.id, job_id).await {
        Ok(true) => {
            info!(%job_id, user_id = %user.id, "pending job cancelled");
            return JsonResponse::success("Job cancelled").into_response();
        }
        Ok(false) => {}
        Err(err) => {
            error!(?err, %job_id, "failed to cancel job");
            return JsonResponse::server_error("Failed to cancel job").into_response();
        }
    }

    match state.jobs.find_job_for_user(user.id, job_id).await {
        Ok(Some(_)) => {
            JsonResponse::conflict("Only pending jobs can be cancelled").into_response()
        }
        Ok(None) => JsonResponse::not_found("Job not found").into_response(),
        Err(err) => {
            error!(?err, %job_id, "failed to load job");
            JsonResponse::server_error("Failed to cancel job").into_response()
        }
    }
}
