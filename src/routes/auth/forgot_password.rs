use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

use crate::{responses::JsonResponse, state::AppState, utils::validation::generate_reset_token};

pub const RESET_TOKEN_TTL: Duration = Duration::hours(24);

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Always answers the same way so the endpoint cannot be used to probe accounts.
pub async fn handle_forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Response {
    let email = payload.email.trim().to_lowercase();

    match state.db.find_user_by_email(&email).await {
        Ok(Some(user)) if !user.is_pending_deletion() => {
            let token = generate_reset_token();
            let expiry = OffsetDateTime::now_utc() + RESET_TOKEN_TTL;

            if let Err(err) = state
                .db
                .insert_password_reset_token(user.id, &token, expiry)
                .await
            {
                error!(?err, user_id = %user.id, "failed to insert password reset token");
            } else if let Err(err) = state.mailer.send_reset_email(&user.email, &token).await {
                error!(?err, user_id = %user.id, "failed to send reset email");
            } else {
                info!(user_id = %user.id, "password reset requested");
            }
        }
        Ok(_) => {}
        Err(err) => error!(?err, "error looking up user by email"),
    }

    JsonResponse::success("If that email exists, a reset link has been sent.").into_response()
}
