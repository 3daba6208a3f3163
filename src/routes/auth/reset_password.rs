use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::password::hash_password;
use crate::utils::validation::{is_valid_password, PASSWORD_POLICY_MESSAGE};

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

pub async fn handle_reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Response {
    if !is_valid_password(&payload.password) {
        return JsonResponse::bad_request(PASSWORD_POLICY_MESSAGE).into_response();
    }

    // Hash before consuming so a hashing failure does not burn the token.
    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(?err, "password hashing failed");
            return JsonResponse::server_error("Internal error").into_response();
        }
    };

    let user_id = match state
        .db
        .consume_password_reset_token(payload.token.trim(), OffsetDateTime::now_utc())
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return JsonResponse::bad_request("Invalid or expired reset token").into_response()
        }
        Err(err) => {
            error!(?err, "failed to consume reset token");
            return JsonResponse::server_error("Something went wrong").into_response();
        }
    };

    match state.db.update_user_password(user_id, &password_hash).await {
        Ok(()) => {
            info!(%user_id, "password reset");
            JsonResponse::success("Password updated successfully").into_response()
        }
        Err(err) => {
            error!(?err, %user_id, "failed to update password");
            JsonResponse::server_error("Failed to update password").into_response()
        }
    }
}
