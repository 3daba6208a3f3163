use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use serde_json::json;
use time::Duration as TimeDuration;
use tracing::{error, info};

use super::session::{AuthSession, AUTH_COOKIE};
use crate::models::user::{PublicUser, User};
use crate::responses::JsonResponse;
use crate::routes::session_user;
use crate::state::AppState;
use crate::utils::{jwt::JwtKeyProvider, password::verify_password};

const BAD_CREDENTIALS: &str = "Incorrect email or password";

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

/// Signs an access token for `user` valid for the configured TTL.
pub fn issue_token(state: &AppState, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    state.issue_access_token(user, access_token_ttl(state))
}

fn access_token_ttl(state: &AppState) -> TimeDuration {
    TimeDuration::minutes(state.config.access_token_ttl_minutes.max(1))
}

pub async fn handle_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    let user = match state.db.find_user_by_email(&email).await {
        Ok(Some(user)) if !user.is_pending_deletion() => user,
        Ok(_) => return JsonResponse::unauthorized(BAD_CREDENTIALS).into_response(),
        Err(err) => {
            error!(?err, "failed to look up user for login");
            return JsonResponse::server_error("Database error").into_response();
        }
    };

    if user.password_hash.trim().is_empty() {
        return JsonResponse::unauthorized(BAD_CREDENTIALS).into_response();
    }
    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return JsonResponse::unauthorized(BAD_CREDENTIALS).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "password verification error");
            return JsonResponse::server_error("Internal error").into_response();
        }
    }

    if !user.email_verified {
        return JsonResponse::forbidden("Please verify your email before logging in")
            .into_response();
    }

    let token = match issue_token(&state, &user) {
        Ok(token) => token,
        Err(err) => {
            error!(?err, user_id = %user.id, "token generation failed");
            return JsonResponse::server_error("Token generation failed").into_response();
        }
    };

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(access_token_ttl(&state))
        .build();

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.insert(header::SET_COOKIE, value);
        }
        Err(err) => error!(?err, "auth cookie is not a valid header value"),
    }

    info!(user_id = %user.id, "user logged in");
    (
        StatusCode::OK,
        headers,
        Json(json!({
            "access_token": token,
            "token_type": "bearer",
            "user": PublicUser::from(&user),
        })),
    )
        .into_response()
}

pub async fn handle_me(State(state): State<AppState>, session: AuthSession) -> Response {
    match session_user(&state, &session).await {
        Ok(user) => Json(PublicUser::from(&user)).into_response(),
        Err(response) => response,
    }
}
