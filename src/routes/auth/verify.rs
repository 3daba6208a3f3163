use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

use crate::models::user::User;
use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::validation::generate_verification_code;

pub const VERIFICATION_CODE_TTL: Duration = Duration::minutes(15);

#[derive(Deserialize)]
pub struct VerifyEmailPayload {
    email: String,
    code: String,
}

#[derive(Deserialize)]
pub struct ResendVerificationPayload {
    email: String,
}

/// Replaces any outstanding code for `email` and mails the new one.
pub(crate) async fn send_verification_code(state: &AppState, email: &str) -> Result<(), Response> {
    let code = generate_verification_code();
    let expires_at = OffsetDateTime::now_utc() + VERIFICATION_CODE_TTL;

    if let Err(err) = state
        .db
        .replace_verification_code(email, &code, expires_at)
        .await
    {
        error!(?err, "failed to store verification code");
        return Err(JsonResponse::server_error("Database error").into_response());
    }

    if let Err(err) = state.mailer.send_verification_code(email, &code).await {
        error!(?err, "failed to send verification email");
        return Err(JsonResponse::server_error(
            "Failed to send verification email. Please try again.",
        )
        .into_response());
    }
    Ok(())
}

async fn find_by_email(state: &AppState, email: &str) -> Result<User, Response> {
    match state.db.find_user_by_email(email).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(JsonResponse::not_found("User not found").into_response()),
        Err(err) => {
            error!(?err, "failed to look up user by email");
            Err(JsonResponse::server_error("Database error").into_response())
        }
    }
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailPayload>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    let user = match find_by_email(&state, &email).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    if user.email_verified {
        return JsonResponse::success("Email already verified").into_response();
    }

    let now = OffsetDateTime::now_utc();
    match state
        .db
        .consume_verification_code(&email, payload.code.trim(), now)
        .await
    {
        Ok(true) => {
            if let Err(err) = state.db.set_user_verified(user.id).await {
                error!(?err, user_id = %user.id, "failed to mark user verified");
                return JsonResponse::server_error("Failed to update user").into_response();
            }
            info!(user_id = %user.id, "email verified");
            JsonResponse::success("Email verified successfully. You can now login.")
                .into_response()
        }
        Ok(false) => {
            JsonResponse::bad_request("Invalid or expired verification code").into_response()
        }
        Err(err) => {
            error!(?err, "failed to consume verification code");
            JsonResponse::server_error("Something went wrong").into_response()
        }
    }
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationPayload>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    let user = match find_by_email(&state, &email).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    if user.email_verified {
        return JsonResponse::success("Email already verified").into_response();
    }

    match send_verification_code(&state, &user.email).await {
        Ok(()) => JsonResponse::success("Verification code sent successfully").into_response(),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{Method, StatusCode},
        routing::post,
        Router,
    };
    use serde_json::json;
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::routes::test_helpers::{body_json, json_request};
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        Router::new()
            .route("/verify-email", post(verify_email))
            .route("/resend-verification", post(resend_verification))
            .with_state(app.state.clone())
    }

    fn unverified(app: &TestApp, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: String::new(),
            name: "Jane Doe".into(),
            email_verified: false,
            created_at: OffsetDateTime::now_utc(),
            deletion_requested_at: None,
        };
        app.db.insert_user(user.clone());
        user
    }

    #[tokio::test]
    async fn correct_code_verifies_once() {
        let app = TestApp::new();
        let user = unverified(&app, "jane@example.com");
        send_verification_code(&app.state, &user.email).await.unwrap();
        let code = app.db.latest_verification_code(&user.email).unwrap();

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/verify-email",
                None,
                json!({ "email": "Jane@example.com", "code": code }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(app.db.user(user.id).unwrap().email_verified);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/verify-email",
                None,
                json!({ "email": "jane@example.com", "code": code }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["message"], "Email already verified");
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let app = TestApp::new();
        let user = unverified(&app, "jane@example.com");
        send_verification_code(&app.state, &user.email).await.unwrap();

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/verify-email",
                None,
                json!({ "email": "jane@example.com", "code": "not-a-code" }),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(!app.db.user(user.id).unwrap().email_verified);
    }

    #[tokio::test]
    async fn resend_replaces_the_previous_code() {
        let app = TestApp::new();
        let user = unverified(&app, "jane@example.com");
        send_verification_code(&app.state, &user.email).await.unwrap();

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/resend-verification",
                None,
                json!({ "email": "jane@example.com" }),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let sent = app.mailer.sent_verification_codes.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            app.db.latest_verification_code(&user.email),
            Some(sent[1].1.clone())
        );
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let app = TestApp::new();
        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/resend-verification",
                None,
                json!({ "email": "ghost@example.com" }),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
