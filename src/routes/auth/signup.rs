use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use super::verify::send_verification_code;
use crate::models::signup::SignupPayload;
use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::password::hash_password;
use crate::utils::validation::{is_valid_email, is_valid_password, PASSWORD_POLICY_MESSAGE};

pub async fn handle_signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupPayload>,
) -> Response {
    payload.email = payload.email.trim().to_lowercase();
    payload.name = payload.name.trim().to_string();

    if !is_valid_email(&payload.email) {
        return JsonResponse::bad_request("Invalid email address").into_response();
    }
    if payload.name.is_empty() {
        return JsonResponse::bad_request("Name is required").into_response();
    }
    if !is_valid_password(&payload.password) {
        return JsonResponse::bad_request(PASSWORD_POLICY_MESSAGE).into_response();
    }

    match state.db.is_email_taken(&payload.email).await {
        Ok(false) => {}
        Ok(true) => return JsonResponse::bad_request("Email already registered").into_response(),
        Err(err) => {
            error!(?err, "failed to check email availability");
            return JsonResponse::server_error("Database error").into_response();
        }
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(?err, "password hashing failed");
            return JsonResponse::server_error("Internal error").into_response();
        }
    };

    let user = match state.db.create_user(&payload, &password_hash).await {
        Ok(user) => user,
        Err(err) => {
            error!(?err, "failed to create user");
            return JsonResponse::server_error("Could not create user").into_response();
        }
    };
    info!(user_id = %user.id, "user signed up");

    if let Err(response) = send_verification_code(&state, &user.email).await {
        return response;
    }

    JsonResponse::success(
        "User created successfully. Please check your email for verification code.",
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{Method, StatusCode},
        routing::post,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::handle_signup;
    use crate::db::mock_db::MockDb;
    use crate::routes::test_helpers::{body_json, json_request};
    use crate::services::smtp_mailer::MockMailer;
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        Router::new()
            .route("/signup", post(handle_signup))
            .with_state(app.state.clone())
    }

    fn signup_body(email: &str, password: &str) -> serde_json::Value {
        json!({ "email": email, "password": password, "name": "Jane Doe" })
    }

    #[tokio::test]
    async fn signup_creates_unverified_user_and_mails_a_code() {
        let app = TestApp::new();
        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/signup",
                None,
                signup_body("  Jane@Example.com ", "abcdefg1"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["success"], true);

        let sent = app.mailer.sent_verification_codes.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "jane@example.com");
        assert_eq!(sent[0].1.len(), 6);
        assert_eq!(
            app.db.latest_verification_code("jane@example.com"),
            Some(sent[0].1.clone())
        );
    }

    #[tokio::test]
    async fn weak_password_is_rejected_before_any_write() {
        let app = TestApp::new();
        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/signup",
                None,
                signup_body("jane@example.com", "password"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(
            body["message"],
            "Password must be at least 8 characters long and contain letters and numbers"
        );
        assert!(app.mailer.sent_verification_codes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let app = TestApp::new();
        app.db.seed_user("jane@example.com");

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/signup",
                None,
                signup_body("JANE@example.com", "abcdefg1"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Email already registered");
    }

    #[tokio::test]
    async fn mail_failure_is_a_server_error() {
        let app = TestApp::with_mailer(MockMailer {
            fail_send: true,
            ..Default::default()
        });
        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/signup",
                None,
                signup_body("jane@example.com", "abcdefg1"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn store_failure_is_a_server_error() {
        let app = TestApp::with_db(MockDb::failing());
        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/signup",
                None,
                signup_body("jane@example.com", "abcdefg1"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
