pub mod auth;
pub mod payments;
pub mod projects;
pub mod scrape;

use axum::{
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use crate::models::user::User;
use crate::responses::JsonResponse;
use crate::state::AppState;
use auth::session::AuthSession;

/// Loads the caller behind a session. Accounts pending deletion count as gone.
pub(crate) async fn session_user(state: &AppState, session: &AuthSession) -> Result<User, Response> {
    let user_id = session.user_id();

    match state.db.find_user_by_id(user_id).await {
        Ok(Some(user)) if !user.is_pending_deletion() => Ok(user),
        Ok(_) => Err(JsonResponse::unauthorized("User not found").into_response()),
        Err(err) => {
            error!(?err, %user_id, "failed to load session user");
            Err(JsonResponse::server_error("Database error").into_response())
        }
    }
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::handle_signup))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/login", post(auth::handle_login))
        .route("/logout", post(auth::handle_logout))
        .route("/me", get(auth::handle_me))
        .route("/forgot-password", post(auth::handle_forgot_password))
        .route("/reset-password", post(auth::handle_reset_password))
        .route("/delete-account", delete(auth::handle_delete_account))
}

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/{project_id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/{project_id}/export", get(projects::export_messages))
}

pub fn scrape_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{project_id}/generate",
            post(scrape::generate_message),
        )
        .route("/projects/{project_id}/queue", post(scrape::queue_generation))
        .route("/projects/{project_id}/jobs", get(scrape::list_project_jobs))
        .route(
            "/jobs/{job_id}",
            get(scrape::get_job).delete(scrape::cancel_job),
        )
        .route(
            "/projects/{project_id}/messages",
            get(scrape::list_project_messages),
        )
        .route(
            "/projects/{project_id}/messages/{message_id}",
            get(scrape::get_message)
                .put(scrape::update_message)
                .delete(scrape::delete_message),
        )
        .route("/messages", get(scrape::list_user_messages))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/plans", get(payments::list_plans))
        .route("/create-checkout", post(payments::create_checkout))
        .route("/credits", get(payments::get_credits))
        .route("/allowance", get(payments::get_allowance))
        .route("/webhook", post(payments::stripe_webhook))
        .route("/history", get(payments::payment_history))
        .route("/subscription", get(payments::get_subscription))
        .route("/subscription/cancel", post(payments::cancel_subscription))
        .route("/subscription/refresh", post(payments::refresh_subscription))
}

/// Full API surface. `auth` is passed in so the caller can put a stricter
/// rate limiter on it.
pub fn app_router(auth: Router<AppState>) -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/auth", auth)
        .nest("/projects", project_routes())
        .nest("/scrape", scrape_routes())
        .nest("/payments", payment_routes())
}

async fn root() -> Response {
    JsonResponse::success("DMify API is running").into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "healthy" })).into_response()
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
        response::Response,
    };
    use serde_json::Value;

    pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use super::test_helpers::{body_json, empty_request, json_request};
    use super::*;
    use crate::services::stripe::MOCK_SIGNATURE;
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        app_router(auth_routes()).with_state(app.state.clone())
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();
        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "healthy");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = TestApp::new();
        for uri in ["/projects", "/scrape/messages", "/payments/credits", "/auth/me"] {
            let res = router(&app)
                .oneshot(empty_request(Method::GET, uri, None))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn queue_without_allowance_is_rejected_before_any_mutation() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let project = app.db.seed_project(user.id);
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                &format!("/scrape/projects/{}/queue", project.id),
                Some(&token),
                json!({ "username": "candle_lover" }),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body_json(res).await["code"], "insufficient_allowance");
        assert!(app.db.jobs().is_empty());
        assert!(app.db.messages().is_empty());
        assert_eq!(app.db.balance(user.id).credits, 0);
        assert!(app.scraper.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_project_removes_its_messages() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let project = app.db.seed_project(user.id);
        app.state.allowance.add_credits(user.id, 3).await.unwrap();
        let token = app.token_for(&user);

        for name in ["one", "two", "three"] {
            let res = router(&app)
                .oneshot(json_request(
                    Method::POST,
                    &format!("/scrape/projects/{}/generate", project.id),
                    Some(&token),
                    json!({ "username": name }),
                ))
                .await
                .unwrap();
            assert_eq!(body_json(res).await["success"], true);
        }
        assert_eq!(app.db.messages().len(), 3);

        let res = router(&app)
            .oneshot(empty_request(
                Method::DELETE,
                &format!("/projects/{}", project.id),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(app.db.messages().is_empty());

        let res = router(&app)
            .oneshot(empty_request(
                Method::GET,
                &format!("/projects/{}", project.id),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_a_bad_request() {
        let app = TestApp::new();
        let payload = json!({ "id": "evt_1", "type": "checkout.session.completed", "data": { "object": {} } });

        let res = router(&app)
            .oneshot(
                axum::http::Request::post("/payments/webhook")
                    .header("stripe-signature", "t=1,v1=forged")
                    .body(axum::body::Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = router(&app)
            .oneshot(
                axum::http::Request::post("/payments/webhook")
                    .header("stripe-signature", MOCK_SIGNATURE)
                    .body(axum::body::Body::from(
                        json!({ "id": "evt_2", "type": "customer.created", "data": { "object": {} } })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["received"], true);
    }
}
