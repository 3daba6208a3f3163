use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tracing::{error, info};

use super::logout::clear_auth_cookie;
use super::session::AuthSession;
use crate::responses::JsonResponse;
use crate::routes::session_user;
use crate::state::AppState;

/// Soft-deletes the caller. The background purge removes the data once the
/// retention window has passed.
pub async fn handle_delete_account(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let now = OffsetDateTime::now_utc();
    match state.db.mark_account_for_deletion(user.id, now).await {
        Ok(true) => {}
        Ok(false) => return JsonResponse::not_found("User not found").into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to mark account for deletion");
            return JsonResponse::server_error("An error occurred while deleting your account")
                .into_response();
        }
    }

    let retention_days = state.config.account_retention_days;
    let deletion_date = (now + Duration::days(retention_days))
        .format(&Rfc3339)
        .unwrap_or_default();
    info!(user_id = %user.id, %deletion_date, "account marked for deletion");

    (
        StatusCode::OK,
        clear_auth_cookie(),
        Json(json!({
            "success": true,
            "message": format!(
                "Account marked for deletion. Your data will be permanently removed in {retention_days} days."
            ),
            "deletion_date": deletion_date,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{Method, StatusCode},
        routing::delete,
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_helpers::{body_json, empty_request};
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        Router::new()
            .route("/delete-account", delete(handle_delete_account))
            .with_state(app.state.clone())
    }

    #[tokio::test]
    async fn delete_marks_account_and_blocks_further_use() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(empty_request(Method::DELETE, "/delete-account", Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get("set-cookie").is_some());
        let body = body_json(res).await;
        assert_eq!(
            body["message"],
            "Account marked for deletion. Your data will be permanently removed in 30 days."
        );
        assert!(app.db.user(user.id).unwrap().is_pending_deletion());

        let res = router(&app)
            .oneshot(empty_request(Method::DELETE, "/delete-account", Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
