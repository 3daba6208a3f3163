use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: String,
    pub success: bool,
    pub message: String,
    pub code: Option<String>,
}

fn error_body(status: StatusCode, msg: &str, code: Option<&str>) -> (StatusCode, Json<JsonResponse>) {
    (
        status,
        Json(JsonResponse {
            status: "error".to_string(),
            success: false,
            message: msg.to_string(),
            code: code.map(str::to_string),
        }),
    )
}

impl JsonResponse {
    pub fn success(msg: &str) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(JsonResponse {
                status: "success".to_string(),
                success: true,
                message: msg.to_string(),
                code: None,
            }),
        )
    }

    pub fn not_found(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::NOT_FOUND, msg, None)
    }

    pub fn conflict(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::CONFLICT, msg, None)
    }

    pub fn server_error(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::INTERNAL_SERVER_ERROR, msg, None)
    }

    pub fn unauthorized(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::UNAUTHORIZED, msg, None)
    }

    pub fn bad_request(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::BAD_REQUEST, msg, None)
    }

    pub fn forbidden(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::FORBIDDEN, msg, None)
    }

    /// 402 carrying a machine-readable `code` next to the human message.
    pub fn payment_required(msg: &str, code: &str) -> impl IntoResponse {
        error_body(StatusCode::PAYMENT_REQUIRED, msg, Some(code))
    }

    pub fn too_many_requests(msg: &str) -> impl IntoResponse {
        error_body(StatusCode::TOO_MANY_REQUESTS, msg, None)
    }
}
