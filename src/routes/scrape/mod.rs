pub mod generate;
pub mod jobs;
pub mod messages;

pub use generate::{generate_message, queue_generation};
pub use jobs::{cancel_job, get_job, list_project_jobs};
pub use messages::{
    delete_message, get_message, list_project_messages, list_user_messages, update_message,
};

use axum::response::{IntoResponse, Response};
use tracing::error;
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::state::AppState;

pub const INSUFFICIENT_ALLOWANCE_CODE: &str = "insufficient_allowance";

fn insufficient_allowance(has_subscription: bool) -> Response {
    let message = if has_subscription {
        "You have used all messages included in your subscription this month. Your allowance renews with your next billing period, or you can purchase additional credits."
    } else {
        "You have no messages left. Purchase credits or subscribe to a plan to keep generating messages."
    };
    JsonResponse::payment_required(message, INSUFFICIENT_ALLOWANCE_CODE).into_response()
}

/// 402 unless the caller has at least one unit left. Mutates nothing.
pub(crate) async fn require_allowance(state: &AppState, user_id: Uuid) -> Result<(), Response> {
    match state.allowance.remaining(user_id).await {
        Ok(allowance) if allowance.total_remaining > 0 => Ok(()),
        Ok(allowance) => Err(insufficient_allowance(allowance.has_subscription)),
        Err(err) => {
            error!(?err, %user_id, "failed to read allowance");
            Err(JsonResponse::server_error("Failed to check allowance").into_response())
        }
    }
}

/// 402 for a consume that lost the race for the last unit.
pub(crate) async fn allowance_exhausted(state: &AppState, user_id: Uuid) -> Response {
    let has_subscription = state
        .allowance
        .remaining(user_id)
        .await
        .map(|allowance| allowance.has_subscription)
        .unwrap_or(false);
    insufficient_allowance(has_subscription)
}
