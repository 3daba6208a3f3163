use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::auth::session::AuthSession;
use super::session_user;
use crate::responses::JsonResponse;
use crate::services::billing::{self, BillingError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan_id: String,
}

#[derive(Deserialize, Default)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub immediately: bool,
}

fn billing_error_response(err: BillingError) -> Response {
    match err {
        BillingError::UnknownPlan | BillingError::NotPurchasable => {
            JsonResponse::bad_request(&err.to_string()).into_response()
        }
        BillingError::SubscriptionActive => JsonResponse::conflict(&err.to_string()).into_response(),
        BillingError::NoSubscription => JsonResponse::not_found(&err.to_string()).into_response(),
        BillingError::InvalidSignature(source) => {
            warn!(?source, "stripe webhook verification failed");
            JsonResponse::bad_request("Invalid webhook signature").into_response()
        }
        BillingError::Stripe(source) => {
            error!(?source, "payment provider call failed");
            JsonResponse::server_error("Payment provider error").into_response()
        }
        BillingError::Store(source) => {
            error!(?source, "billing store error");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}

pub async fn list_plans(State(state): State<AppState>) -> Response {
    Json(state.plans.plans()).into_response()
}

pub async fn create_checkout(
    State(state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<CreateCheckoutRequest>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match billing::create_checkout(&state, &user, payload.plan_id.trim()).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => billing_error_response(err),
    }
}

pub async fn get_credits(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.allowance.balance(user.id).await {
        Ok(balance) => Json(balance).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to load credit balance");
            JsonResponse::server_error("Failed to load credits").into_response()
        }
    }
}

pub async fn get_allowance(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.allowance.remaining(user.id).await {
        Ok(allowance) => Json(allowance).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to load allowance");
            JsonResponse::server_error("Failed to load allowance").into_response()
        }
    }
}

/// Stripe calls this unauthenticated; the signature is the authentication.
/// Replays answer 200 so Stripe stops retrying.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    match billing::handle_webhook(&state, &body, sig).await {
        Ok(_) => Json(json!({ "received": true })).into_response(),
        Err(err) => billing_error_response(err),
    }
}

pub async fn payment_history(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.payments.list_transactions(user.id).await {
        Ok(transactions) => Json(transactions).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to load payment history");
            JsonResponse::server_error("Failed to load payment history").into_response()
        }
    }
}

pub async fn get_subscription(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.ledger.current_subscription(user.id).await {
        Ok(subscription) => Json(json!({ "subscription": subscription })).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "failed to load subscription");
            JsonResponse::server_error("Failed to load subscription").into_response()
        }
    }
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<CancelSubscriptionRequest>,
) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match billing::cancel_subscription(&state, user.id, payload.immediately).await {
        Ok(subscription) => Json(json!({ "subscription": subscription })).into_response(),
        Err(err) => billing_error_response(err),
    }
}

pub async fn refresh_subscription(State(state): State<AppState>, session: AuthSession) -> Response {
    let user = match session_user(&state, &session).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match billing::refresh_subscription(&state, user.id).await {
        Ok(subscription) => Json(json!({ "subscription": subscription })).into_response(),
        Err(err) => billing_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::models::payment::TransactionStatus;
    use crate::routes::test_helpers::{body_json, empty_request, json_request};
    use crate::services::stripe::{CheckoutSessionInfo, MOCK_SIGNATURE};
    use crate::state::test_support::TestApp;

    fn router(app: &TestApp) -> Router {
        Router::new()
            .route("/plans", get(list_plans))
            .route("/create-checkout", post(create_checkout))
            .route("/credits", get(get_credits))
            .route("/allowance", get(get_allowance))
            .route("/webhook", post(stripe_webhook))
            .route("/history", get(payment_history))
            .route("/subscription", get(get_subscription))
            .route("/subscription/cancel", post(cancel_subscription))
            .with_state(app.state.clone())
    }

    fn webhook(signature: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::post("/webhook");
        if let Some(signature) = signature {
            builder = builder.header("Stripe-Signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn plans_are_public_and_hide_price_ids() {
        let app = TestApp::new();
        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/plans", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let plans = body_json(res).await;
        assert_eq!(plans.as_array().unwrap().len(), 6);
        assert!(plans[0].get("price_id").is_none());
    }

    #[tokio::test]
    async fn paid_checkout_credits_the_account_once() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/create-checkout",
                Some(&token),
                json!({ "plan_id": "credits_100" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let session_id = body_json(res).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(app.db.transactions()[0].status, TransactionStatus::Pending);

        app.stripe.put_session(CheckoutSessionInfo {
            id: session_id.clone(),
            payment_status: "paid".into(),
            subscription_id: None,
            metadata: BTreeMap::new(),
        });
        let event = json!({
            "id": "evt_paid",
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id, "payment_status": "paid" } }
        });

        for _ in 0..2 {
            let res = router(&app)
                .oneshot(webhook(Some(MOCK_SIGNATURE), event.clone()))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/credits", Some(&token)))
            .await
            .unwrap();
        let credits = body_json(res).await;
        assert_eq!(credits["credits"], 100);
        assert_eq!(credits["total_earned"], 100);

        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/history", Some(&token)))
            .await
            .unwrap();
        assert_eq!(body_json(res).await[0]["status"], "completed");
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_plans_and_second_subscriptions() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/create-checkout",
                Some(&token),
                json!({ "plan_id": "plan_99" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Invalid plan_id");

        app.db.seed_subscription(user.id, "plan_1", 100, 0);
        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/create-checkout",
                Some(&token),
                json!({ "plan_id": "plan_2" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert!(app.db.transactions().is_empty());
    }

    #[tokio::test]
    async fn webhook_requires_a_valid_signature() {
        let app = TestApp::new();
        let body = json!({ "id": "evt_1", "type": "customer.created", "data": { "object": {} } });

        let res = router(&app).oneshot(webhook(None, body.clone())).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = router(&app)
            .oneshot(webhook(Some("t=1,v1=forged"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn allowance_reports_both_sources() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        app.db.seed_subscription(user.id, "plan_1", 100, 40);
        app.state.allowance.add_credits(user.id, 5).await.unwrap();
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/allowance", Some(&token)))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["subscription_remaining"], 60);
        assert_eq!(body["credits_remaining"], 5);
        assert_eq!(body["total_remaining"], 65);
        assert_eq!(body["has_subscription"], true);

        let res = router(&app)
            .oneshot(empty_request(Method::GET, "/subscription", Some(&token)))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["subscription"]["plan_id"], "plan_1");
    }

    #[tokio::test]
    async fn cancelling_without_a_subscription_is_not_found() {
        let app = TestApp::new();
        let user = app.db.seed_user("jane@example.com");
        let token = app.token_for(&user);

        let res = router(&app)
            .oneshot(json_request(
                Method::POST,
                "/subscription/cancel",
                Some(&token),
                json!({ "immediately": true }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
