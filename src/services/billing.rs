use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::payment::{NewPaymentTransaction, PaymentTransaction, TransactionStatus};
use crate::models::plan::{Plan, PlanCatalog, PlanKind};
use crate::models::subscription::{Subscription, SubscriptionStatus, SubscriptionSync};
use crate::models::user::User;
use crate::services::stripe::{
    CheckoutLineItem, CheckoutMode, CheckoutSessionInfo, CreateCheckoutSessionRequest,
    InvoiceInfo, StripeEvent, StripeServiceError, SubscriptionInfo,
};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid plan_id")]
    UnknownPlan,
    #[error("This plan is not available for purchase")]
    NotPurchasable,
    #[error("You already have an active subscription")]
    SubscriptionActive,
    #[error("No active subscription")]
    NoSubscription,
    #[error("Invalid webhook signature")]
    InvalidSignature(#[source] StripeServiceError),
    #[error("payment provider error: {0}")]
    Stripe(#[from] StripeServiceError),
    #[error("billing store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub session_id: String,
    pub checkout_url: Option<String>,
    pub plan: Plan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// The event, or the payment it refers to, was handled before.
    Duplicate,
    Ignored,
}

/// Opens a Stripe checkout for `plan_id` and records a pending transaction for it.
pub async fn create_checkout(
    state: &AppState,
    user: &User,
    plan_id: &str,
) -> Result<CheckoutOutcome, BillingError> {
    let plan = state.plans.find(plan_id).ok_or(BillingError::UnknownPlan)?;
    let price_id = plan
        .price_id
        .clone()
        .filter(|_| plan.is_purchasable())
        .ok_or(BillingError::NotPurchasable)?;

    if plan.kind == PlanKind::Subscription
        && state.ledger.current_subscription(user.id).await?.is_some()
    {
        return Err(BillingError::SubscriptionActive);
    }

    let origin = state.config.frontend_origin.trim_end_matches('/');
    let metadata: BTreeMap<String, String> = [
        ("user_id".to_string(), user.id.to_string()),
        ("plan_id".to_string(), plan.plan_id.clone()),
    ]
    .into_iter()
    .collect();

    let session = state
        .stripe
        .create_checkout_session(CreateCheckoutSessionRequest {
            success_url: format!(
                "{origin}/app/dashboard?payment=success&session_id={{CHECKOUT_SESSION_ID}}"
            ),
            cancel_url: format!("{origin}/app/dashboard?payment=cancelled"),
            mode: match plan.kind {
                PlanKind::OneTime => CheckoutMode::Payment,
                PlanKind::Subscription => CheckoutMode::Subscription,
            },
            line_items: vec![CheckoutLineItem {
                price: price_id,
                quantity: 1,
            }],
            client_reference_id: Some(user.id.to_string()),
            customer_email: Some(user.email.clone()),
            allow_promotion_codes: true,
            metadata,
        })
        .await?;

    state
        .payments
        .create_transaction(&NewPaymentTransaction {
            user_id: user.id,
            external_session_id: session.id.clone(),
            plan_id: plan.plan_id.clone(),
            amount: plan.amount,
            quantity: plan.quantity,
            transaction_type: plan.kind.transaction_type(),
        })
        .await?;

    info!(user_id = %user.id, plan_id = %plan.plan_id, session_id = %session.id, "checkout session created");

    Ok(CheckoutOutcome {
        session_id: session.id,
        checkout_url: session.url,
        plan: plan.clone(),
    })
}

/// Verifies and applies one Stripe webhook delivery.
///
/// The event id is recorded only after a successful apply, so a delivery
/// that errors is retried by Stripe.
pub async fn handle_webhook(
    state: &AppState,
    payload: &[u8],
    signature: &str,
) -> Result<WebhookOutcome, BillingError> {
    let event = state
        .stripe
        .verify_webhook(payload, signature)
        .map_err(BillingError::InvalidSignature)?;

    if state.stripe_events.has_processed_event(&event.id).await? {
        info!(event_id = %event.id, event_type = %event.r#type, "stripe event already processed");
        return Ok(WebhookOutcome::Duplicate);
    }

    let outcome = dispatch(state, &event).await?;

    if let Err(err) = state.stripe_events.record_event(&event.id).await {
        error!(?err, event_id = %event.id, "failed to record processed stripe event");
    }
    info!(event_id = %event.id, event_type = %event.r#type, ?outcome, "stripe event handled");
    Ok(outcome)
}

async fn dispatch(state: &AppState, event: &StripeEvent) -> Result<WebhookOutcome, BillingError> {
    let object = event.object();
    match event.r#type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let session = CheckoutSessionInfo::from_value(object)?;
            complete_checkout(state, &session.id).await
        }
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            let session = CheckoutSessionInfo::from_value(object)?;
            if state.payments.mark_transaction_failed(&session.id).await? {
                info!(session_id = %session.id, "checkout session marked failed");
                Ok(WebhookOutcome::Applied)
            } else {
                Ok(WebhookOutcome::Ignored)
            }
        }
        "invoice.payment_succeeded" => {
            let invoice = InvoiceInfo::from_value(object);
            match (invoice.billing_reason.as_deref(), invoice.subscription_id) {
                (Some("subscription_cycle"), Some(subscription_id)) => {
                    renew_subscription(state, &subscription_id).await
                }
                _ => Ok(WebhookOutcome::Ignored),
            }
        }
        "invoice.payment_failed" => match InvoiceInfo::from_value(object).subscription_id {
            Some(subscription_id) => {
                let info = state.stripe.retrieve_subscription(&subscription_id).await?;
                mirror_subscription(state, &info).await
            }
            None => Ok(WebhookOutcome::Ignored),
        },
        "customer.subscription.updated" => {
            let info = SubscriptionInfo::from_value(object)?;
            mirror_subscription(state, &info).await
        }
        "customer.subscription.deleted" => {
            let info = SubscriptionInfo::from_value(object)?;
            let updated = state
                .ledger
                .set_subscription_status(&info.id, SubscriptionStatus::Canceled, false)
                .await?;
            Ok(if updated.is_some() {
                WebhookOutcome::Applied
            } else {
                WebhookOutcome::Ignored
            })
        }
        other => {
            info!(event_type = other, "ignoring unhandled stripe event");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

/// Grants a paid checkout exactly once.
async fn complete_checkout(
    state: &AppState,
    session_id: &str,
) -> Result<WebhookOutcome, BillingError> {
    let Some(transaction) = state.payments.find_transaction_by_session(session_id).await? else {
        warn!(%session_id, "no transaction recorded for checkout session");
        return Ok(WebhookOutcome::Ignored);
    };
    match transaction.status {
        TransactionStatus::Completed => {
            info!(%session_id, "payment already processed");
            return Ok(WebhookOutcome::Duplicate);
        }
        TransactionStatus::Failed => {
            warn!(%session_id, "checkout completed for a failed transaction");
            return Ok(WebhookOutcome::Ignored);
        }
        TransactionStatus::Pending => {}
    }

    let session = state.stripe.retrieve_checkout_session(session_id).await?;
    if !session.is_paid() {
        info!(%session_id, payment_status = %session.payment_status, "checkout not paid yet");
        return Ok(WebhookOutcome::Ignored);
    }

    let Some(transaction) = state.payments.claim_transaction(session_id).await? else {
        return Ok(WebhookOutcome::Duplicate);
    };

    if let Err(err) = apply_purchase(state, &transaction, &session).await {
        error!(?err, %session_id, "failed to apply purchase, reverting claim");
        if let Err(revert_err) = state.payments.revert_transaction(session_id).await {
            error!(?revert_err, %session_id, "failed to revert transaction claim");
        }
        return Err(err);
    }
    Ok(WebhookOutcome::Applied)
}

async fn apply_purchase(
    state: &AppState,
    transaction: &PaymentTransaction,
    session: &CheckoutSessionInfo,
) -> Result<(), BillingError> {
    match state.plans.find(&transaction.plan_id).map(|p| p.kind) {
        Some(PlanKind::OneTime) => {
            let balance = state
                .allowance
                .add_credits(transaction.user_id, transaction.quantity)
                .await?;
            info!(
                user_id = %transaction.user_id,
                added = transaction.quantity,
                credits = balance.credits,
                "credits purchased"
            );
            Ok(())
        }
        Some(PlanKind::Subscription) => {
            let subscription_id = session.subscription_id.as_deref().ok_or_else(|| {
                StripeServiceError::NotFound(format!(
                    "checkout session {} has no subscription",
                    session.id
                ))
            })?;
            let info = state.stripe.retrieve_subscription(subscription_id).await?;
            let sync = subscription_sync(
                &state.plans,
                transaction.user_id,
                &info,
                Some(&transaction.plan_id),
            )?;
            let subscription = state.ledger.upsert_subscription(&sync).await?;
            info!(
                user_id = %transaction.user_id,
                plan_id = %subscription.plan_id,
                "subscription started"
            );
            Ok(())
        }
        None => Err(BillingError::UnknownPlan),
    }
}

async fn renew_subscription(
    state: &AppState,
    subscription_id: &str,
) -> Result<WebhookOutcome, BillingError> {
    let info = state.stripe.retrieve_subscription(subscription_id).await?;
    let renewed = state
        .ledger
        .reset_subscription_usage(
            subscription_id,
            from_unix(info.current_period_start),
            from_unix(info.current_period_end),
        )
        .await?;

    match renewed {
        Some(subscription) => {
            state
                .ledger
                .set_subscription_status(
                    subscription_id,
                    SubscriptionStatus::from_provider(&info.status),
                    info.cancel_at_period_end,
                )
                .await?;
            info!(user_id = %subscription.user_id, %subscription_id, "subscription allowance renewed");
            Ok(WebhookOutcome::Applied)
        }
        None => {
            warn!(%subscription_id, "renewal for unknown subscription");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

/// Copies status, period and cancellation flag from Stripe onto the local row.
async fn mirror_subscription(
    state: &AppState,
    info: &SubscriptionInfo,
) -> Result<WebhookOutcome, BillingError> {
    Ok(match sync_local(state, info).await? {
        Some(_) => WebhookOutcome::Applied,
        None => WebhookOutcome::Ignored,
    })
}

async fn sync_local(
    state: &AppState,
    info: &SubscriptionInfo,
) -> Result<Option<Subscription>, BillingError> {
    let existing = state.ledger.find_subscription_by_external_id(&info.id).await?;
    let user_id = existing.as_ref().map(|s| s.user_id).or_else(|| {
        info.metadata
            .get("user_id")
            .and_then(|id| Uuid::parse_str(id).ok())
    });
    let Some(user_id) = user_id else {
        warn!(subscription_id = %info.id, "cannot resolve user for subscription");
        return Ok(None);
    };

    let sync = subscription_sync(
        &state.plans,
        user_id,
        info,
        existing.as_ref().map(|s| s.plan_id.as_str()),
    )?;
    Ok(Some(state.ledger.upsert_subscription(&sync).await?))
}

fn subscription_sync(
    plans: &PlanCatalog,
    user_id: Uuid,
    info: &SubscriptionInfo,
    fallback_plan_id: Option<&str>,
) -> Result<SubscriptionSync, BillingError> {
    let plan = info
        .price_id
        .as_deref()
        .and_then(|price| plans.find_by_price_id(price))
        .or_else(|| info.metadata.get("plan_id").and_then(|id| plans.find(id)))
        .or_else(|| fallback_plan_id.and_then(|id| plans.find(id)))
        .filter(|plan| plan.kind == PlanKind::Subscription)
        .ok_or(BillingError::UnknownPlan)?;

    Ok(SubscriptionSync {
        user_id,
        external_subscription_id: info.id.clone(),
        plan_id: plan.plan_id.clone(),
        status: SubscriptionStatus::from_provider(&info.status),
        monthly_allowance: plan.quantity,
        period_start: from_unix(info.current_period_start),
        period_end: from_unix(info.current_period_end),
        cancel_at_period_end: info.cancel_at_period_end,
    })
}

fn from_unix(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(seconds).unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Cancels the caller's current subscription, at period end unless `immediately`.
pub async fn cancel_subscription(
    state: &AppState,
    user_id: Uuid,
    immediately: bool,
) -> Result<Subscription, BillingError> {
    let current = state
        .ledger
        .current_subscription(user_id)
        .await?
        .ok_or(BillingError::NoSubscription)?;
    let external_id = current.external_subscription_id.as_str();

    let (status, cancel_at_period_end) = if immediately {
        state.stripe.cancel_subscription_immediately(external_id).await?;
        (SubscriptionStatus::Canceled, false)
    } else {
        let info = state
            .stripe
            .set_subscription_cancel_at_period_end(external_id, true)
            .await?;
        (
            SubscriptionStatus::from_provider(&info.status),
            info.cancel_at_period_end,
        )
    };

    let updated = state
        .ledger
        .set_subscription_status(external_id, status, cancel_at_period_end)
        .await?
        .ok_or(BillingError::NoSubscription)?;
    info!(%user_id, immediately, "subscription cancellation requested");
    Ok(updated)
}

/// Re-reads the caller's current subscription from Stripe.
pub async fn refresh_subscription(
    state: &AppState,
    user_id: Uuid,
) -> Result<Option<Subscription>, BillingError> {
    let Some(current) = state.ledger.current_subscription(user_id).await? else {
        return Ok(None);
    };
    let info = state
        .stripe
        .retrieve_subscription(&current.external_subscription_id)
        .await?;
    sync_local(state, &info).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stripe::MOCK_SIGNATURE;
    use crate::state::test_support::TestApp;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn event(id: &str, kind: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": id,
            "type": kind,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn mark_paid(app: &TestApp, session_id: &str, subscription_id: Option<&str>) {
        app.stripe.put_session(CheckoutSessionInfo {
            id: session_id.to_string(),
            payment_status: "paid".into(),
            subscription_id: subscription_id.map(str::to_string),
            metadata: BTreeMap::new(),
        });
    }

    fn stripe_subscription(id: &str, price_id: &str, status: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            id: id.to_string(),
            status: status.to_string(),
            price_id: Some(price_id.to_string()),
            current_period_start: 1_700_000_000,
            current_period_end: 1_702_592_000,
            cancel_at_period_end: false,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn one_time_purchase_is_credited_exactly_once() {
        let app = TestApp::new();
        let user = app.db.seed_user("buyer@example.com");
        let checkout = create_checkout(&app.state, &user, "credits_100").await.unwrap();
        assert_eq!(checkout.plan.quantity, 100);
        mark_paid(&app, &checkout.session_id, None);

        let payload = event(
            "evt_1",
            "checkout.session.completed",
            json!({ "id": checkout.session_id }),
        );
        let first = handle_webhook(&app.state, &payload, MOCK_SIGNATURE).await.unwrap();
        let replay = handle_webhook(&app.state, &payload, MOCK_SIGNATURE).await.unwrap();
        let async_duplicate = handle_webhook(
            &app.state,
            &event(
                "evt_2",
                "checkout.session.async_payment_succeeded",
                json!({ "id": checkout.session_id }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();

        assert_eq!(first, WebhookOutcome::Applied);
        assert_eq!(replay, WebhookOutcome::Duplicate);
        assert_eq!(async_duplicate, WebhookOutcome::Duplicate);
        let balance = app.db.balance(user.id);
        assert_eq!(balance.credits, 100);
        assert_eq!(balance.total_earned, 100);
        assert_eq!(
            app.db.transactions()[0].status,
            TransactionStatus::Completed
        );
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_mutation() {
        let app = TestApp::new();
        let user = app.db.seed_user("buyer@example.com");
        let checkout = create_checkout(&app.state, &user, "credits_500").await.unwrap();
        mark_paid(&app, &checkout.session_id, None);

        let payload = event(
            "evt_1",
            "checkout.session.completed",
            json!({ "id": checkout.session_id }),
        );
        let result = handle_webhook(&app.state, &payload, "t=1,v1=forged").await;

        assert!(matches!(result, Err(BillingError::InvalidSignature(_))));
        assert_eq!(app.db.balance(user.id).credits, 0);
        assert_eq!(app.db.transactions()[0].status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn unpaid_session_is_not_granted() {
        let app = TestApp::new();
        let user = app.db.seed_user("buyer@example.com");
        let checkout = create_checkout(&app.state, &user, "credits_100").await.unwrap();

        let outcome = handle_webhook(
            &app.state,
            &event(
                "evt_1",
                "checkout.session.completed",
                json!({ "id": checkout.session_id }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert_eq!(app.db.balance(user.id).credits, 0);
    }

    #[tokio::test]
    async fn failed_apply_reverts_claim_so_retry_succeeds() {
        let app = TestApp::new();
        let user = app.db.seed_user("buyer@example.com");
        let checkout = create_checkout(&app.state, &user, "credits_100").await.unwrap();
        mark_paid(&app, &checkout.session_id, None);
        let payload = event(
            "evt_1",
            "checkout.session.completed",
            json!({ "id": checkout.session_id }),
        );

        app.db.fail_add_credits.store(true, Ordering::SeqCst);
        assert!(handle_webhook(&app.state, &payload, MOCK_SIGNATURE).await.is_err());
        assert_eq!(app.db.transactions()[0].status, TransactionStatus::Pending);

        app.db.fail_add_credits.store(false, Ordering::SeqCst);
        let retry = handle_webhook(&app.state, &payload, MOCK_SIGNATURE).await.unwrap();
        assert_eq!(retry, WebhookOutcome::Applied);
        assert_eq!(app.db.balance(user.id).credits, 100);
    }

    #[tokio::test]
    async fn subscription_checkout_creates_local_subscription() {
        let app = TestApp::new();
        let user = app.db.seed_user("subscriber@example.com");
        let checkout = create_checkout(&app.state, &user, "plan_2").await.unwrap();
        let price = app.state.plans.find("plan_2").unwrap().price_id.clone().unwrap();
        app.stripe
            .put_subscription(stripe_subscription("sub_growth", &price, "active"));
        mark_paid(&app, &checkout.session_id, Some("sub_growth"));

        handle_webhook(
            &app.state,
            &event(
                "evt_1",
                "checkout.session.completed",
                json!({ "id": checkout.session_id, "subscription": "sub_growth" }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();

        let subscription = app
            .state
            .ledger
            .current_subscription(user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subscription.plan_id, "plan_2");
        assert_eq!(subscription.monthly_allowance, 500);
        assert_eq!(subscription.used_this_month, 0);

        assert!(matches!(
            create_checkout(&app.state, &user, "plan_3").await,
            Err(BillingError::SubscriptionActive)
        ));
        // Credit packs stay available to subscribers.
        assert!(create_checkout(&app.state, &user, "credits_100").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let app = TestApp::new();
        let user = app.db.seed_user("buyer@example.com");
        assert!(matches!(
            create_checkout(&app.state, &user, "plan_9").await,
            Err(BillingError::UnknownPlan)
        ));
        assert!(app.db.transactions().is_empty());
    }

    #[tokio::test]
    async fn cycle_invoice_resets_usage_and_other_invoices_do_not() {
        let app = TestApp::new();
        let user = app.db.seed_user("subscriber@example.com");
        let local = app.db.seed_subscription(user.id, "plan_1", 100, 73);
        let price = app.state.plans.find("plan_1").unwrap().price_id.clone().unwrap();
        app.stripe.put_subscription(stripe_subscription(
            &local.external_subscription_id,
            &price,
            "active",
        ));

        let manual = handle_webhook(
            &app.state,
            &event(
                "evt_manual",
                "invoice.payment_succeeded",
                json!({ "subscription": local.external_subscription_id, "billing_reason": "manual" }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();
        assert_eq!(manual, WebhookOutcome::Ignored);
        assert_eq!(app.db.subscription(local.id).unwrap().used_this_month, 73);

        let renewal = handle_webhook(
            &app.state,
            &event(
                "evt_cycle",
                "invoice.payment_succeeded",
                json!({ "subscription": local.external_subscription_id, "billing_reason": "subscription_cycle" }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();
        assert_eq!(renewal, WebhookOutcome::Applied);
        let renewed = app.db.subscription(local.id).unwrap();
        assert_eq!(renewed.used_this_month, 0);
        assert_eq!(renewed.period_start, from_unix(1_700_000_000));
    }

    #[tokio::test]
    async fn subscription_updates_and_deletion_are_mirrored() {
        let app = TestApp::new();
        let user = app.db.seed_user("subscriber@example.com");
        let local = app.db.seed_subscription(user.id, "plan_1", 100, 5);
        let price = app.state.plans.find("plan_1").unwrap().price_id.clone().unwrap();

        handle_webhook(
            &app.state,
            &event(
                "evt_upd",
                "customer.subscription.updated",
                json!({
                    "id": local.external_subscription_id,
                    "status": "past_due",
                    "cancel_at_period_end": true,
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 1_702_592_000,
                    "items": { "data": [{ "price": { "id": price } }] }
                }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();
        let updated = app.db.subscription(local.id).unwrap();
        assert_eq!(updated.status, SubscriptionStatus::PastDue);
        assert!(updated.cancel_at_period_end);
        assert_eq!(updated.used_this_month, 5);

        handle_webhook(
            &app.state,
            &event(
                "evt_del",
                "customer.subscription.deleted",
                json!({ "id": local.external_subscription_id, "status": "canceled" }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();
        assert_eq!(
            app.db.subscription(local.id).unwrap().status,
            SubscriptionStatus::Canceled
        );
    }

    #[tokio::test]
    async fn expired_session_fails_pending_transaction() {
        let app = TestApp::new();
        let user = app.db.seed_user("buyer@example.com");
        let checkout = create_checkout(&app.state, &user, "credits_100").await.unwrap();

        handle_webhook(
            &app.state,
            &event(
                "evt_exp",
                "checkout.session.expired",
                json!({ "id": checkout.session_id }),
            ),
            MOCK_SIGNATURE,
        )
        .await
        .unwrap();

        assert_eq!(app.db.transactions()[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn soft_and_hard_cancellation_mirror_stripe() {
        let app = TestApp::new();
        let user = app.db.seed_user("subscriber@example.com");
        let local = app.db.seed_subscription(user.id, "plan_3", 1500, 0);
        let price = app.state.plans.find("plan_3").unwrap().price_id.clone().unwrap();
        app.stripe.put_subscription(stripe_subscription(
            &local.external_subscription_id,
            &price,
            "active",
        ));

        let soft = cancel_subscription(&app.state, user.id, false).await.unwrap();
        assert!(soft.cancel_at_period_end);
        assert_eq!(soft.status, SubscriptionStatus::Active);

        let hard = cancel_subscription(&app.state, user.id, true).await.unwrap();
        assert_eq!(hard.status, SubscriptionStatus::Canceled);
        assert_eq!(
            app.stripe
                .subscription(&local.external_subscription_id)
                .unwrap()
                .status,
            "canceled"
        );

        assert!(matches!(
            cancel_subscription(&app.state, user.id, true).await,
            Err(BillingError::NoSubscription)
        ));
    }

    #[tokio::test]
    async fn refresh_pulls_status_from_stripe() {
        let app = TestApp::new();
        let user = app.db.seed_user("subscriber@example.com");
        assert!(refresh_subscription(&app.state, user.id).await.unwrap().is_none());

        let local = app.db.seed_subscription(user.id, "plan_1", 100, 0);
        let price = app.state.plans.find("plan_1").unwrap().price_id.clone().unwrap();
        app.stripe.put_subscription(stripe_subscription(
            &local.external_subscription_id,
            &price,
            "unpaid",
        ));

        let refreshed = refresh_subscription(&app.state, user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.status, SubscriptionStatus::PastDue);
    }
}
