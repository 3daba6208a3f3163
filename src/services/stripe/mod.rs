// NOTE: async-stripe is compiled with a minimal feature set (runtime-tokio-hyper, checkout,
// billing, webhook-events, and connect to satisfy webhook payload types). Provider objects are
// read back through their JSON form so webhook payloads and API responses share one parser.
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("stripe api error: {0}")]
    Api(String),
    #[error("webhook verification failed: {0}")]
    Webhook(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("other error: {0}")]
    Other(String),
}

impl From<stripe::StripeError> for StripeServiceError {
    fn from(err: stripe::StripeError) -> Self {
        StripeServiceError::Api(err.to_string())
    }
}

impl From<stripe::WebhookError> for StripeServiceError {
    fn from(err: stripe::WebhookError) -> Self {
        StripeServiceError::Webhook(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckoutLineItem {
    pub price: String,
    pub quantity: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateCheckoutSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub mode: CheckoutMode,
    pub line_items: Vec<CheckoutLineItem>,
    pub client_reference_id: Option<String>,
    pub customer_email: Option<String>,
    pub allow_promotion_codes: bool,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    pub r#type: String,
    /// The full event as JSON; the affected object sits at `data.object`.
    pub payload: Value,
}

impl StripeEvent {
    pub fn object(&self) -> &Value {
        &self.payload["data"]["object"]
    }
}

/// The parts of a checkout session the payment flow cares about.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutSessionInfo {
    pub id: String,
    pub payment_status: String,
    pub subscription_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionInfo {
    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status.as_str(), "paid" | "no_payment_required")
    }

    pub fn from_value(value: &Value) -> Result<Self, StripeServiceError> {
        Ok(CheckoutSessionInfo {
            id: required_str(value, "id")?,
            payment_status: value["payment_status"]
                .as_str()
                .unwrap_or("unpaid")
                .to_string(),
            subscription_id: expandable_id(&value["subscription"]),
            metadata: metadata(&value["metadata"]),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionInfo {
    pub id: String,
    pub status: String,
    pub price_id: Option<String>,
    /// Unix timestamp (seconds) when the current period started
    pub current_period_start: i64,
    /// Unix timestamp (seconds) when the current period ends
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    pub metadata: BTreeMap<String, String>,
}

impl SubscriptionInfo {
    pub fn from_value(value: &Value) -> Result<Self, StripeServiceError> {
        let first_item = &value["items"]["data"][0];
        // Newer API versions keep the billing period on the item.
        let period = |key: &str| {
            value[key]
                .as_i64()
                .or_else(|| first_item[key].as_i64())
                .unwrap_or_default()
        };
        Ok(SubscriptionInfo {
            id: required_str(value, "id")?,
            status: required_str(value, "status")?,
            price_id: expandable_id(&first_item["price"]),
            current_period_start: period("current_period_start"),
            current_period_end: period("current_period_end"),
            cancel_at_period_end: value["cancel_at_period_end"].as_bool().unwrap_or(false),
            metadata: metadata(&value["metadata"]),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceInfo {
    pub subscription_id: Option<String>,
    pub billing_reason: Option<String>,
}

impl InvoiceInfo {
    pub fn from_value(value: &Value) -> Self {
        let subscription = expandable_id(&value["subscription"]).or_else(|| {
            expandable_id(&value["parent"]["subscription_details"]["subscription"])
        });
        InvoiceInfo {
            subscription_id: subscription,
            billing_reason: value["billing_reason"].as_str().map(str::to_string),
        }
    }
}

fn required_str(value: &Value, key: &str) -> Result<String, StripeServiceError> {
    value[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| StripeServiceError::Serde(format!("missing `{key}`")))
}

/// Reads an id that Stripe may send either bare or as an expanded object.
fn expandable_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn metadata(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
pub trait StripeService: Send + Sync {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionInfo, StripeServiceError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError>;

    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<SubscriptionInfo, StripeServiceError>;

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError>;
}

mod live;
mod mock;

pub use live::LiveStripeService;
pub use mock::{MockStripeService, MOCK_SIGNATURE};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_captures_checkout_request_and_returns_url() {
        let mock = MockStripeService::new();
        let req = CreateCheckoutSessionRequest {
            success_url: "https://example.test/success".into(),
            cancel_url: "https://example.test/cancel".into(),
            mode: CheckoutMode::Subscription,
            line_items: vec![CheckoutLineItem {
                price: "price_123".into(),
                quantity: 1,
            }],
            client_reference_id: Some("00000000-0000-0000-0000-000000000000".into()),
            customer_email: Some("jane@example.com".into()),
            allow_promotion_codes: true,
            metadata: [("plan_id".to_string(), "plan_2".to_string())]
                .into_iter()
                .collect(),
        };

        let session = mock.create_checkout_session(req.clone()).await.unwrap();
        assert!(session.id.starts_with("cs_test_"));
        assert_eq!(
            session.url.as_deref(),
            Some("https://example.test/checkout")
        );

        let captured = mock.last_create_requests.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0], req);
    }

    #[test]
    fn live_verify_webhook_invalid_signature_maps_to_webhook_error() {
        let live = LiveStripeService::new("sk_test_dummy", "whsec_test");
        let payload = br#"{ "id": "evt_123", "type": "checkout.session.completed" }"#;
        let result = live.verify_webhook(payload, "t=1,v1=invalidsignature");
        assert!(matches!(result, Err(StripeServiceError::Webhook(_))));
    }

    #[test]
    fn checkout_session_reads_bare_and_expanded_subscription() {
        let bare = CheckoutSessionInfo::from_value(&json!({
            "id": "cs_1",
            "payment_status": "paid",
            "subscription": "sub_1",
            "metadata": {"user_id": "u", "plan_id": "plan_1"}
        }))
        .unwrap();
        assert!(bare.is_paid());
        assert_eq!(bare.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(bare.metadata.get("plan_id").map(String::as_str), Some("plan_1"));

        let expanded = CheckoutSessionInfo::from_value(&json!({
            "id": "cs_2",
            "payment_status": "unpaid",
            "subscription": {"id": "sub_2", "object": "subscription"},
            "metadata": null
        }))
        .unwrap();
        assert!(!expanded.is_paid());
        assert_eq!(expanded.subscription_id.as_deref(), Some("sub_2"));
        assert!(expanded.metadata.is_empty());
    }

    #[test]
    fn subscription_period_falls_back_to_first_item() {
        let info = SubscriptionInfo::from_value(&json!({
            "id": "sub_1",
            "status": "active",
            "cancel_at_period_end": true,
            "items": {"data": [{
                "price": {"id": "price_growth"},
                "current_period_start": 100,
                "current_period_end": 200
            }]}
        }))
        .unwrap();
        assert_eq!(info.price_id.as_deref(), Some("price_growth"));
        assert_eq!((info.current_period_start, info.current_period_end), (100, 200));
        assert!(info.cancel_at_period_end);
        assert!(SubscriptionInfo::from_value(&json!({"id": "sub_1"})).is_err());
    }

    #[test]
    fn invoice_reads_billing_reason() {
        let invoice = InvoiceInfo::from_value(&json!({
            "subscription": "sub_9",
            "billing_reason": "subscription_cycle"
        }));
        assert_eq!(invoice.subscription_id.as_deref(), Some("sub_9"));
        assert_eq!(invoice.billing_reason.as_deref(), Some("subscription_cycle"));
    }
}
