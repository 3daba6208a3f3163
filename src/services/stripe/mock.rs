use super::{
    CheckoutSession, CheckoutSessionInfo, CreateCheckoutSessionRequest, StripeEvent,
    StripeService, StripeServiceError, SubscriptionInfo,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Signature header the mock accepts; anything else fails verification.
pub const MOCK_SIGNATURE: &str = "t=1,v1=mock";

#[derive(Clone, Default)]
pub struct MockStripeService {
    pub created_sessions: Arc<Mutex<Vec<CheckoutSession>>>,
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub sessions: Arc<Mutex<HashMap<String, CheckoutSessionInfo>>>,
    pub subscriptions: Arc<Mutex<HashMap<String, SubscriptionInfo>>>,
    pub fail_api: Arc<Mutex<bool>>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_session(&self, session: CheckoutSessionInfo) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn put_subscription(&self, subscription: SubscriptionInfo) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn subscription(&self, id: &str) -> Option<SubscriptionInfo> {
        self.subscriptions.lock().unwrap().get(id).cloned()
    }

    fn check_api(&self) -> Result<(), StripeServiceError> {
        if *self.fail_api.lock().unwrap() {
            return Err(StripeServiceError::Api("mock stripe outage".into()));
        }
        Ok(())
    }
}

pub(crate) fn make_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}_{}_{}", prefix, ts, COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        self.check_api()?;
        self.last_create_requests.lock().unwrap().push(req.clone());

        let session = CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        };
        self.created_sessions.lock().unwrap().push(session.clone());
        // Unpaid until a test marks it otherwise.
        self.put_session(CheckoutSessionInfo {
            id: session.id.clone(),
            payment_status: "unpaid".into(),
            subscription_id: None,
            metadata: req.metadata.clone(),
        });
        Ok(session)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        if signature_header != MOCK_SIGNATURE {
            return Err(StripeServiceError::Webhook("signature mismatch".into()));
        }
        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let id = match val.get("id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => make_id("evt"),
        };
        let ty = val
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(StripeEvent {
            id,
            r#type: ty,
            payload: val,
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionInfo, StripeServiceError> {
        self.check_api()?;
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StripeServiceError::NotFound(format!("session {session_id} not found")))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        self.check_api()?;
        self.subscription(subscription_id).ok_or_else(|| {
            StripeServiceError::NotFound(format!("subscription {subscription_id} not found"))
        })
    }

    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        self.check_api()?;
        let mut guard = self.subscriptions.lock().unwrap();
        let sub = guard.get_mut(subscription_id).ok_or_else(|| {
            StripeServiceError::NotFound(format!("subscription {subscription_id} not found"))
        })?;
        sub.cancel_at_period_end = cancel_at_period_end;
        Ok(sub.clone())
    }

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        self.check_api()?;
        let mut guard = self.subscriptions.lock().unwrap();
        let sub = guard.get_mut(subscription_id).ok_or_else(|| {
            StripeServiceError::NotFound(format!("subscription {subscription_id} not found"))
        })?;
        sub.status = "canceled".into();
        Ok(sub.clone())
    }
}
