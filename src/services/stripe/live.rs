use super::{
    CheckoutLineItem, CheckoutMode, CheckoutSession, CheckoutSessionInfo,
    CreateCheckoutSessionRequest, StripeEvent, StripeService, StripeServiceError,
    SubscriptionInfo,
};
use async_trait::async_trait;
use serde::Serialize;

pub struct LiveStripeService {
    client: stripe::Client,
    webhook_secret: String,
}

impl LiveStripeService {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        let client = stripe::Client::new(secret_key);
        Self {
            client,
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.webhook_secret.clone())
    }
}

fn map_mode(mode: CheckoutMode) -> stripe::CheckoutSessionMode {
    match mode {
        CheckoutMode::Payment => stripe::CheckoutSessionMode::Payment,
        CheckoutMode::Subscription => stripe::CheckoutSessionMode::Subscription,
    }
}

fn map_line_items(items: &[CheckoutLineItem]) -> Vec<stripe::CreateCheckoutSessionLineItems> {
    items
        .iter()
        .map(|li| stripe::CreateCheckoutSessionLineItems {
            price: Some(li.price.clone()),
            quantity: Some(li.quantity),
            ..Default::default()
        })
        .collect()
}

fn to_json<T: Serialize>(object: &T) -> Result<serde_json::Value, StripeServiceError> {
    serde_json::to_value(object).map_err(|e| StripeServiceError::Serde(e.to_string()))
}

fn parse_subscription_id(id: &str) -> Result<stripe::SubscriptionId, StripeServiceError> {
    id.parse::<stripe::SubscriptionId>()
        .map_err(|e| StripeServiceError::Other(e.to_string()))
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(map_mode(req.mode));
        params.success_url = Some(&req.success_url);
        params.cancel_url = Some(&req.cancel_url);
        params.allow_promotion_codes = Some(req.allow_promotion_codes);
        if let Some(ref id) = req.client_reference_id {
            params.client_reference_id = Some(id);
        }
        if let Some(ref email) = req.customer_email {
            params.customer_email = Some(email);
        }
        if !req.metadata.is_empty() {
            params.metadata = Some(
                req.metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
        }
        if !req.line_items.is_empty() {
            params.line_items = Some(map_line_items(&req.line_items));
        }

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        let payload_str =
            std::str::from_utf8(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let event =
            stripe::Webhook::construct_event(payload_str, signature_header, &self.webhook_secret)?;
        // Keep the raw JSON so fields unknown to the typed model survive.
        let payload = match serde_json::from_str(payload_str) {
            Ok(value) => value,
            Err(_) => to_json(&event)?,
        };
        Ok(StripeEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionInfo, StripeServiceError> {
        let id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;
        let session = stripe::CheckoutSession::retrieve(&self.client, &id, &[]).await?;
        CheckoutSessionInfo::from_value(&to_json(&session)?)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        let id = parse_subscription_id(subscription_id)?;
        let sub = stripe::Subscription::retrieve(&self.client, &id, &[]).await?;
        SubscriptionInfo::from_value(&to_json(&sub)?)
    }

    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        let id = parse_subscription_id(subscription_id)?;
        let mut params = stripe::UpdateSubscription::new();
        params.cancel_at_period_end = Some(cancel_at_period_end);
        let sub = stripe::Subscription::update(&self.client, &id, params).await?;
        SubscriptionInfo::from_value(&to_json(&sub)?)
    }

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        let id = parse_subscription_id(subscription_id)?;
        let sub = stripe::Subscription::cancel(&self.client, &id, Default::default()).await?;
        SubscriptionInfo::from_value(&to_json(&sub)?)
    }
}
