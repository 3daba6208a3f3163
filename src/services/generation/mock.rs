use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{GenerationError, MessageBrief, MessageComposer, ProfileScraper};
use crate::models::message::ProfileSummary;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MockScrapeOutcome {
    #[default]
    Public,
    Private,
    Fail,
}

/// Returns a canned public profile unless told otherwise.
///
/// A held scraper signals `entered` and then blocks until `release`.
#[derive(Clone, Default)]
pub struct MockScraper {
    pub outcome: MockScrapeOutcome,
    pub requested: Arc<Mutex<Vec<String>>>,
    pub entered: Arc<Notify>,
    gate: Option<Arc<Notify>>,
}

impl MockScraper {
    pub fn private() -> Self {
        Self {
            outcome: MockScrapeOutcome::Private,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: MockScrapeOutcome::Fail,
            ..Default::default()
        }
    }

    pub fn held(outcome: MockScrapeOutcome) -> Self {
        Self {
            outcome,
            gate: Some(Arc::new(Notify::new())),
            ..Default::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl ProfileScraper for MockScraper {
    async fn fetch_profile(&self, username: &str) -> Result<ProfileSummary, GenerationError> {
        self.requested.lock().unwrap().push(username.to_string());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.outcome {
            MockScrapeOutcome::Private => Err(GenerationError::PrivateAccount),
            MockScrapeOutcome::Fail => Err(GenerationError::InvalidResponse(
                "mock scraper outage".into(),
            )),
            MockScrapeOutcome::Public => Ok(ProfileSummary {
                full_name: "Candle Lover".into(),
                biography: "Scents and slow mornings".into(),
                followers_count: 5400,
                posts_count: 230,
                captions: vec!["New batch is out".into(), "#selfcare".into()],
            }),
        }
    }
}

/// Signs a fixed message with the sender name; records every brief it sees.
#[derive(Clone, Default)]
pub struct MockComposer {
    pub reply: Option<String>,
    pub calls: Arc<Mutex<Vec<(String, String, String, String)>>>,
}

impl MockComposer {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MessageComposer for MockComposer {
    async fn compose(&self, brief: &MessageBrief<'_>) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push((
            brief.profile.full_name.clone(),
            brief.product_info.to_string(),
            brief.offer_info.to_string(),
            brief.sender_name.to_string(),
        ));
        Ok(self.reply.clone().unwrap_or_else(|| {
            format!(
                "Hey! Love the vibe of your page. Cheers, {}",
                brief.sender_name
            )
        }))
    }
}
