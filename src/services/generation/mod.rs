use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::message::ProfileSummary;

pub const PRIVATE_ACCOUNT_ERROR: &str = "Failed to scan private account";

/// Number of recent post captions handed to the composer.
pub const CAPTION_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Failed to scan private account")]
    PrivateAccount,
    #[error("An error occurred: profile @{0} was not found")]
    ProfileNotFound(String),
    #[error("An error occurred: request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("An error occurred: {service} responded with status {status}: {message}")]
    Api {
        service: &'static str,
        status: StatusCode,
        message: String,
    },
    #[error("An error occurred: {0}")]
    InvalidResponse(String),
}

/// Looks up a public profile by handle.
#[async_trait]
pub trait ProfileScraper: Send + Sync {
    async fn fetch_profile(&self, username: &str) -> Result<ProfileSummary, GenerationError>;
}

/// Writes one outreach message for a scraped profile.
#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn compose(&self, brief: &MessageBrief<'_>) -> Result<String, GenerationError>;
}

/// Everything the composer needs to write a message.
#[derive(Debug, Clone, Copy)]
pub struct MessageBrief<'a> {
    pub profile: &'a ProfileSummary,
    pub product_info: &'a str,
    pub offer_info: &'a str,
    pub sender_name: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMessage {
    pub message: String,
    pub profile: ProfileSummary,
}

/// Profile fetch followed by message synthesis.
#[derive(Clone)]
pub struct Generator {
    scraper: Arc<dyn ProfileScraper>,
    composer: Arc<dyn MessageComposer>,
}

impl Generator {
    pub fn new(scraper: Arc<dyn ProfileScraper>, composer: Arc<dyn MessageComposer>) -> Self {
        Self { scraper, composer }
    }

    pub async fn generate(
        &self,
        username: &str,
        product_info: &str,
        offer_info: &str,
        sender_name: &str,
    ) -> Result<GeneratedMessage, GenerationError> {
        let profile = self.scraper.fetch_profile(username).await?;
        let message = self
            .composer
            .compose(&MessageBrief {
                profile: &profile,
                product_info,
                offer_info,
                sender_name,
            })
            .await?;

        let message = message.trim();
        if message.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "generated message was empty".into(),
            ));
        }

        Ok(GeneratedMessage {
            message: message.to_string(),
            profile,
        })
    }
}

mod apify;
mod mock;
mod openai;

pub use apify::ApifyProfileScraper;
pub use mock::{MockComposer, MockScrapeOutcome, MockScraper};
pub use openai::OpenAiComposer;

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(scraper: MockScraper, composer: MockComposer) -> Generator {
        Generator::new(Arc::new(scraper), Arc::new(composer))
    }

    #[tokio::test]
    async fn generate_passes_project_context_to_composer() {
        let composer = MockComposer::default();
        let calls = composer.calls.clone();
        let generator = generator(MockScraper::default(), composer);

        let generated = generator
            .generate("candle_lover", "Handmade candles", "20% off", "Jane")
            .await
            .unwrap();

        assert_eq!(generated.profile.full_name, "Candle Lover");
        assert!(generated.message.contains("Jane"));
        let calls = calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                "Candle Lover".to_string(),
                "Handmade candles".to_string(),
                "20% off".to_string(),
                "Jane".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn private_account_stops_before_composing() {
        let composer = MockComposer::default();
        let calls = composer.calls.clone();
        let generator = generator(MockScraper::private(), composer);

        let err = generator
            .generate("hidden", "p", "o", "Jane")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), PRIVATE_ACCOUNT_ERROR);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_composer_output_is_an_error() {
        let generator = generator(MockScraper::default(), MockComposer::replying("   "));
        assert!(matches!(
            generator.generate("someone", "p", "o", "Jane").await,
            Err(GenerationError::InvalidResponse(_))
        ));
    }
}
