use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GenerationError, ProfileScraper, CAPTION_LIMIT};
use crate::models::message::ProfileSummary;

pub const APIFY_BASE_URL: &str = "https://api.apify.com";
const PROFILE_ACTOR: &str = "apify~instagram-profile-scraper";
// Actor runs routinely take tens of seconds.
const APIFY_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileItem {
    full_name: Option<String>,
    biography: Option<String>,
    #[serde(default)]
    private: bool,
    followers_count: Option<i64>,
    posts_count: Option<i64>,
    #[serde(default)]
    latest_posts: Vec<LatestPost>,
}

#[derive(Debug, Deserialize)]
struct LatestPost {
    caption: Option<String>,
}

impl ProfileItem {
    fn into_summary(self) -> Result<ProfileSummary, GenerationError> {
        if self.private {
            return Err(GenerationError::PrivateAccount);
        }
        Ok(ProfileSummary {
            full_name: self.full_name.unwrap_or_else(|| "NO NAME".into()),
            biography: self.biography.unwrap_or_else(|| "NO BIOGRAPHY".into()),
            followers_count: self.followers_count.unwrap_or_default(),
            posts_count: self.posts_count.unwrap_or_default(),
            captions: self
                .latest_posts
                .into_iter()
                .take(CAPTION_LIMIT)
                .map(|post| post.caption.unwrap_or_default())
                .collect(),
        })
    }
}

/// Runs the Apify Instagram profile actor synchronously and reads its dataset.
#[derive(Clone)]
pub struct ApifyProfileScraper {
    client: Client,
    base_url: String,
    token: String,
}

impl ApifyProfileScraper {
    pub fn new(client: Client, token: impl Into<String>) -> Self {
        Self::with_base_url(client, token, APIFY_BASE_URL)
    }

    pub fn with_base_url(
        client: Client,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ProfileScraper for ApifyProfileScraper {
    async fn fetch_profile(&self, username: &str) -> Result<ProfileSummary, GenerationError> {
        let url = format!(
            "{}/v2/acts/{}/run-sync-get-dataset-items",
            self.base_url, PROFILE_ACTOR
        );
        debug!(%username, "running profile scraper");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .timeout(APIFY_TIMEOUT)
            .json(&json!({ "usernames": [username] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                service: "Apify",
                status,
                message,
            });
        }

        let items: Vec<ProfileItem> = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        // The actor returns at most one item per requested handle.
        items
            .into_iter()
            .last()
            .ok_or_else(|| GenerationError::ProfileNotFound(username.to_string()))?
            .into_summary()
    }
}
