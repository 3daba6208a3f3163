use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationError, MessageBrief, MessageComposer};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

const SYSTEM_PROMPT: &str = "\
You write short Instagram direct messages that promote a product, good or service.
The message must read like a friend texting, never like a salesperson.

You receive the recipient's full name, biography, follower count, post count and up to
five recent captions, plus the product, the offer and the sender's name.

Structure, in order:
1. A warm, personal opener that shows you looked at their page. Use the biography first,
   then the broad theme of the captions, then the follower or post counts. If nothing is
   known, open with: \"Hey, just came across your page and wanted to reach out.\"
2. One sentence of genuine appreciation that leads into how you could help. Never point
   out low follower or post counts.
3. One or two sentences on what the product does for them, with a hint of proof.
4. A soft, curious close, then sign off with \"Cheers, <sender name>\".

Rules: at most six sentences, no hyphens or hyphenated phrases, skip missing details
gracefully, and return only the finished message text.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

fn user_prompt(brief: &MessageBrief<'_>) -> String {
    let profile = brief.profile;
    format!(
        "User Info: full name: {}; biography: {}; followers: {}; posts: {}; latest captions: {:?}\n\
         Product Info: {}\nOffer Info: {}\nName: {}",
        profile.full_name,
        profile.biography,
        profile.followers_count,
        profile.posts_count,
        profile.captions,
        brief.product_info,
        brief.offer_info,
        brief.sender_name,
    )
}

/// Chat completions client for message synthesis.
#[derive(Clone)]
pub struct OpenAiComposer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiComposer {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, model, OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        client: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl MessageComposer for OpenAiComposer {
    async fn compose(&self, brief: &MessageBrief<'_>) -> Result<String, GenerationError> {
        let prompt = user_prompt(brief);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(GenerationError::Api {
                service: "OpenAI",
                status,
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("completion had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::ProfileSummary;
    use serde_json::json;

    fn profile() -> ProfileSummary {
        ProfileSummary {
            full_name: "Candle Lover".into(),
            biography: "Scents".into(),
            followers_count: 10,
            posts_count: 2,
            captions: vec!["hello".into()],
        }
    }

    #[tokio::test]
    async fn compose_sends_model_and_returns_first_choice() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_contains("\"model\":\"gpt-4.1-mini\"")
                .body_contains("Handmade candles")
                .body_contains("Name: Jane");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Hey! Cheers, Jane" } }]
                }));
        });

        let composer = OpenAiComposer::with_base_url(
            Client::new(),
            "sk-test",
            DEFAULT_MODEL,
            server.url(""),
        );
        let profile = profile();
        let message = composer
            .compose(&MessageBrief {
                profile: &profile,
                product_info: "Handmade candles",
                offer_info: "20% off",
                sender_name: "Jane",
            })
            .await
            .unwrap();

        mock.assert();
        assert_eq!(message, "Hey! Cheers, Jane");
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/v1/chat/completions");
            then.status(429)
                .header("content-type", "application/json")
                .json_body(json!({ "error": { "message": "Rate limit reached" } }));
        });

        let composer =
            OpenAiComposer::with_base_url(Client::new(), "sk-test", DEFAULT_MODEL, server.url(""));
        let profile = profile();
        let err = composer
            .compose(&MessageBrief {
                profile: &profile,
                product_info: "p",
                offer_info: "o",
                sender_name: "Jane",
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Rate limit reached"));
        assert!(err.to_string().contains("429"));
    }
}
