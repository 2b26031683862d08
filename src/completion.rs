use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{TtlCache, make_cache_key};
use crate::error::{AppError, Result};
use crate::metrics::UPSTREAM_LATENCY;
use crate::models::{
    ChatMessage, CompletionRequest, CompletionResponse, GeneratedImage, ImageGenerationRequest,
    ImageGenerationResponse, Role,
};
use crate::rate_limit::{COMPLETION_KEY, SlidingWindowLimiter, client_key};
use crate::sanitize::{MAX_TEXT_LENGTH, sanitize_html, sanitize_text};

const ANALYZE_PROMPT: &str = "Analyze the following text and provide insights:";

const CHAT_FAILED: &str = "Failed to generate response";
const IMAGE_FAILED: &str = "Failed to generate image";
const ANALYZE_FAILED: &str = "Failed to analyze text";

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub image_size: String,
}

// Client for the external completion provider.
// Every call is sanitized, rate limited and memoized before it leaves the process.
pub struct CompletionClient {
    http: reqwest::Client,
    settings: CompletionSettings,
    limiter: Arc<SlidingWindowLimiter>,
    cache: Arc<TtlCache>,
}

impl CompletionClient {
    pub fn new(
        http: reqwest::Client,
        settings: CompletionSettings,
        limiter: Arc<SlidingWindowLimiter>,
        cache: Arc<TtlCache>,
    ) -> Self {
        Self {
            http,
            settings,
            limiter,
            cache,
        }
    }

    pub async fn chat(&self, client: &str, messages: &[ChatMessage]) -> Result<ChatMessage> {
        if messages.is_empty() {
            return Err(AppError::BadRequest(
                "At least one message is required".to_string(),
            ));
        }
        if messages.iter().any(|m| m.role == Role::System) {
            return Err(AppError::BadRequest(
                "Only user and assistant messages are accepted".to_string(),
            ));
        }

        let sanitized: Vec<ChatMessage> = messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: sanitize_text(&m.content, MAX_TEXT_LENGTH),
            })
            .collect();
        if sanitized.iter().any(|m| m.content.is_empty()) {
            return Err(AppError::BadRequest(
                "Message content is required".to_string(),
            ));
        }

        self.limiter.check(&client_key(COMPLETION_KEY, client))?;
        self.complete(sanitized, CHAT_FAILED).await
    }

    pub async fn analyze_text(&self, client: &str, text: &str) -> Result<ChatMessage> {
        let sanitized = sanitize_text(text, MAX_TEXT_LENGTH);
        if sanitized.is_empty() {
            return Err(AppError::BadRequest("Text is required".to_string()));
        }

        self.limiter.check(&client_key(COMPLETION_KEY, client))?;

        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: ANALYZE_PROMPT.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: sanitized,
            },
        ];
        self.complete(messages, ANALYZE_FAILED).await
    }

    pub async fn generate_image(&self, client: &str, prompt: &str) -> Result<GeneratedImage> {
        let sanitized = sanitize_text(prompt, MAX_TEXT_LENGTH);
        if sanitized.is_empty() {
            return Err(AppError::BadRequest("Prompt is required".to_string()));
        }

        self.limiter.check(&client_key(COMPLETION_KEY, client))?;

        let cache_key = make_cache_key(
            "image",
            &[self.settings.image_size.as_str(), sanitized.as_str()],
        );
        if let Some(image) = self.cache.get::<GeneratedImage>(&cache_key) {
            return Ok(image);
        }

        let body = ImageGenerationRequest {
            prompt: &sanitized,
            n: 1,
            size: &self.settings.image_size,
        };
        let response: ImageGenerationResponse =
            self.post_json("images/generations", &body, IMAGE_FAILED).await?;

        let url = response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .unwrap_or_default();
        let image = GeneratedImage {
            url,
            alt: sanitized,
        };

        if !image.url.is_empty() {
            self.remember(&cache_key, &image);
        }
        Ok(image)
    }

    async fn complete(&self, messages: Vec<ChatMessage>, failure: &str) -> Result<ChatMessage> {
        let rendered: Vec<String> = messages
            .iter()
            .map(|m| format!("{:?}\n{}", m.role, m.content))
            .collect();
        let parts: Vec<&str> = rendered.iter().map(String::as_str).collect();
        let cache_key = make_cache_key(&self.settings.chat_model, &parts);

        if let Some(message) = self.cache.get::<ChatMessage>(&cache_key) {
            return Ok(message);
        }

        let body = CompletionRequest {
            model: &self.settings.chat_model,
            messages: &messages,
        };
        let response: CompletionResponse =
            self.post_json("chat/completions", &body, failure).await?;

        let message = match response.choices.into_iter().next().and_then(|c| c.message) {
            Some(m) => ChatMessage::assistant(sanitize_html(&m.content)),
            None => ChatMessage::assistant(""),
        };

        if !message.content.is_empty() {
            self.remember(&cache_key, &message);
        }
        Ok(message)
    }

    // A failed memoization never fails the request
    fn remember<T: Serialize>(&self, cache_key: &str, value: &T) {
        if let Err(e) = self.cache.set(cache_key, value, None) {
            tracing::warn!(cache_key, "Failed to cache completion: {}", e);
        }
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        failure: &str,
    ) -> Result<R> {
        let url = format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path);
        let start_time = Instant::now();

        let result = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await;

        UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

        let res = result.map_err(|e| {
            tracing::error!(url = %url, "Request failed: {}", e);
            AppError::Upstream(failure.to_string())
        })?;

        let status = res.status();
        if !status.is_success() {
            tracing::error!(
                url = %url,
                status = status.as_u16(),
                "{}: {}",
                failure,
                describe_status(status.as_u16())
            );
            return Err(AppError::Upstream(failure.to_string()));
        }

        res.json::<R>().await.map_err(|e| {
            tracing::error!(url = %url, "Parse Error: {}", e);
            AppError::Upstream(failure.to_string())
        })
    }
}

// Human readable reason for a provider status code
pub fn describe_status(status: u16) -> &'static str {
    match status {
        401 => "Unauthorized, check the provider API key",
        403 => "Forbidden, the API key lacks permission for this action",
        404 => "The requested resource was not found",
        429 => "Provider rate limit reached",
        500 => "Provider server error",
        _ => "Unexpected provider response",
    }
}
