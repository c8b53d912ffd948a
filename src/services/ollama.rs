//! Ollama chat API client.
//!
//! Used for text classification, image classification and plan advice.
//! Every request runs in JSON mode and the reply is parsed strictly into
//! the expected struct; anything else is a [`ToolError::MalformedResponse`].

use super::{
    read_capped, strip_code_fence, ImageClassifier, ImageRef, ImageVerdict, PlanAdvice,
    PlanAdvisor, TextClassifier, TextVerdict,
};
use crate::error::ToolError;
use crate::models::{Target, ToolDescriptor};
use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Largest image downloaded for vision analysis (4 MB).
const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Characters of page text included in a plan advice prompt.
const ADVICE_PREVIEW_CHARS: usize = 500;

/// Connection and model settings for Ollama.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    /// Model used for images; must accept `images` in chat messages.
    pub vision_model: String,
    pub temperature: f32,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            vision_model: "llava:latest".to_string(),
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    format: &'static str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Ollama-backed classifier and plan advisor.
///
/// Each chat request spends one unit of the shared LLM quota.
pub struct OllamaClient {
    http: reqwest::Client,
    settings: OllamaSettings,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(
        http: reqwest::Client,
        settings: OllamaSettings,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            settings: OllamaSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
            limiter,
            retry,
        }
    }

    pub fn settings(&self) -> &OllamaSettings {
        &self.settings
    }

    /// Send one chat exchange and parse the reply as `T`.
    async fn chat_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: String,
        images: Vec<String>,
    ) -> Result<T, ToolError> {
        let messages = [
            ChatMessage {
                role: "system",
                content: system.to_string(),
                images: Vec::new(),
            },
            ChatMessage {
                role: "user",
                content: user,
                images,
            },
        ];

        self.retry
            .run("Ollama chat", || self.chat_once(model, &messages))
            .await
    }

    async fn chat_once<T: DeserializeOwned>(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<T, ToolError> {
        self.limiter.acquire().await;

        let url = format!("{}/api/chat", self.settings.base_url);
        let request = OllamaChatRequest {
            model,
            messages,
            format: "json",
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
            },
        };

        debug!("Sending Ollama chat request to {} ({})", url, model);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("Ollama", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::from_reqwest("Ollama", e))?;
        if !status.is_success() {
            return Err(ToolError::from_status("Ollama", status, &body));
        }

        let chat: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|e| ToolError::malformed(format!("Ollama envelope: {}", e), body.clone()))?;
        parse_reply(&chat.message.content)
    }

    async fn download_image(&self, src: &str) -> Result<String, ToolError> {
        let response = self
            .http
            .get(src)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("image download", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::from_status("image download", status, ""));
        }

        let bytes = read_capped(response, "image", MAX_IMAGE_BYTES).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
    }
}

/// Parse a model reply strictly, tolerating only a surrounding code fence.
fn parse_reply<T: DeserializeOwned>(content: &str) -> Result<T, ToolError> {
    serde_json::from_str(strip_code_fence(content))
        .map_err(|e| ToolError::malformed(format!("model reply: {}", e), content))
}

#[async_trait]
impl TextClassifier for OllamaClient {
    async fn classify_text(&self, text: &str) -> Result<TextVerdict, ToolError> {
        let user = format!("Analyze this text:\n\n{}", text);
        self.chat_json(&self.settings.model, TEXT_SYSTEM_PROMPT, user, Vec::new())
            .await
    }
}

#[async_trait]
impl ImageClassifier for OllamaClient {
    async fn classify_image(&self, image: &ImageRef) -> Result<ImageVerdict, ToolError> {
        let encoded = self.download_image(&image.src).await?;
        let user = if image.alt.is_empty() {
            "Analyze this image.".to_string()
        } else {
            format!("Analyze this image (alt text: \"{}\").", image.alt)
        };
        self.chat_json(
            &self.settings.vision_model,
            IMAGE_SYSTEM_PROMPT,
            user,
            vec![encoded],
        )
        .await
    }
}

#[async_trait]
impl PlanAdvisor for OllamaClient {
    async fn advise(
        &self,
        target: &Target,
        tools: &[ToolDescriptor],
    ) -> Result<PlanAdvice, ToolError> {
        let user = advice_prompt(target, tools);
        self.chat_json(&self.settings.model, PLAN_SYSTEM_PROMPT, user, Vec::new())
            .await
    }
}

fn advice_prompt(target: &Target, tools: &[ToolDescriptor]) -> String {
    let mut prompt = format!("URL: {}\n", target.url);
    if let Some(text) = &target.text {
        let preview: String = text.chars().take(ADVICE_PREVIEW_CHARS).collect();
        prompt.push_str(&format!("Page text preview: {}\n", preview));
    }
    if target.image_url.is_some() {
        prompt.push_str("An image was supplied with the request.\n");
    }
    prompt.push_str("\nAvailable tools:\n");
    for tool in tools {
        prompt.push_str(&format!(
            "- {} (cost {}): {}\n",
            tool.name, tool.external_cost, tool.description
        ));
    }
    prompt
}

const TEXT_SYSTEM_PROMPT: &str = r#"You are a fraud analyst. Decide whether the text is part of a scam.
Reply with a single JSON object and nothing else:
{"scam_likelihood": "low" | "medium" | "high",
 "confidence": <number 0-100>,
 "red_flags": [<string>],
 "social_engineering_tactics": [<string>],
 "overall_assessment": <string>}"#;

const IMAGE_SYSTEM_PROMPT: &str = r#"You are a fraud analyst reviewing an image from a web page.
Look for fake endorsements, manipulated or AI-generated faces, counterfeit logos and fake payment proofs.
Reply with a single JSON object and nothing else:
{"suspicious": true | false,
 "confidence": <number 0-100>,
 "reason": <string>,
 "deepfake_indicators": [<string>]}"#;

const PLAN_SYSTEM_PROMPT: &str = r#"You plan a scam investigation for a URL.
Pick the tools worth running from the list you are given. Free tools (cost 0) are cheap; others spend quota.
Reply with a single JSON object and nothing else:
{"tools": [<tool name>], "rationale": <string>, "priority": "low" | "medium" | "high"}"#;
