use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::config;
use crate::shared::error::ai::LlmError;
use crate::shared::ports::ai::{AiFuture, ChatMessage, CompletionRequest, LlmPort};

use super::http_client;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint, JSON-object mode only.
#[derive(Clone)]
pub struct OpenAiChatClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn from_env() -> Self {
        let ai = config::ai_config();
        Self::new(
            ai.openai_api_key.clone(),
            ai.openai_base_url.clone(),
            ai.openai_model.clone(),
        )
        .with_timeout(config::timeouts().ai_http)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(LlmError::NotConfigured("OPENAI_API_KEY is not set"))?;
        let client =
            http_client(self.timeout).map_err(|e| LlmError::GenerationFailed(e.to_string()))?;
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let resp = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::GenerationFailed(e.to_string()))?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        let body_text = resp
            .text()
            .await
            .map_err(|e| LlmError::GenerationFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::GenerationFailed(format!(
                "HTTP {}: {}",
                status, body_text
            )));
        }
        extract_content(&body_text)
    }
}

impl LlmPort for OpenAiChatClient {
    fn complete_json(&self, request: CompletionRequest) -> AiFuture<Result<String, LlmError>> {
        let this = self.clone();
        Box::pin(async move { this.complete(request).await })
    }
}

fn extract_content(body_text: &str) -> Result<String, LlmError> {
    let body: ChatCompletionResponse = serde_json::from_str(body_text)
        .map_err(|e| LlmError::MalformedCompletion(e.to_string()))?;
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmError::MalformedCompletion("no content in completion".to_string()))
}
