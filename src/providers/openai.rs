/// OpenAI-compatible chat completions client
///
/// Works against any endpoint speaking the `/chat/completions` protocol
/// (OpenAI, Ollama, vLLM, OpenRouter, ...).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmSettings;
use crate::providers::{CompletionParams, LanguageModel};
use crate::runtime::error::{EngineError, EngineResult};
use crate::workflow::types::Message;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleModel {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleModel {
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            default_model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> EngineResult<String> {
        let model = params.model.as_deref().unwrap_or(&self.default_model);
        let body = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| ChatMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        tracing::debug!("🧠 Completion request: model={} messages={}", model, messages.len());

        let mut request = self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Provider(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider(format!("completion endpoint returned {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Provider(format!("invalid completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EngineError::Provider("completion response had no content".to_string()))
    }
}
