use crate::config::LlmSettings;
use crate::error::{NlqError, Result};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, warn};

/// Output constraint requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// Ask the endpoint to emit syntactically valid JSON.
    Json,
}

/// Single prompt/completion round-trip. No streaming and no conversation state.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String>;
}

/// Wire protocol spoken by the inference endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama `/api/generate`
    Ollama,
    /// OpenAI-compatible `/chat/completions`
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = NlqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" | "open_ai" => Ok(LlmProvider::OpenAi),
            other => Err(NlqError::Configuration(format!(
                "Unknown LLM provider '{}' (expected 'ollama' or 'openai')",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    settings: LlmSettings,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        match self.settings.provider {
            LlmProvider::Ollama => format!("{}/api/generate", base),
            LlmProvider::OpenAi => format!("{}/chat/completions", base),
        }
    }

    fn request_body(&self, prompt: &str, format: ResponseFormat) -> serde_json::Value {
        match self.settings.provider {
            LlmProvider::Ollama => {
                let mut body = serde_json::json!({
                    "model": self.settings.model,
                    "prompt": prompt,
                    "stream": false,
                    "options": {
                        "temperature": self.settings.temperature,
                        "num_ctx": self.settings.num_ctx,
                    }
                });
                if format == ResponseFormat::Json {
                    body["format"] = serde_json::json!("json");
                }
                body
            }
            LlmProvider::OpenAi => {
                let mut body = serde_json::json!({
                    "model": self.settings.model,
                    "messages": [
                        {"role": "user", "content": prompt}
                    ],
                    "temperature": self.settings.temperature,
                });
                if format == ResponseFormat::Json {
                    body["response_format"] = serde_json::json!({"type": "json_object"});
                }
                body
            }
        }
    }

    fn extract_content(&self, response_json: &serde_json::Value) -> Result<String> {
        if let Some(error) = response_json.get("error") {
            return Err(NlqError::Llm(format!("LLM API error: {}", error)));
        }

        let content = match self.settings.provider {
            LlmProvider::Ollama => response_json.get("response").and_then(|r| r.as_str()),
            LlmProvider::OpenAi => {
                let choices = response_json
                    .get("choices")
                    .and_then(|c| c.as_array())
                    .ok_or_else(|| NlqError::Llm("No choices array in LLM response".to_string()))?;
                let first = choices
                    .first()
                    .ok_or_else(|| NlqError::Llm("Empty choices array in LLM response".to_string()))?;
                if first.get("finish_reason").and_then(|r| r.as_str()) == Some("length") {
                    warn!("LLM response was truncated due to length limit");
                }
                first["message"]["content"].as_str()
            }
        };

        content
            .map(|c| c.to_string())
            .ok_or_else(|| NlqError::Llm(format!("No content in LLM response: {}", response_json)))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String> {
        debug!(model = %self.settings.model, ?format, prompt_len = prompt.len(), "calling LLM");

        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, format));

        if let Some(key) = &self.settings.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NlqError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NlqError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NlqError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        self.extract_content(&response_json)
    }
}
