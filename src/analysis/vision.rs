use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::analysis::strategy::AnalysisStrategy;

/// What a vision call returns: the machine-parseable payload (when the model
/// produced valid JSON) plus the original text for audit.
#[derive(Debug, Clone)]
pub struct RawVisionResponse {
    pub structured: Option<Value>,
    pub text: Option<String>,
}

impl RawVisionResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let structured = crate::analysis::parser::parse_lenient_json(&text);
        Self { structured, text: Some(text) }
    }
}

#[async_trait]
pub trait VisionAiService: Send + Sync {
    async fn analyze(&self, image: Bytes) -> anyhow::Result<RawVisionResponse> {
        self.analyze_with_strategy(image, &AnalysisStrategy::Basic).await
    }

    async fn analyze_with_strategy(
        &self,
        image: Bytes,
        strategy: &AnalysisStrategy,
    ) -> anyhow::Result<RawVisionResponse>;
}

/// OpenAI-compatible chat-completions client with image input.
#[derive(Clone)]
pub struct OpenAiVisionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiVisionClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl VisionAiService for OpenAiVisionClient {
    async fn analyze_with_strategy(
        &self,
        image: Bytes,
        strategy: &AnalysisStrategy,
    ) -> anyhow::Result<RawVisionResponse> {
        let mime = if image.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else {
            "image/jpeg"
        };
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": strategy.analysis_prompt()},
                {"role": "user", "content": [
                    {"type": "text", "text": strategy.user_message()},
                    {"type": "image_url", "image_url": {
                        "url": format!("data:{mime};base64,{image_b64}")
                    }}
                ]}
            ],
            "response_format": {"type": "json_object"},
            "max_tokens": 2000
        });

        tracing::debug!(strategy = strategy.name(), model = %self.model, "vision request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("vision request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("vision service returned {status}: {detail}"));
        }

        let data: Value = response.json().await.context("vision response not JSON")?;
        let content = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("vision response has no message content"))?;

        Ok(RawVisionResponse::from_text(content))
    }
}
