use async_trait::async_trait;
use serde_json::{json, Value};

use anyhow::{anyhow, Context};

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> anyhow::Result<String>;
}

/// Best-effort translation: on any failure the original text is kept and the
/// error is only logged. Never allowed to block or fail the analysis pipeline.
pub async fn translate_or_keep(
    translator: &dyn Translator,
    text: &str,
    target_lang: &str,
) -> String {
    match translator.translate(text, target_lang).await {
        Ok(translated) => translated,
        Err(e) => {
            tracing::warn!(error = %e, text, "translation failed, keeping original");
            text.to_string()
        }
    }
}

/// Chat-completions-backed translator sharing the vision service's API.
#[derive(Clone)]
pub struct ChatTranslator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatTranslator {
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
impl Translator for ChatTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": format!(
                    "Translate the food or dish name the user sends into {target_lang}. \
                     Respond with the translation only, no quotes, no explanation."
                )},
                {"role": "user", "content": text}
            ],
            "max_tokens": 100
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("translation request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("translation service returned {}", response.status());
        }

        let data: Value = response.json().await.context("translation response not JSON")?;
        data.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("translation response has no content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Translator for Failing {
        async fn translate(&self, _text: &str, _lang: &str) -> anyhow::Result<String> {
            Err(anyhow!("service down"))
        }
    }

    struct Upper;

    #[async_trait]
    impl Translator for Upper {
        async fn translate(&self, text: &str, _lang: &str) -> anyhow::Result<String> {
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn failures_keep_the_original_text() {
        assert_eq!(translate_or_keep(&Failing, "Paella", "de").await, "Paella");
    }

    #[tokio::test]
    async fn success_replaces_the_text() {
        assert_eq!(translate_or_keep(&Upper, "paella", "de").await, "PAELLA");
    }
}
