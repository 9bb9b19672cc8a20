//! Text/vision generation via the Anthropic Messages API.
//!
//! Hand-rolled reqwest client over the HTTP API, same shape as the other
//! provider clients in this crate.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::LlmError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A base64-encoded image for vision prompts.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// e.g. `image/jpeg`.
    pub media_type: String,
    pub base64: String,
}

/// Opaque "generate text from prompt" capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

/// Anthropic Messages API client.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: SecretString, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
        }
    }

    async fn request(
        &self,
        content: serde_json::Value,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": content}],
        });

        let resp = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("{status}: {detail}")));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parsed
            .content
            .first()
            .map(|block| block.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("empty content".to_string()))
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.request(json!(prompt), max_tokens).await
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let content = json!([
            {
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.base64,
                }
            },
            {"type": "text", "text": prompt},
        ]);
        self.request(content, max_tokens).await
    }
}

/// Pull a JSON object out of generated text, tolerating code fences and
/// prose around the payload. Parse failures degrade to an empty object.
pub fn extract_json(text: &str) -> serde_json::Value {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    };

    serde_json::from_str(candidate).unwrap_or_else(|e| {
        warn!("Model did not return parseable JSON: {e}");
        json!({})
    })
}

/// Run a prompt that is expected to answer with JSON; degrades to `{}`
/// on generation failure or unparseable output.
pub async fn generate_structured(
    llm: &dyn TextGenerator,
    prompt: &str,
    max_tokens: u32,
) -> serde_json::Value {
    match llm.generate(prompt, max_tokens).await {
        Ok(text) => extract_json(&text),
        Err(e) => {
            warn!("Structured generation failed: {e}");
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_plain_object() {
        let v = extract_json(r#"{"crop": "Wheat", "qty": 2}"#);
        assert_eq!(v["crop"], "Wheat");
        assert_eq!(v["qty"], 2);
    }

    #[test]
    fn extract_json_with_fences_and_prose() {
        let v = extract_json(
            "Here is the data you asked for:\n```json\n{\"name\": \"Ramesh\"}\n```\nLet me know!",
        );
        assert_eq!(v["name"], "Ramesh");
    }

    #[test]
    fn extract_json_garbage_degrades_to_empty() {
        let v = extract_json("I could not find anything useful.");
        assert_eq!(v, json!({}));
    }

    #[test]
    fn extract_json_surrounding_text() {
        let v = extract_json("prefix {\"a\": 1} suffix");
        assert_eq!(v["a"], 1);
    }
}
