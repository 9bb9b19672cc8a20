//! Best-effort translation. Any failure returns the original text —
//! translation must never block or corrupt a user-facing flow.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target`. `source` of `None` auto-detects.
    /// Infallible by contract: failures return the input untouched.
    async fn translate(&self, text: &str, target: &str, source: Option<&str>) -> String;
}

/// Client for the public Google translate endpoint.
pub struct GoogleTranslator {
    client: reqwest::Client,
}

impl GoogleTranslator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn try_translate(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, String> {
        let resp = self
            .client
            .get(TRANSLATE_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| e.to_string())?;

        // Response shape: [[[translated, original, ...], ...], ...]
        let segments = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or("unexpected response shape")?;
        let translated: String = segments
            .iter()
            .filter_map(|seg| seg.get(0).and_then(Value::as_str))
            .collect();

        if translated.is_empty() {
            Err("empty translation".to_string())
        } else {
            Ok(translated)
        }
    }
}

impl Default for GoogleTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target: &str, source: Option<&str>) -> String {
        if text.is_empty() {
            return String::new();
        }
        let source = source.unwrap_or("auto");
        if source == target {
            return text.to_string();
        }

        match self.try_translate(text, target, source).await {
            Ok(translated) => translated,
            Err(reason) => {
                warn!(target, "Translation failed, returning original text: {reason}");
                text.to_string()
            }
        }
    }
}

/// Identity translator for tests and for deployments without outbound
/// internet access.
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str, _target: &str, _source: Option<&str>) -> String {
        text.to_string()
    }
}
