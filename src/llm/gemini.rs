//! Gemini-style `generateContent` REST client.
//!
//! Implements [`GenerativeModel`](super::GenerativeModel) over the plain
//! (non-streaming) JSON endpoint. Images travel as inline base64 parts.

use crate::config::ModelConfig;
use crate::error::{PrompterError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{GenerativeModel, ImagePayload};

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent via the `x-goog-api-key` header.
    pub api_key: String,
    /// Base URL (defaults to the public endpoint).
    pub base_url: String,
    /// Model name, e.g. `gemini-flash-lite-latest`.
    pub model: String,
}

impl GeminiConfig {
    /// Create a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: model.into(),
        }
    }

    /// Set a custom base URL (used by tests to point at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl From<&ModelConfig> for GeminiConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.api_url.clone(),
            model: config.model.clone(),
        }
    }
}

/// Response envelope for `generateContent`.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Gemini-backed implementation of [`GenerativeModel`].
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!(
            "{base}/v1beta/models/{model}:generateContent",
            model = self.config.model
        )
    }

    async fn generate_content(&self, parts: Vec<serde_json::Value>) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": parts }],
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PrompterError::Service(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PrompterError::Service(format!(
                "model returned {status}: {detail}"
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PrompterError::Service(format!("invalid model response: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(PrompterError::Service(
                "model response carried no text".to_owned(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_content(vec![json!({ "text": prompt })]).await
    }

    async fn generate_with_image(&self, prompt: &str, image: &ImagePayload) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
        self.generate_content(vec![
            json!({ "text": prompt }),
            json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": encoded,
                }
            }),
        ])
        .await
    }
}
