use super::{Classifier, ClassifyRequest, build_prompt};
use crate::errors::RolodexError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Classifier backed by Gemini's `generateContent`, asking for a JSON body.
pub struct GeminiClassifier {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiClassifier {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| BASE_URL.to_string()),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: &str, base_url: String) -> Self {
        Self::new(api_key.to_string(), None, Some(base_url))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn parse_response(json: &Value) -> Result<String> {
        let candidate = json["candidates"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No candidates in Gemini response")?;

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate["finishReason"].as_str().unwrap_or("unknown");
            anyhow::bail!("Gemini returned no text (finish reason: {reason})");
        }
        Ok(text)
    }
}

/// Map a non-success HTTP status into a typed error.
async fn check_http_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    warn!("Gemini request failed ({}): {}", status, detail);
    let err = match status.as_u16() {
        401 | 403 => RolodexError::Auth(format!("Gemini rejected the API key: {detail}")),
        429 => RolodexError::Classifier {
            message: format!("Rate limit exceeded: {detail}"),
            retryable: true,
        },
        code => RolodexError::Classifier {
            message: format!("API error ({code}): {detail}"),
            retryable: matches!(code, 500 | 502 | 503 | 504),
        },
    };
    Err(err.into())
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<String> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": build_prompt(&request)}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json"
            }
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let resp = check_http_status(resp).await?;
        let json: Value = resp
            .json()
            .await
            .context("Failed to parse Gemini API response")?;
        let text = Self::parse_response(&json)?;
        debug!("classifier returned {} bytes", text.len());
        Ok(text)
    }
}
