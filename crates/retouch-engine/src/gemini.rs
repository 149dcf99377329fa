use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use retouch_contracts::images::ImageData;
use serde_json::{json, Value};

use crate::adapter::{EditAdapter, EditFailure, EditRequest};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    /// `None` leaves the call unbounded.
    pub timeout: Option<Duration>,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            timeout: None,
        }
    }
}

/// Gemini `generateContent` with `responseModalities = ["IMAGE"]`.
pub struct GeminiAdapter {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiAdapter {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn build_payload(request: &EditRequest) -> Value {
        let mut parts = request
            .images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": image.to_base64(),
                    }
                })
            })
            .collect::<Vec<Value>>();
        parts.push(json!({ "text": request.prompt }));
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        })
    }

    /// Maps a decoded response body to an image or a classified failure.
    /// Only the first candidate is considered.
    fn classify_response(payload: &Value) -> Result<ImageData, EditFailure> {
        let candidate = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());
        let parts = candidate
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .filter(|parts| !parts.is_empty());

        let Some(parts) = parts else {
            let finish_reason = candidate
                .and_then(|candidate| candidate.get("finishReason"))
                .and_then(Value::as_str);
            let block_reason = payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str);
            return Err(match (finish_reason, block_reason) {
                (Some("IMAGE_RECITATION") | Some("RECITATION"), _) => {
                    EditFailure::BlockedByRecitation
                }
                (Some("SAFETY"), block) => EditFailure::BlockedBySafety {
                    reason: block.map(str::to_string),
                },
                (Some(finish), _) => EditFailure::EmptyResponse {
                    detail: Some(format!("Reason: {finish}")),
                },
                (None, Some(block)) => EditFailure::EmptyResponse {
                    detail: Some(format!("The model blocked the request due to: {block}")),
                },
                (None, None) => EditFailure::EmptyResponse { detail: None },
            });
        };

        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                EditFailure::TransportError(format!("Gemini image base64 decode failed: {err}"))
            })?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return Ok(ImageData::new(bytes, mime_type));
        }

        Err(EditFailure::EmptyResponse {
            detail: Some("the response did not contain a valid image".to_string()),
        })
    }
}

impl EditAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn edit(&self, request: &EditRequest) -> Result<ImageData, EditFailure> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(EditFailure::TransportError(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            ));
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);

        tracing::debug!(
            endpoint = %endpoint,
            images = request.images.len(),
            "sending Gemini edit request"
        );
        let mut builder = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().map_err(|err| {
            EditFailure::TransportError(format!("Gemini request failed ({endpoint}): {err}"))
        })?;
        let body = response_json_or_error(response)?;
        Self::classify_response(&body)
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, EditFailure> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        EditFailure::TransportError(format!("Gemini response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(EditFailure::TransportError(format!(
            "Gemini request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        EditFailure::TransportError(format!("Gemini returned invalid JSON payload: {err}"))
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
