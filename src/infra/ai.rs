//! OpenAI-compatible chat-completion client.
//!
//! Talks to a DeepInfra-style `/chat/completions` endpoint. The model is
//! instructed to answer with bare JSON, but completions routinely arrive
//! wrapped in a ```json fence or surrounded by prose, so the payload is
//! carved out of the completion text before parsing.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::warn;

use crate::application::drinks::{CompletionBackend, CompletionError};
use crate::config::AiSettings;

use super::error::InfraError;

const SYSTEM_PROMPT: &str = "You are a professional mixologist and culinary expert \
specializing in beverage recipes and food pairing.";

const MAX_COMPLETION_TOKENS: u32 = 1024;

/// How much raw completion text an error may carry.
const PREVIEW_LIMIT: usize = 200;

pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompletionClient {
    pub fn new(settings: &AiSettings) -> Result<Self, InfraError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build completion client: {err}"))
            })?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        image_data_uri: Option<&str>,
    ) -> Result<Value, CompletionError> {
        let payload = json!({
            "model": self.model,
            "messages": chat_messages(prompt, image_data_uri),
            "max_tokens": MAX_COMPLETION_TOKENS,
            // Deterministic answers keep the cache effective.
            "temperature": 0.0,
        });

        let mut request = self.http.post(&self.base_url).json(&payload);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        match response.status() {
            StatusCode::BAD_REQUEST => return Err(CompletionError::InvalidRequest),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(CompletionError::BadCredentials);
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(CompletionError::RateLimited),
            status if !status.is_success() => {
                warn!(
                    target: "sorso::ai",
                    status = status.as_u16(),
                    "completion endpoint answered with an error status"
                );
                return Err(CompletionError::Transport {
                    message: format!("completion endpoint answered {status}"),
                });
            }
            _ => {}
        }

        let completion: Value = response.json().await.map_err(transport_error)?;
        let text = completion_text(&completion).ok_or_else(|| {
            CompletionError::MalformedCompletion {
                preview: preview(&completion.to_string()),
            }
        })?;

        extract_json(text)
    }
}

fn chat_messages(prompt: &str, image_data_uri: Option<&str>) -> Vec<Value> {
    let mut messages = vec![
        json!({"role": "system", "content": SYSTEM_PROMPT}),
        json!({"role": "user", "content": prompt}),
    ];

    // Vision models want the image as a content part next to the text.
    if let Some(image) = image_data_uri {
        messages.push(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": image}},
            ],
        }));
    }

    messages
}

fn completion_text(completion: &Value) -> Option<&str> {
    let choice = completion.get("choices")?.get(0)?;
    choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .or_else(|| choice.get("text").and_then(Value::as_str))
}

/// Parse the JSON payload out of a completion: a fenced ```json block
/// first, then the widest `{...}` span, then the whole text.
fn extract_json(text: &str) -> Result<Value, CompletionError> {
    if let Some(candidate) = candidate_span(text) {
        return serde_json::from_str(candidate.trim()).map_err(|_| {
            CompletionError::MalformedCompletion {
                preview: preview(text),
            }
        });
    }

    serde_json::from_str(text.trim()).map_err(|_| CompletionError::MalformedCompletion {
        preview: preview(text),
    })
}

fn candidate_span(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return Some(&rest[..end]);
        }
    }

    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close >= open).then(|| &text[open..=close])
}

fn transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        return CompletionError::Timeout;
    }
    CompletionError::Transport {
        message: err.to_string(),
    }
}

fn preview(text: &str) -> String {
    let mut rendered = text.to_string();
    if let Some((limit, _)) = rendered.char_indices().nth(PREVIEW_LIMIT) {
        rendered.truncate(limit);
    }
    rendered
}
