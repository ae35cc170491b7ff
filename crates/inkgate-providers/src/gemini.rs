//! Google Gemini `generateContent`.
//!
//! Gemini takes no separate system role here: system and user prompt are
//! sent as one user content, separated by a blank line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use inkgate_core::{AdapterInitError, ProviderCallError};

use crate::http::{read_json, send_checked};
use crate::sse::{sse_events, SseEvent};
use crate::stream::{normalize, parse_event, Frame, FrameError};
use crate::traits::{AdapterBinding, ProviderAdapter, TextStream};

pub fn build(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    Ok(Box::new(GeminiAdapter { binding }))
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// The prompt was refused before generation.
    fn blocked(&self, provider: &str) -> Option<ProviderCallError> {
        let reason = self.prompt_feedback.as_ref()?.block_reason.as_ref()?;
        Some(ProviderCallError::from_payload(
            provider,
            Some(reason.clone()),
            format!("prompt blocked: {reason}"),
        ))
    }

    /// Concatenated part texts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn finished(&self) -> bool {
        self.candidates
            .first()
            .is_some_and(|c| c.finish_reason.is_some())
    }
}

fn event_frame(provider: &str, event: &SseEvent) -> Result<Frame, FrameError> {
    let value = parse_event(provider, event)?;
    let response: GenerateResponse = serde_json::from_value(value)?;
    if let Some(err) = response.blocked(provider) {
        return Err(FrameError::Provider(err));
    }
    let text = response.text();
    if response.finished() {
        Ok(Frame::Last(text))
    } else {
        Ok(Frame::Text(text))
    }
}

// ─────────────────────────────────────────────
// GeminiAdapter
// ─────────────────────────────────────────────

/// Adapter for the Gemini REST API.
pub struct GeminiAdapter {
    binding: AdapterBinding,
}

impl GeminiAdapter {
    /// Model path segment; accepts both `gemini-pro` and `models/gemini-pro`.
    fn model_path(&self) -> &str {
        let model = self.binding.model.as_str();
        model.strip_prefix("models/").unwrap_or(model)
    }

    fn url(&self, stream: bool) -> String {
        let base = &self.binding.base_url;
        let model = self.model_path();
        if stream {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    fn request(&self, prompt: &str, system_prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let full_prompt = if system_prompt.trim().is_empty() {
            prompt.to_string()
        } else {
            format!("{system_prompt}\n\n{prompt}")
        };
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: &full_prompt }],
            }],
        };
        let timeout = if stream {
            self.binding.settings.stream_timeout
        } else {
            self.binding.settings.request_timeout
        };
        self.binding
            .client
            .post(self.url(stream))
            .header("x-goog-api-key", self.binding.api_key.expose())
            .timeout(timeout)
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider_id(&self) -> &'static str {
        self.binding.provider()
    }

    fn model(&self) -> &str {
        &self.binding.model
    }

    fn base_url(&self) -> &str {
        &self.binding.base_url
    }

    async fn generate_complete(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Calling generateContent");

        let response = send_checked(provider, self.request(prompt, system_prompt, false)).await?;
        let body: GenerateResponse = read_json(provider, response).await?;
        if let Some(err) = body.blocked(provider) {
            return Err(err);
        }
        if body.candidates.is_empty() {
            return Err(ProviderCallError::invalid_response(provider, "response has no candidates"));
        }
        Ok(body.text())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Opening streamGenerateContent");

        let response = send_checked(provider, self.request(prompt, system_prompt, true)).await?;
        Ok(normalize(
            provider,
            sse_events(provider, response),
            self.binding.settings.max_malformed_events,
            move |event| event_frame(provider, event),
        ))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
