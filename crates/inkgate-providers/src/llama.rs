//! LLaMA-2 chat models on the Hugging Face inference API.
//!
//! The endpoint takes a single prompt string, so system and user prompt are
//! folded into the Llama-2 chat template. Streaming uses text-generation
//! token events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use inkgate_core::{AdapterInitError, ProviderCallError};

use crate::http::{read_json, send_checked};
use crate::sse::{sse_events, SseEvent};
use crate::stream::{normalize, parse_event, Frame, FrameError};
use crate::traits::{AdapterBinding, ProviderAdapter, TextStream};

const END_OF_SEQUENCE: &str = "</s>";

pub fn build(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    Ok(Box::new(LlamaAdapter { binding }))
}

/// Llama-2 chat template.
fn format_prompt(prompt: &str, system_prompt: &str) -> String {
    format!("<s>[INST] <<SYS>>{system_prompt}<</SYS>> {prompt} [/INST]")
}

/// Strip the echoed prompt and end-of-sequence markers from generated text.
fn clean_generated(text: &str, formatted_prompt: &str) -> String {
    text.replace(formatted_prompt, "")
        .replace(END_OF_SEQUENCE, "")
        .trim()
        .to_string()
}

#[derive(Debug, Serialize)]
struct Parameters {
    max_new_tokens: u32,
    temperature: f32,
    stop: [&'static str; 1],
    return_full_text: bool,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: Parameters,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct Generated {
    #[serde(default)]
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    text: String,
    #[serde(default)]
    special: bool,
}

#[derive(Debug, Deserialize)]
struct TokenEvent {
    token: Token,
    #[serde(default)]
    generated_text: Option<String>,
}

fn event_frame(provider: &str, event: &SseEvent) -> Result<Frame, FrameError> {
    let value = parse_event(provider, event)?;
    let TokenEvent { token, generated_text } = serde_json::from_value(value)?;

    // The end marker may arrive fused to the last word.
    let text = if token.special {
        String::new()
    } else {
        match token.text.strip_suffix(END_OF_SEQUENCE) {
            Some(rest) => rest.to_string(),
            None => token.text,
        }
    };

    match generated_text {
        Some(_) if text.is_empty() => Ok(Frame::Done),
        Some(_) => Ok(Frame::Last(text)),
        None if text.is_empty() => Ok(Frame::Skip),
        None => Ok(Frame::Text(text)),
    }
}

/// Adapter for a Hugging Face hosted LLaMA-2 chat model.
pub struct LlamaAdapter {
    binding: AdapterBinding,
}

impl LlamaAdapter {
    fn model_url(&self) -> String {
        format!("{}/{}", self.binding.base_url, self.binding.model.trim_start_matches('/'))
    }

    fn request(&self, formatted_prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = InferenceRequest {
            inputs: formatted_prompt,
            parameters: Parameters {
                max_new_tokens: 2048,
                temperature: 0.7,
                stop: [END_OF_SEQUENCE],
                return_full_text: false,
            },
            stream,
        };
        let timeout = if stream {
            self.binding.settings.stream_timeout
        } else {
            self.binding.settings.request_timeout
        };
        self.binding
            .client
            .post(self.model_url())
            .bearer_auth(self.binding.api_key.expose())
            .timeout(timeout)
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for LlamaAdapter {
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
        debug!(provider, model = %self.binding.model, "Calling inference endpoint");

        let formatted = format_prompt(prompt, system_prompt);
        let response = send_checked(provider, self.request(&formatted, false)).await?;
        let body: Vec<Generated> = read_json(provider, response).await?;

        let first = body
            .into_iter()
            .next()
            .ok_or_else(|| ProviderCallError::invalid_response(provider, "response has no generations"))?;
        Ok(clean_generated(&first.generated_text, &formatted))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Opening inference stream");

        let formatted = format_prompt(prompt, system_prompt);
        let response = send_checked(provider, self.request(&formatted, true)).await?;
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
