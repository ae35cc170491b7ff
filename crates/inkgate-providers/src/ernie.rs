//! Baidu Ernie (Wenxin Workshop) native API.
//!
//! The stored credential is `"API_KEY,SECRET_KEY"`; both halves are sent as
//! query parameters. Errors may arrive as `error_code`/`error_msg` payloads
//! with HTTP 200, in complete and streaming mode alike.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use inkgate_core::{AdapterInitError, ApiKey, ProviderCallError};

use crate::http::{read_json, send_checked};
use crate::openai_compat::ChatMessage;
use crate::sse::{sse_events, SseEvent};
use crate::stream::{normalize, parse_event, Frame, FrameError};
use crate::traits::{AdapterBinding, ProviderAdapter, TextStream};

pub fn build(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    let (api_key, secret_key) = split_credential(&binding.api_key).ok_or_else(|| {
        AdapterInitError::MalformedCredential {
            provider: binding.provider().to_string(),
        }
    })?;
    Ok(Box::new(ErnieAdapter {
        binding,
        api_key,
        secret_key,
    }))
}

/// Split `"API_KEY,SECRET_KEY"`; both halves must be non-blank.
fn split_credential(credential: &ApiKey) -> Option<(ApiKey, ApiKey)> {
    let (key, secret) = credential.expose().split_once(',')?;
    let (key, secret) = (key.trim(), secret.trim());
    if key.is_empty() || secret.is_empty() {
        return None;
    }
    Some((ApiKey::new(key), ApiKey::new(secret)))
}

#[derive(Debug, Serialize)]
struct ErnieRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    top_p: f32,
    penalty_score: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErnieResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_end: bool,
}

fn event_frame(provider: &str, event: &SseEvent) -> Result<Frame, FrameError> {
    let value = parse_event(provider, event)?;
    let chunk: ErnieResponse = serde_json::from_value(value)?;
    if chunk.is_end {
        Ok(Frame::Last(chunk.result))
    } else {
        Ok(Frame::Text(chunk.result))
    }
}

/// Adapter for Baidu's Ernie chat endpoint.
pub struct ErnieAdapter {
    binding: AdapterBinding,
    api_key: ApiKey,
    secret_key: ApiKey,
}

impl ErnieAdapter {
    fn request(&self, prompt: &str, system_prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = ErnieRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.7,
            top_p: 0.95,
            penalty_score: 1.0,
            stream,
        };
        let timeout = if stream {
            self.binding.settings.stream_timeout
        } else {
            self.binding.settings.request_timeout
        };
        self.binding
            .client
            .post(&self.binding.base_url)
            .query(&[
                ("api_key", self.api_key.expose()),
                ("secret_key", self.secret_key.expose()),
            ])
            .timeout(timeout)
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for ErnieAdapter {
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
        debug!(provider, model = %self.binding.model, "Calling Ernie");

        let response = send_checked(provider, self.request(prompt, system_prompt, false)).await?;
        let body: ErnieResponse = read_json(provider, response).await?;
        Ok(body.result)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Opening Ernie stream");

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::resolve;
    use crate::traits::AdapterParams;
    use futures_util::StreamExt;
    use inkgate_core::CallErrorKind;
    use wiremock::matchers::{body_partial_json, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(key: &str, base: &str) -> AdapterParams {
        AdapterParams::new(ApiKey::new(key), reqwest::Client::new()).with_base_url(Some(base.to_string()))
    }

    fn adapter(base: &str) -> Box<dyn ProviderAdapter> {
        resolve("ernie").unwrap().build(params("ak-123, sk-456", base)).unwrap()
    }

    #[test]
    fn test_credential_must_have_secret() {
        let spec = resolve("ernie").unwrap();
        for bad in ["ak-only", "ak,", ",sk"] {
            let err = spec.build(params(bad, "https://aip.example")).err().unwrap();
            assert!(
                matches!(err, AdapterInitError::MalformedCredential { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_complete_sends_keys_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("api_key", "ak-123"))
            .and(query_param("secret_key", "sk-456"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Say hi" }
                ],
                "top_p": 0.95,
                "penalty_score": 1.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "as-1",
                "result": "Hi.",
                "is_end": true
            })))
            .mount(&server)
            .await;

        let text = adapter(&server.uri()).generate_complete("Say hi", "Be brief.").await.unwrap();
        assert_eq!(text, "Hi.");
    }

    #[tokio::test]
    async fn test_error_payload_with_http_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error_code": 110,
                "error_msg": "Access token invalid or no longer valid"
            })))
            .mount(&server)
            .await;

        let err = adapter(&server.uri()).generate_complete("p", "s").await.unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Authentication);
        assert_eq!(err.code.as_deref(), Some("110"));
    }

    #[tokio::test]
    async fn test_stream_until_is_end() {
        let body: String = [
            r#"{"id":"as-1","result":"He","is_end":false}"#,
            r#"{"id":"as-1","result":"","is_end":false}"#,
            r#"{"id":"as-1","result":"llo","is_end":true}"#,
            r#"{"id":"as-1","result":"never","is_end":false}"#,
        ]
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = adapter(&server.uri()).generate_stream("p", "s").await.unwrap();
        let chunks: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(chunks, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_stream_bare_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error_code": 18,
                "error_msg": "Open api qps request limit reached"
            })))
            .mount(&server)
            .await;

        let mut stream = adapter(&server.uri()).generate_stream("p", "s").await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_rate_limited());
    }
}
