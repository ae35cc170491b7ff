//! Shared HTTP transport — client construction and error mapping.
//!
//! Every adapter sends through [`send_checked`], so status classification and
//! error-body parsing are identical across providers.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use inkgate_core::{AdapterInitError, CallErrorKind, ProviderCallError};

/// Build the shared, connection-pooled client. Credentials are attached per
/// request, never to the client.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client, AdapterInitError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("inkgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterInitError::Transport {
            reason: e.to_string(),
        })
}

/// Map a transport-level failure. The URL is dropped since query strings may
/// carry credentials.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> ProviderCallError {
    let e = e.without_url();
    let kind = if e.is_timeout() {
        CallErrorKind::Timeout
    } else {
        CallErrorKind::Network
    };
    ProviderCallError::new(provider, kind, e.to_string())
}

/// Send a request; non-2xx responses become a classified error.
pub(crate) async fn send_checked(
    provider: &str,
    request: RequestBuilder,
) -> Result<Response, ProviderCallError> {
    let response = request.send().await.map_err(|e| {
        let err = transport_error(provider, e);
        error!(provider, error = %err.message, "HTTP request failed");
        err
    })?;

    let status = response.status();
    if status.is_success() {
        debug!(provider, status = status.as_u16(), "Upstream accepted request");
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    let (code, message) = parse_error_body(&body).unwrap_or_else(|| (None, fallback_message(status, &body)));
    let err = ProviderCallError::from_status(provider, status.as_u16(), code, message);
    error!(
        provider,
        status = status.as_u16(),
        kind = %err.kind,
        code = err.code.as_deref().unwrap_or("-"),
        "API error"
    );
    Err(err)
}

/// Read a complete JSON body, surfacing error payloads returned with 2xx.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: Response,
) -> Result<T, ProviderCallError> {
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        ProviderCallError::invalid_response(provider, format!("response is not JSON: {e}"))
    })?;

    if let Some((code, message)) = embedded_error(&value) {
        return Err(ProviderCallError::from_payload(provider, code, message));
    }

    serde_json::from_value(value).map_err(|e| {
        ProviderCallError::invalid_response(provider, format!("unexpected response shape: {e}"))
    })
}

fn fallback_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", inkgate_core::utils::truncate_string(body, 300))
    }
}

/// Extract `(code, message)` from a provider error body.
pub(crate) fn parse_error_body(body: &str) -> Option<(Option<String>, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    embedded_error(&value)
}

/// Recognize the error payload shapes used by the supported providers:
///
/// - `{"error": {"message", "code" | "type" | "status", "details": [{"reason"}]}}`
///   (OpenAI-compatible, Anthropic, Gemini)
/// - `{"error": "text"}` (Hugging Face)
/// - `{"error_code", "error_msg"}` (Baidu)
/// - `{"code": non-zero, "message"}` (iFlytek)
pub(crate) fn embedded_error(value: &Value) -> Option<(Option<String>, String)> {
    let obj = value.as_object()?;

    match obj.get("error") {
        Some(Value::Object(err)) => {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let reason = err
                .get("details")
                .and_then(Value::as_array)
                .and_then(|details| {
                    details
                        .iter()
                        .find_map(|d| d.get("reason").and_then(Value::as_str))
                });
            let code = reason
                .or_else(|| err.get("code").and_then(Value::as_str))
                .or_else(|| err.get("status").and_then(Value::as_str))
                .or_else(|| err.get("type").and_then(Value::as_str))
                .map(String::from)
                .or_else(|| err.get("code").and_then(Value::as_i64).map(|c| c.to_string()));
            return Some((code, message));
        }
        Some(Value::String(message)) => return Some((None, message.clone())),
        _ => {}
    }

    if let Some(code) = obj.get("error_code").filter(|c| !c.is_null()) {
        let message = obj
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Some((Some(code_string(code)), message));
    }

    match obj.get("code") {
        Some(code) if is_nonzero_code(code) && obj.contains_key("message") => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Some((Some(code_string(code)), message))
        }
        _ => None,
    }
}

fn code_string(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_nonzero_code(code: &Value) -> bool {
    match code {
        Value::Number(n) => n.as_i64() != Some(0),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("success"),
        _ => false,
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
