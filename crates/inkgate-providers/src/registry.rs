//! Provider registry — static specs for all 8 supported providers.
//!
//! Each `ProviderSpec` describes one upstream service: its id, defaults, and
//! the constructor that builds its adapter. Adding a provider is one new
//! table entry.

use inkgate_core::{AdapterInitError, UnsupportedProviderError};

use crate::traits::{AdapterBinding, AdapterParams, ProviderAdapter};
use crate::{anthropic, ernie, gemini, llama, openai_compat, spark};

/// Builds an adapter from validated inputs.
pub type AdapterConstructor = fn(AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError>;

/// Wire protocol family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderFamily {
    /// `POST /chat/completions` with OpenAI request/response shapes.
    OpenAiCompatible,
    /// Anthropic messages API.
    Anthropic,
    /// Google Gemini `generateContent`.
    Gemini,
    /// Provider-specific JSON over plain HTTP with SSE streaming.
    RawHttp,
}

impl ProviderFamily {
    /// Short wire-protocol label for listings and logs.
    pub fn label(self) -> &'static str {
        match self {
            ProviderFamily::OpenAiCompatible => "openai-compatible",
            ProviderFamily::Anthropic => "anthropic-messages",
            ProviderFamily::Gemini => "gemini",
            ProviderFamily::RawHttp => "raw-http",
        }
    }
}

/// What the stored credential must contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialShape {
    /// A single API key or token.
    ApiKey,
    /// `"API_KEY,SECRET_KEY"`.
    KeyAndSecret,
}

// ─────────────────────────────────────────────
// ProviderSpec — static metadata for one provider
// ─────────────────────────────────────────────

/// Static specification describing one provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Registry id (e.g. `"qwen"`), lowercase.
    pub id: &'static str,
    /// Human-readable name for logs. E.g. `"Qwen (DashScope)"`.
    pub display_name: &'static str,
    pub family: ProviderFamily,
    /// Model used when the configuration has none.
    pub default_model: &'static str,
    /// Base URL (or full endpoint for raw-HTTP providers) used when the
    /// configuration has none.
    pub default_base_url: &'static str,
    pub credential: CredentialShape,
    pub constructor: AdapterConstructor,
}

impl ProviderSpec {
    /// Validate the params and construct this provider's adapter.
    pub fn build(
        &'static self,
        params: AdapterParams,
    ) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
        let binding = params.bind(self)?;
        (self.constructor)(binding)
    }

    /// The override if present and non-blank, else the default model.
    pub fn resolve_model(&self, model: Option<&str>) -> String {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model)
            .to_string()
    }

    /// The override if present and non-blank, else the default base URL.
    pub fn resolve_base_url(&self, base_url: Option<&str>) -> String {
        base_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.default_base_url)
            .to_string()
    }
}

// ─────────────────────────────────────────────
// All 8 providers (registry order)
// ─────────────────────────────────────────────

/// Complete list of supported provider specifications, in registry order.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        id: "openai",
        display_name: "OpenAI",
        family: ProviderFamily::OpenAiCompatible,
        default_model: "gpt-3.5-turbo",
        default_base_url: "https://api.openai.com/v1",
        credential: CredentialShape::ApiKey,
        constructor: openai_compat::build_openai,
    },
    // Qwen — DashScope compatible mode
    ProviderSpec {
        id: "qwen",
        display_name: "Qwen (DashScope)",
        family: ProviderFamily::OpenAiCompatible,
        default_model: "qwen-plus",
        default_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        credential: CredentialShape::ApiKey,
        constructor: openai_compat::build_qwen,
    },
    ProviderSpec {
        id: "anthropic",
        display_name: "Anthropic",
        family: ProviderFamily::Anthropic,
        default_model: "claude-3-haiku-20240307",
        default_base_url: "https://api.anthropic.com",
        credential: CredentialShape::ApiKey,
        constructor: anthropic::build,
    },
    ProviderSpec {
        id: "gemini",
        display_name: "Google Gemini",
        family: ProviderFamily::Gemini,
        default_model: "gemini-pro",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        credential: CredentialShape::ApiKey,
        constructor: gemini::build,
    },
    // Ernie — Baidu native API, credential is "API_KEY,SECRET_KEY"
    ProviderSpec {
        id: "ernie",
        display_name: "Baidu Ernie",
        family: ProviderFamily::RawHttp,
        default_model: "ernie-bot-4",
        default_base_url:
            "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions_pro",
        credential: CredentialShape::KeyAndSecret,
        constructor: ernie::build,
    },
    ProviderSpec {
        id: "spark",
        display_name: "iFlytek Spark",
        family: ProviderFamily::RawHttp,
        default_model: "spark-4.0",
        default_base_url: "https://spark-api-open.xf-yun.com/v1/chat/completions",
        credential: CredentialShape::ApiKey,
        constructor: spark::build,
    },
    // GLM — Zhipu OpenAI-compatible endpoint
    ProviderSpec {
        id: "glm",
        display_name: "Zhipu GLM",
        family: ProviderFamily::OpenAiCompatible,
        default_model: "glm-4",
        default_base_url: "https://open.bigmodel.cn/api/paas/v4",
        credential: CredentialShape::ApiKey,
        constructor: openai_compat::build_glm,
    },
    // LLaMA — Hugging Face Inference API
    ProviderSpec {
        id: "llama",
        display_name: "LLaMA (Hugging Face)",
        family: ProviderFamily::RawHttp,
        default_model: "meta-llama/Llama-2-7b-chat-hf",
        default_base_url: "https://api-inference.huggingface.co/models",
        credential: CredentialShape::ApiKey,
        constructor: llama::build,
    },
];

// ─────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────

/// Find a provider spec by id (case-insensitive, surrounding whitespace ignored).
pub fn find_by_id(id: &str) -> Option<&'static ProviderSpec> {
    let id = id.trim();
    PROVIDERS.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}

/// Resolve a provider id, or explain which ids are supported.
pub fn resolve(id: &str) -> Result<&'static ProviderSpec, UnsupportedProviderError> {
    find_by_id(id).ok_or_else(|| UnsupportedProviderError {
        requested: id.to_string(),
        supported: supported_providers().into_iter().map(String::from).collect(),
    })
}

/// All supported provider ids, in registry order.
pub fn supported_providers() -> Vec<&'static str> {
    PROVIDERS.iter().map(|s| s.id).collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
