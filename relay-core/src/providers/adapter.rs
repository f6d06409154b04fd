//! Dialect adapter trait
//!
//! Each wire-protocol family gets one adapter. Adapters are pure translators:
//! `encode` turns a canonical request into a URL, headers and a JSON body,
//! and `decode` turns a status code and raw body into a `BackendReply` or a
//! classified `Failure`. The orchestrator never names a dialect; it reaches
//! adapters only through `Dialect::adapter()`.

use super::cloudflare::CloudflareAdapter;
use super::cohere::CohereAdapter;
use super::error::Failure;
use super::gemini::GeminiAdapter;
use super::generate::GenerateAdapter;
use super::openai::OpenAiAdapter;
use super::registry::BackendDescriptor;
use crate::config::SecretString;
use crate::http::error::classify_status;
use crate::protocol::{CanonicalRequest, TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire protocol families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Dialect {
    /// `POST {base}/chat/completions`
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    /// Cohere v2 `POST {base}/chat`
    #[serde(rename = "cohere")]
    Cohere,
    /// Google `POST {base}/{model}:generateContent`
    #[serde(rename = "gemini")]
    Gemini,
    /// Cloudflare Workers AI `POST {base}/{model}`
    #[serde(rename = "cloudflare")]
    Cloudflare,
    /// Ollama-style `POST {base}/api/generate`
    #[serde(rename = "generate")]
    Generate,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::OpenAiCompatible => "openai_compatible",
            Dialect::Cohere => "cohere",
            Dialect::Gemini => "gemini",
            Dialect::Cloudflare => "cloudflare",
            Dialect::Generate => "generate",
        }
    }

    /// Whether requests in this dialect can carry tool definitions
    pub fn supports_tools(&self) -> bool {
        matches!(self, Dialect::OpenAiCompatible | Dialect::Cohere)
    }

    /// The adapter translating this dialect
    pub fn adapter(&self) -> &'static dyn DialectAdapter {
        static OPENAI: OpenAiAdapter = OpenAiAdapter;
        static COHERE: CohereAdapter = CohereAdapter;
        static GEMINI: GeminiAdapter = GeminiAdapter;
        static CLOUDFLARE: CloudflareAdapter = CloudflareAdapter;
        static GENERATE: GenerateAdapter = GenerateAdapter;

        match self {
            Dialect::OpenAiCompatible => &OPENAI,
            Dialect::Cohere => &COHERE,
            Dialect::Gemini => &GEMINI,
            Dialect::Cloudflare => &CLOUDFLARE,
            Dialect::Generate => &GENERATE,
        }
    }
}

/// Encoded request ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl WireRequest {
    pub fn new(url: String, body: Value) -> Self {
        Self {
            url,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add `Authorization: Bearer ...` when a credential is present
    pub fn with_bearer(self, credential: Option<&SecretString>) -> Self {
        match credential {
            Some(secret) => {
                self.with_header("Authorization", format!("Bearer {}", secret.expose_secret()))
            }
            None => self,
        }
    }

    /// Add the descriptor's static headers
    pub fn with_descriptor_headers(mut self, descriptor: &BackendDescriptor) -> Self {
        for (name, value) in &descriptor.headers {
            self.headers.push((name.clone(), value.clone()));
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A successful backend answer before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendReply {
    /// Raw text, possibly still containing reasoning markup
    pub text: String,
    /// Tool calls returned natively by the backend
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    /// Model reported by the backend, when it reports one
    pub model: Option<String>,
}

/// Translator between the canonical types and one wire dialect
pub trait DialectAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Build the HTTP request for one attempt
    fn encode(
        &self,
        request: &CanonicalRequest,
        model: &str,
        descriptor: &BackendDescriptor,
        credential: Option<&SecretString>,
    ) -> WireRequest;

    /// Extract the reply from a parsed 2xx body
    fn decode_body(&self, body: &Value) -> Result<BackendReply, Failure>;

    /// Classify the status, parse the body and extract the reply
    fn decode(&self, status: u16, body: &[u8]) -> Result<BackendReply, Failure> {
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &String::from_utf8_lossy(body)));
        }

        let parsed: Value = serde_json::from_slice(body)
            .map_err(|e| Failure::bad_response(format!("malformed JSON body: {}", e)))?;
        let reply = self.decode_body(&parsed)?;

        if reply.text.trim().is_empty() && reply.tool_calls.is_empty() {
            return Err(Failure::bad_response("empty content and no tool calls"));
        }
        Ok(reply)
    }
}

/// Join a base URL and a path without doubling the slash
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Read a `u32` token counter that some backends send as a float
pub(crate) fn token_count(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f as u64))
        .and_then(|n| u32::try_from(n).ok())
}
