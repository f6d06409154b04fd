//! OpenAI-compatible chat-completions dialect

pub mod converter;
pub mod types;

use crate::config::SecretString;
use crate::protocol::CanonicalRequest;
use crate::providers::adapter::{endpoint, BackendReply, Dialect, DialectAdapter, WireRequest};
use crate::providers::error::Failure;
use crate::providers::registry::BackendDescriptor;
use serde_json::Value;

pub use types::{OpenAIRequest, OpenAIResponse};

/// Adapter for `POST {base}/chat/completions` with bearer auth
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiAdapter;

impl DialectAdapter for OpenAiAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::OpenAiCompatible
    }

    fn encode(
        &self,
        request: &CanonicalRequest,
        model: &str,
        descriptor: &BackendDescriptor,
        credential: Option<&SecretString>,
    ) -> WireRequest {
        let body = serde_json::to_value(converter::to_openai_request(request, model))
            .unwrap_or(Value::Null);
        WireRequest::new(endpoint(&descriptor.base_url, "chat/completions"), body)
            .with_bearer(credential)
            .with_descriptor_headers(descriptor)
    }

    fn decode_body(&self, body: &Value) -> Result<BackendReply, Failure> {
        let response: OpenAIResponse = serde_json::from_value(body.clone())
            .map_err(|e| Failure::bad_response(format!("unexpected response shape: {}", e)))?;
        converter::from_openai_response(response)
    }
}
