//! Single-prompt `/api/generate` dialect (Ollama-style, keyless)
//!
//! The backend takes no conversation history: the prompt is the system
//! instruction followed by the most recent user turn.

use super::adapter::{endpoint, token_count, BackendReply, Dialect, DialectAdapter, WireRequest};
use super::error::Failure;
use super::registry::BackendDescriptor;
use crate::config::SecretString;
use crate::protocol::{CanonicalRequest, TokenUsage};
use serde_json::{json, Value};

#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateAdapter;

impl GenerateAdapter {
    fn prompt(request: &CanonicalRequest) -> String {
        let last = request.last_user_text().unwrap_or_default();
        match request.system.as_deref() {
            Some(system) if !system.is_empty() => format!("{}\n\n{}", system, last),
            _ => last.to_string(),
        }
    }
}

impl DialectAdapter for GenerateAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Generate
    }

    fn encode(
        &self,
        request: &CanonicalRequest,
        model: &str,
        descriptor: &BackendDescriptor,
        credential: Option<&SecretString>,
    ) -> WireRequest {
        let mut body = json!({
            "model": model,
            "prompt": Self::prompt(request),
            "stream": false,
        });
        if let Some(temperature) = request.temperature {
            body["options"] = json!({ "temperature": temperature });
        }

        WireRequest::new(endpoint(&descriptor.base_url, "api/generate"), body)
            .with_bearer(credential)
            .with_descriptor_headers(descriptor)
    }

    fn decode_body(&self, body: &Value) -> Result<BackendReply, Failure> {
        let text = body["response"]
            .as_str()
            .ok_or_else(|| Failure::bad_response("missing response field"))?;

        Ok(BackendReply {
            text: text.to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                prompt_tokens: token_count(&body["prompt_eval_count"]),
                completion_tokens: token_count(&body["eval_count"]),
                total_tokens: None,
            },
            model: body["model"].as_str().map(str::to_string),
        })
    }
}
