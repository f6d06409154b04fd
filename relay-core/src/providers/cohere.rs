//! Cohere v2 chat dialect
//!
//! Request messages look like chat-completions, but the reply carries its
//! text as an array of content blocks under `message.content` and reports
//! usage under `usage.tokens`.

use super::adapter::{endpoint, token_count, BackendReply, Dialect, DialectAdapter, WireRequest};
use super::error::Failure;
use super::openai::converter::from_openai_tool_call;
use super::openai::types::OpenAIToolCall;
use super::registry::BackendDescriptor;
use crate::config::SecretString;
use crate::protocol::{CanonicalRequest, Role, TokenUsage};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Clone, Copy)]
pub struct CohereAdapter;

#[derive(Debug, Deserialize)]
struct CohereResponse {
    message: CohereMessage,
    #[serde(default)]
    usage: Option<CohereUsage>,
}

#[derive(Debug, Deserialize)]
struct CohereMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct CohereContent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CohereUsage {
    #[serde(default)]
    tokens: Option<Value>,
}

impl DialectAdapter for CohereAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Cohere
    }

    fn encode(
        &self,
        request: &CanonicalRequest,
        model: &str,
        descriptor: &BackendDescriptor,
        credential: Option<&SecretString>,
    ) -> WireRequest {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in &request.turns {
            let role = match turn.role {
                Role::Assistant => "assistant",
                Role::User | Role::Tool => "user",
            };
            messages.push(json!({"role": role, "content": turn.text}));
        }

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description.clone().unwrap_or_default(),
                            "parameters": tool.parameters.clone().unwrap_or_else(|| json!({"type": "object"})),
                        }
                    })
                })
                .collect();
        }

        WireRequest::new(endpoint(&descriptor.base_url, "chat"), body)
            .with_bearer(credential)
            .with_descriptor_headers(descriptor)
    }

    fn decode_body(&self, body: &Value) -> Result<BackendReply, Failure> {
        let response: CohereResponse = serde_json::from_value(body.clone())
            .map_err(|e| Failure::bad_response(format!("unexpected response shape: {}", e)))?;

        let text = response
            .message
            .content
            .into_iter()
            .filter(|c| c.kind.as_deref().map_or(true, |k| k == "text"))
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        let tool_calls = response
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| from_openai_tool_call(i, call))
            .collect();

        let usage = response
            .usage
            .and_then(|u| u.tokens)
            .map(|tokens| {
                let prompt_tokens = token_count(&tokens["input_tokens"]);
                let completion_tokens = token_count(&tokens["output_tokens"]);
                TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: None,
                }
            })
            .unwrap_or_default();

        Ok(BackendReply {
            text,
            tool_calls,
            usage,
            model: None,
        })
    }
}
