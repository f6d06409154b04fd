//! Google Gemini `generateContent` dialect

use super::adapter::{endpoint, token_count, BackendReply, Dialect, DialectAdapter, WireRequest};
use super::error::Failure;
use super::registry::BackendDescriptor;
use crate::config::SecretString;
use crate::protocol::{CanonicalRequest, Role, TokenUsage};
use serde_json::{json, Map, Value};

#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiAdapter;

impl DialectAdapter for GeminiAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Gemini
    }

    fn encode(
        &self,
        request: &CanonicalRequest,
        model: &str,
        descriptor: &BackendDescriptor,
        credential: Option<&SecretString>,
    ) -> WireRequest {
        let contents: Vec<Value> = request
            .turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::Assistant => "model",
                    Role::User | Role::Tool => "user",
                };
                json!({"role": role, "parts": [{"text": turn.text}]})
            })
            .collect();

        let mut generation_config = Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }

        let mut body = json!({ "contents": contents });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        let url = endpoint(&descriptor.base_url, &format!("{}:generateContent", model));
        let wire = WireRequest::new(url, body).with_descriptor_headers(descriptor);
        match credential {
            Some(key) => wire.with_header("x-goog-api-key", key.expose_secret()),
            None => wire,
        }
    }

    fn decode_body(&self, body: &Value) -> Result<BackendReply, Failure> {
        let candidate = body["candidates"]
            .get(0)
            .ok_or_else(|| match body["promptFeedback"]["blockReason"].as_str() {
                Some(reason) => Failure::bad_response(format!("prompt blocked: {}", reason)),
                None => Failure::bad_response("response has no candidates"),
            })?;

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| Failure::bad_response("candidate has no content parts"))?;

        let text = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        let metadata = &body["usageMetadata"];
        let usage = TokenUsage {
            prompt_tokens: token_count(&metadata["promptTokenCount"]),
            completion_tokens: token_count(&metadata["candidatesTokenCount"]),
            total_tokens: token_count(&metadata["totalTokenCount"]),
        };

        Ok(BackendReply {
            text,
            tool_calls: Vec::new(),
            usage,
            model: body["modelVersion"].as_str().map(str::to_string),
        })
    }
}
