//! Cloudflare Workers AI dialect
//!
//! `base_url` ends in `/accounts/{account_id}/ai/run`; the model id is the
//! final path segment.

use super::adapter::{endpoint, token_count, BackendReply, Dialect, DialectAdapter, WireRequest};
use super::error::Failure;
use super::registry::BackendDescriptor;
use crate::config::SecretString;
use crate::protocol::{CanonicalRequest, Role, TokenUsage};
use serde_json::{json, Value};

#[derive(Debug, Default, Clone, Copy)]
pub struct CloudflareAdapter;

impl DialectAdapter for CloudflareAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Cloudflare
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

        let mut body = json!({ "messages": messages });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        WireRequest::new(endpoint(&descriptor.base_url, model), body)
            .with_bearer(credential)
            .with_descriptor_headers(descriptor)
    }

    fn decode_body(&self, body: &Value) -> Result<BackendReply, Failure> {
        if body["success"].as_bool() == Some(false) {
            let message = body["errors"][0]["message"]
                .as_str()
                .unwrap_or("success: false");
            return Err(Failure::bad_response(format!("envelope reported failure: {}", message)));
        }

        let result = &body["result"];
        let text = result["response"]
            .as_str()
            .ok_or_else(|| Failure::bad_response("missing result.response"))?;

        let usage = TokenUsage {
            prompt_tokens: token_count(&result["usage"]["prompt_tokens"]),
            completion_tokens: token_count(&result["usage"]["completion_tokens"]),
            total_tokens: token_count(&result["usage"]["total_tokens"]),
        };

        Ok(BackendReply {
            text: text.to_string(),
            tool_calls: Vec::new(),
            usage,
            model: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Turn;
    use crate::providers::error::FailureKind;
    use crate::providers::registry::tests::descriptor;

    #[test]
    fn test_model_is_last_path_segment() {
        let backend = descriptor(
            "cloudflare",
            Dialect::Cloudflare,
            "https://api.cloudflare.com/client/v4/accounts/acc/ai/run",
        );
        let request = CanonicalRequest::new(vec![Turn::user("hi")]);
        let wire = CloudflareAdapter.encode(
            &request,
            "@cf/meta/llama-3.1-8b-instruct",
            &backend,
            Some(&"tok".into()),
        );
        assert_eq!(
            wire.url,
            "https://api.cloudflare.com/client/v4/accounts/acc/ai/run/@cf/meta/llama-3.1-8b-instruct"
        );
        assert_eq!(wire.header("Authorization"), Some("Bearer tok"));
    }

    #[test]
    fn test_success_false_envelope() {
        let body = json!({"success": false, "errors": [{"message": "model not found"}], "result": null});
        let failure = CloudflareAdapter.decode(200, body.to_string().as_bytes()).unwrap_err();
        assert_eq!(failure.kind, FailureKind::BadResponse);
        assert!(failure.detail.contains("model not found"));
    }

    #[test]
    fn test_reads_result_response() {
        let body = json!({"success": true, "result": {"response": "hey"}});
        let reply = CloudflareAdapter.decode(200, body.to_string().as_bytes()).unwrap();
        assert_eq!(reply.text, "hey");
    }
}
