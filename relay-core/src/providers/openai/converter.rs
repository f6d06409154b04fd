//! Conversion between the canonical types and chat-completions

use super::types::*;
use crate::protocol::{CanonicalRequest, Role, TokenUsage, ToolCall, ToolDefinition, Turn};
use crate::providers::adapter::BackendReply;
use crate::providers::error::Failure;

/// Convert a canonical request to a chat-completions body
pub fn to_openai_request(request: &CanonicalRequest, model: &str) -> OpenAIRequest {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(system) = &request.system {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(OpenAIContent::Text(system.clone())),
            tool_calls: None,
        });
    }
    messages.extend(request.turns.iter().map(to_openai_message));

    OpenAIRequest {
        model: model.to_string(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        tools: if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(to_openai_tool).collect())
        },
        stream: false,
    }
}

fn to_openai_message(turn: &Turn) -> OpenAIMessage {
    let content = if turn.image_urls.is_empty() {
        OpenAIContent::Text(turn.text.clone())
    } else {
        let mut parts = vec![OpenAIContentPart::Text {
            text: turn.text.clone(),
        }];
        parts.extend(turn.image_urls.iter().map(|url| OpenAIContentPart::ImageUrl {
            image_url: OpenAIImageUrl { url: url.clone() },
        }));
        OpenAIContent::Parts(parts)
    };

    OpenAIMessage {
        // Tool results without a call id are rejected by most backends, so
        // they travel as user turns.
        role: match turn.role {
            Role::User | Role::Tool => "user".to_string(),
            Role::Assistant => "assistant".to_string(),
        },
        content: Some(content),
        tool_calls: None,
    }
}

fn to_openai_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Convert a chat-completions response into a backend reply
pub fn from_openai_response(response: OpenAIResponse) -> Result<BackendReply, Failure> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Failure::bad_response("response has no choices"))?;

    let text = match choice.message.content {
        Some(OpenAIContent::Text(text)) => text,
        Some(OpenAIContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|part| match part {
                OpenAIContentPart::Text { text } => Some(text),
                OpenAIContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        None => String::new(),
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, call)| from_openai_tool_call(i, call))
        .collect();

    let usage = response
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(BackendReply {
        text,
        tool_calls,
        usage,
        model: response.model,
    })
}

pub(crate) fn from_openai_tool_call(index: usize, call: OpenAIToolCall) -> ToolCall {
    let arguments = match call.function.arguments {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => "{}".to_string(),
        other => other.to_string(),
    };
    ToolCall {
        id: call.id.unwrap_or_else(|| format!("call_{}", index)),
        name: call.function.name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_goes_first() {
        let request = CanonicalRequest::new(vec![Turn::user("hello")]).with_system("be brief");
        let body = serde_json::to_value(to_openai_request(&request, "m")).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["stream"], false);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_images_become_parts() {
        let request =
            CanonicalRequest::new(vec![Turn::user("what is it").with_image("https://img/x.png")]);
        let body = serde_json::to_value(to_openai_request(&request, "m")).unwrap();
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "https://img/x.png");
    }

    #[test]
    fn test_object_arguments_are_stringified() {
        let response: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "function": {"name": "get_time", "arguments": {"tz": "Asia/Jakarta"}}
                    }]
                }
            }]
        }))
        .unwrap();
        let reply = from_openai_response(response).unwrap();
        assert_eq!(reply.tool_calls[0].id, "call_0");
        assert_eq!(reply.tool_calls[0].arguments, r#"{"tz":"Asia/Jakarta"}"#);
        assert!(reply.text.is_empty());
    }
}
