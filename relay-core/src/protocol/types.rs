//! Canonical request and response types
//!
//! These structures are the backend-agnostic representation every dialect
//! translates to and from. The design prioritizes:
//! - Type safety through enums and strong typing
//! - Immutability once a request has been handed to the gateway
//! - A single response shape regardless of which backend answered

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Default overall budget for one request when the caller gives none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user input
    User,
    /// Previous model output
    Assistant,
    /// Tool result fed back to the model
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Capabilities a backend may declare and a request may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Native structured tool/function calling
    ToolCalling,
    /// Image inputs
    Vision,
    /// Dedicated reasoning models
    Reasoning,
    /// Answers grounded in live web search
    SearchGrounding,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ToolCalling => "tool_calling",
            Capability::Vision => "vision",
            Capability::Reasoning => "reasoning",
            Capability::SearchGrounding => "search_grounding",
        }
    }
}

/// Ordered set of capabilities
pub type CapabilitySet = BTreeSet<Capability>;

/// One prior turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,

    /// Plain text of the turn
    pub text: String,

    /// Image URLs attached to the turn (vision inputs)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

impl Turn {
    /// Create a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image_urls: Vec::new(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image_urls: Vec::new(),
        }
    }

    /// Create a tool-result turn
    pub fn tool(text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            text: text.into(),
            image_urls: Vec::new(),
        }
    }

    /// Attach an image URL
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_urls.push(url.into());
        self
    }
}

/// Tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Function name
    pub name: String,

    /// What the function does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Structured tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the backend or the normalizer
    pub id: String,

    /// Function to call
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// Backend-agnostic generation request
///
/// Built once per inbound message and only ever borrowed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRequest {
    /// Prior turns, oldest first, ending with the message to answer
    pub turns: Vec<Turn>,

    /// System instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Tools offered to the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether the caller needs native tool calling
    #[serde(default)]
    pub tools_required: bool,

    /// Capabilities required beyond those implied by tools and images
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub extra_capabilities: CapabilitySet,

    /// Overall budget for the whole resolution
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CanonicalRequest {
    /// Create a request from conversation turns
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            system: None,
            tools: Vec::new(),
            tools_required: false,
            extra_capabilities: CapabilitySet::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Offer tools; native tool calling becomes a requirement
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools_required = !tools.is_empty();
        self.tools = tools;
        self
    }

    /// Require an additional capability
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.extra_capabilities.insert(capability);
        self
    }

    /// Set the overall timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens to generate
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// True when any turn carries an image
    pub fn has_vision_inputs(&self) -> bool {
        self.turns.iter().any(|t| !t.image_urls.is_empty())
    }

    /// Capabilities a backend must declare to serve this request
    pub fn required_capabilities(&self) -> CapabilitySet {
        let mut required = self.extra_capabilities.clone();
        if self.tools_required {
            required.insert(Capability::ToolCalling);
        }
        if self.has_vision_inputs() {
            required.insert(Capability::Vision);
        }
        required
    }

    /// Text of the most recent user turn
    pub fn last_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }
}

/// Token accounting reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl TokenUsage {
    /// Total, derived from the parts when the backend omits it
    pub fn total(&self) -> Option<u32> {
        self.total_tokens.or(match (self.prompt_tokens, self.completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        })
    }
}

/// Metrics attached to a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    /// Latency of the winning attempt
    #[serde(with = "duration_ms")]
    pub latency: Duration,

    /// Token usage of the winning attempt
    pub usage: TokenUsage,

    /// Attempts made during the resolution, including the winning one
    pub attempts: usize,
}

/// Backend-agnostic generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    /// Final text for the end user
    pub content: String,

    /// Structured tool calls requested by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Backend that produced the reply
    pub backend: String,

    /// Model that produced the reply
    pub model: String,

    /// True when the reply did not come from the chain's primary pair
    pub fallback_used: bool,

    /// True when the content was cut to the message size limit
    pub truncated: bool,

    /// Latency and token metrics
    pub metrics: ResponseMetrics,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
