//! Protocol module for canonical request/response structures
//!
//! This module defines the backend-agnostic data models the gateway speaks.
//! Every dialect adapter translates to and from these types.

pub mod types;

pub use types::{
    CanonicalRequest, CanonicalResponse, Capability, CapabilitySet, ResponseMetrics, Role,
    TokenUsage, ToolCall, ToolDefinition, Turn, DEFAULT_REQUEST_TIMEOUT,
};
