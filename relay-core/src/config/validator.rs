//! Cross-field configuration rules

use super::error::ValidationError;
use super::schema::GatewayConfig;
use crate::protocol::Capability;
use crate::providers::mode::{Mode, TOOLS_CHAIN_SUFFIX};
use tracing::warn;

/// Configuration validator with rules that span several sections
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run structural validation, then the cross-field rules
    pub fn validate(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.validate_fallback_chain(config)?;
        self.validate_dialect_capabilities(config)?;
        self.validate_tool_chains(config)?;
        self.validate_cooldown_ordering(config)?;
        self.warn_on_keyless_backends(config);

        Ok(())
    }

    /// The router falls back to the `normal` chain, so it must exist
    fn validate_fallback_chain(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        let fallback = Mode::Normal.chain_name();
        if !config.chains.contains_key(fallback) {
            return Err(ValidationError::required(format!("chains.{}", fallback))
                .with_context("the router falls back to this chain"));
        }
        Ok(())
    }

    /// Native tool calling can only be declared on dialects that encode tools
    fn validate_dialect_capabilities(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        for (i, backend) in config.backends.iter().enumerate() {
            if backend.capabilities.contains(&Capability::ToolCalling)
                && !backend.dialect.supports_tools()
            {
                return Err(ValidationError::incompatible(
                    format!("backends[{}].capabilities", i),
                    format!(
                        "dialect '{}' cannot carry tool definitions",
                        backend.dialect.as_str()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Every entry of a `*-tools` chain must name a tool-calling backend
    fn validate_tool_chains(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        for (name, entries) in &config.chains {
            if !name.ends_with(TOOLS_CHAIN_SUFFIX) {
                continue;
            }
            for (i, entry) in entries.iter().enumerate() {
                let declares_tools = config
                    .backend(&entry.backend)
                    .map(|b| b.capabilities.contains(&Capability::ToolCalling))
                    .unwrap_or(false);
                if !declares_tools {
                    return Err(ValidationError::invalid_value(
                        format!("chains.{}[{}].backend", name, i),
                        "backend declaring tool_calling",
                        entry.backend.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// An auth cool-down must outlast any jittered retryable cool-down
    fn validate_cooldown_ordering(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        let health = &config.health;
        let longest_retryable = health.max_cooldown_ms as f64 * (1.0 + health.jitter_factor);
        if (health.auth_cooldown_ms as f64) <= longest_retryable {
            return Err(ValidationError::incompatible(
                "health.auth_cooldown_ms",
                format!(
                    "must exceed max_cooldown_ms * (1 + jitter_factor) = {:.0}",
                    longest_retryable
                ),
            ));
        }
        Ok(())
    }

    fn warn_on_keyless_backends(&self, config: &GatewayConfig) {
        for backend in &config.backends {
            if backend.credential.is_none() && backend.credential_optional {
                warn!(
                    backend = %backend.name,
                    "credential_optional is set but no credential key is configured"
                );
            }
        }
    }
}
