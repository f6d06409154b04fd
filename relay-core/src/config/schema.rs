//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use crate::protocol::Capability;
use crate::providers::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// The only schema version this crate understands
pub const SUPPORTED_VERSION: &str = "0.1";

/// Longest configurable cool-down (7 days) in milliseconds
pub const MAX_COOLDOWN_LIMIT_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Root configuration of the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Backend descriptors
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Named chains (mode name -> ordered backend/model pairs)
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<ChainEntryConfig>>,

    /// Cool-down policy
    #[serde(default)]
    pub health: HealthConfig,

    /// Per-attempt timeout policy
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Response post-processing
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// HTTP connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// One inference backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Unique backend name
    pub name: String,

    /// Base URL of the backend API
    pub base_url: String,

    /// Wire format spoken by the backend
    pub dialect: Dialect,

    /// Lookup key handed to the credential source (never the secret itself)
    #[serde(default)]
    pub credential: Option<String>,

    /// The backend also works anonymously; the credential is sent when present
    #[serde(default)]
    pub credential_optional: bool,

    /// Declared capabilities
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Requests allowed per rolling minute
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    /// Attempts allowed in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Model used when a chain entry gives no override
    pub default_model: String,

    /// Static headers added to every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// One `(backend, model)` entry of a chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChainEntryConfig {
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChainEntryConfig {
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            model: Some(model.into()),
        }
    }
}

/// Cool-down policy knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Consecutive retryable failures before a cool-down starts
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// First cool-down window in milliseconds
    #[serde(default = "default_base_cooldown")]
    pub base_cooldown_ms: u64,

    /// Growth factor for each failure beyond the threshold
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for retryable cool-downs in milliseconds
    #[serde(default = "default_max_cooldown")]
    pub max_cooldown_ms: u64,

    /// Cool-down applied after an auth failure in milliseconds
    #[serde(default = "default_auth_cooldown")]
    pub auth_cooldown_ms: u64,

    /// Random spread applied to retryable windows (0.0 - 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            base_cooldown_ms: default_base_cooldown(),
            backoff_multiplier: default_backoff_multiplier(),
            max_cooldown_ms: default_max_cooldown(),
            auth_cooldown_ms: default_auth_cooldown(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// How the caller's budget is split between attempts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Share of the caller's total budget one non-final attempt may use
    #[serde(default = "default_attempt_fraction")]
    pub attempt_timeout_fraction: f64,

    /// Hard cap for a single attempt in milliseconds
    #[serde(default = "default_max_attempt_timeout")]
    pub max_attempt_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_fraction: default_attempt_fraction(),
            max_attempt_timeout_ms: default_max_attempt_timeout(),
        }
    }
}

impl OrchestratorConfig {
    pub fn max_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.max_attempt_timeout_ms)
    }
}

/// Response post-processing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Longest content returned, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Appended when content is cut
    #[serde(default = "default_truncation_marker")]
    pub truncation_marker: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
            truncation_marker: default_truncation_marker(),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// Keep-alive timeout in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            max_idle_per_host: default_max_idle(),
            keepalive_secs: default_keepalive(),
        }
    }
}

// Default value functions for serde
fn default_max_concurrent() -> u32 { 4 }
fn default_failure_threshold() -> u32 { 3 }
fn default_base_cooldown() -> u64 { 30_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_max_cooldown() -> u64 { 600_000 }
fn default_auth_cooldown() -> u64 { 1_800_000 }
fn default_jitter_factor() -> f64 { 0.1 }
fn default_attempt_fraction() -> f64 { 0.5 }
fn default_max_attempt_timeout() -> u64 { 60_000 }
fn default_max_message_chars() -> usize { 2000 }
fn default_truncation_marker() -> String { "…".to_string() }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_max_idle() -> usize { 10 }
fn default_keepalive() -> u64 { 90 }

impl GatewayConfig {
    /// Structural validation; cross-field rules live in `ConfigValidator`
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != SUPPORTED_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: SUPPORTED_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        if self.backends.is_empty() {
            return Err(ValidationError::required("backends")
                .with_context("At least one backend must be configured"));
        }

        let mut seen_names = HashSet::new();
        for (i, backend) in self.backends.iter().enumerate() {
            if !seen_names.insert(backend.name.as_str()) {
                return Err(ValidationError::duplicate(
                    format!("backends[{}].name", i),
                    backend.name.clone(),
                ));
            }
            backend.validate(&format!("backends[{}]", i))?;
        }

        if self.chains.is_empty() {
            return Err(ValidationError::required("chains")
                .with_context("At least one chain must be configured"));
        }

        for (name, entries) in &self.chains {
            self.validate_chain(name, entries)?;
        }

        self.health.validate("health")?;
        self.orchestrator.validate("orchestrator")?;
        self.normalizer.validate("normalizer")?;

        Ok(())
    }

    /// Look up a backend by name
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    fn validate_chain(&self, name: &str, entries: &[ChainEntryConfig]) -> Result<(), ValidationError> {
        let path = format!("chains.{}", name);
        if name.is_empty() {
            return Err(ValidationError::required(path).with_context("chain name is empty"));
        }
        if entries.is_empty() {
            return Err(ValidationError::required(path)
                .with_context("A chain needs at least one backend"));
        }

        let mut seen_pairs = HashSet::new();
        for (i, entry) in entries.iter().enumerate() {
            let entry_path = format!("{}[{}]", path, i);
            let backend = self.backend(&entry.backend).ok_or_else(|| {
                ValidationError::unknown_reference(
                    format!("{}.backend", entry_path),
                    entry.backend.clone(),
                )
            })?;

            if matches!(&entry.model, Some(m) if m.is_empty()) {
                return Err(ValidationError::required(format!("{}.model", entry_path)));
            }

            let model = entry.model.as_deref().unwrap_or(&backend.default_model);
            if !seen_pairs.insert((entry.backend.as_str(), model)) {
                return Err(ValidationError::duplicate(
                    entry_path,
                    format!("{}/{}", entry.backend, model),
                ));
            }
        }

        Ok(())
    }
}

impl BackendConfig {
    /// Validate backend configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::required(format!("{}.name", path)));
        }

        if self.base_url.is_empty() {
            return Err(ValidationError::required(format!("{}.base_url", path)));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: format!(
                                "URL scheme must be http or https, got: {}",
                                url.scheme()
                            ),
                        },
                    ));
                }
            }
            Err(e) => {
                return Err(ValidationError::new(
                    format!("{}.base_url", path),
                    ValidationErrorKind::InvalidUrl {
                        message: e.to_string(),
                    },
                ));
            }
        }

        if matches!(&self.credential, Some(c) if c.is_empty()) {
            return Err(ValidationError::required(format!("{}.credential", path))
                .with_context("omit the field for keyless backends"));
        }

        if self.default_model.is_empty() {
            return Err(ValidationError::required(format!("{}.default_model", path)));
        }

        if self.max_concurrent == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_concurrent", path),
                "Must be greater than 0",
            ));
        }

        if self.requests_per_minute == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.requests_per_minute", path),
                "Must be greater than 0 when set",
            ));
        }

        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if !seen.insert(capability) {
                return Err(ValidationError::duplicate(
                    format!("{}.capabilities", path),
                    capability.as_str(),
                ));
            }
        }

        Ok(())
    }
}

impl HealthConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.failure_threshold", path),
                "Must be greater than 0",
            ));
        }

        if self.base_cooldown_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.base_cooldown_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.max_cooldown_ms < self.base_cooldown_ms {
            return Err(ValidationError::incompatible(
                format!("{}.max_cooldown_ms", path),
                "Must be >= base_cooldown_ms",
            ));
        }

        for (field, value) in [
            ("max_cooldown_ms", self.max_cooldown_ms),
            ("auth_cooldown_ms", self.auth_cooldown_ms),
        ] {
            if value > MAX_COOLDOWN_LIMIT_MS {
                return Err(ValidationError::out_of_range(
                    format!("{}.{}", path, field),
                    format!("Must be at most {} (7 days)", MAX_COOLDOWN_LIMIT_MS),
                ));
            }
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.backoff_multiplier", path),
                "Must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

impl OrchestratorConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if !(self.attempt_timeout_fraction > 0.0 && self.attempt_timeout_fraction <= 1.0) {
            return Err(ValidationError::out_of_range(
                format!("{}.attempt_timeout_fraction", path),
                "Must be in (0.0, 1.0]",
            ));
        }

        if self.max_attempt_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_attempt_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl NormalizerConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_message_chars <= self.truncation_marker.chars().count() {
            return Err(ValidationError::out_of_range(
                format!("{}.max_message_chars", path),
                "Must be longer than the truncation marker",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str) -> BackendConfig {
        BackendConfig {
            name: name.to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            dialect: Dialect::OpenAiCompatible,
            credential: Some("EXAMPLE_API_KEY".to_string()),
            credential_optional: false,
            capabilities: vec![],
            requests_per_minute: None,
            max_concurrent: 4,
            default_model: "m".to_string(),
            headers: BTreeMap::new(),
        }
    }

    fn config() -> GatewayConfig {
        let mut chains = BTreeMap::new();
        chains.insert("normal".to_string(), vec![ChainEntryConfig::new("a", "m")]);
        GatewayConfig {
            version: "0.1".to_string(),
            backends: vec![backend("a")],
            chains,
            health: HealthConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            normalizer: NormalizerConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_wrong_version() {
        let mut cfg = config();
        cfg.version = "2.0".to_string();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.field_path, "version");
    }

    #[test]
    fn test_duplicate_pair_uses_default_model() {
        let mut cfg = config();
        cfg.chains.insert(
            "normal".to_string(),
            vec![
                ChainEntryConfig::new("a", "m"),
                ChainEntryConfig {
                    backend: "a".to_string(),
                    model: None,
                },
            ],
        );
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.field_path, "chains.normal[1]");
        assert!(matches!(err.kind, ValidationErrorKind::DuplicateValue { .. }));
    }

    #[test]
    fn test_same_backend_different_models_is_fine() {
        let mut cfg = config();
        cfg.chains.insert(
            "normal".to_string(),
            vec![ChainEntryConfig::new("a", "m"), ChainEntryConfig::new("a", "n")],
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_credential_rejected() {
        let mut cfg = config();
        cfg.backends[0].credential = Some(String::new());
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.field_path, "backends[0].credential");
    }

    #[test]
    fn test_attempt_fraction_bounds() {
        let mut cfg = config();
        cfg.orchestrator.attempt_timeout_fraction = 0.0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.field_path, "orchestrator.attempt_timeout_fraction");
    }

    #[test]
    fn test_cooldowns_have_an_upper_bound() {
        let mut cfg = config();
        cfg.health.auth_cooldown_ms = u64::MAX;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.field_path, "health.auth_cooldown_ms");
        assert!(matches!(err.kind, ValidationErrorKind::OutOfRange { .. }));

        let mut cfg = config();
        cfg.health.max_cooldown_ms = MAX_COOLDOWN_LIMIT_MS + 1;
        assert_eq!(cfg.validate().unwrap_err().field_path, "health.max_cooldown_ms");

        let mut cfg = config();
        cfg.health.auth_cooldown_ms = MAX_COOLDOWN_LIMIT_MS;
        assert!(cfg.validate().is_ok());
    }
}
