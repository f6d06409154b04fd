//! Gateway configuration
//!
//! Loading runs in three steps: `${VAR}` placeholders are interpolated from
//! the environment, the text is parsed as YAML or JSON, and the result goes
//! through `ConfigValidator`.

mod catalog;
mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use catalog::builtin_config;
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    BackendConfig, ChainEntryConfig, ConnectionConfig, GatewayConfig, HealthConfig,
    NormalizerConfig, OrchestratorConfig, MAX_COOLDOWN_LIMIT_MS, SUPPORTED_VERSION,
};
pub use secrets::{CredentialSource, EnvCredentials, SecretString, StaticCredentials};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_yaml(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_json(&content, &path.to_string_lossy())
}

/// Parse and validate YAML text
pub fn load_from_yaml_str(content: &str) -> ConfigResult<GatewayConfig> {
    parse_yaml(content, "<inline>")
}

/// Parse and validate JSON text
pub fn load_from_json_str(content: &str) -> ConfigResult<GatewayConfig> {
    parse_json(content, "<inline>")
}

fn read(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn parse_yaml(content: &str, origin: &str) -> ConfigResult<GatewayConfig> {
    let interpolated = env::interpolate_env_vars(content)?;

    let config: GatewayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

fn parse_json(content: &str, origin: &str) -> ConfigResult<GatewayConfig> {
    let interpolated = env::interpolate_env_vars(content)?;

    let config: GatewayConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_yaml() {
        let yaml = r#"
version: "0.1"
backends:
  - name: groq
    base_url: https://api.groq.com/openai/v1
    dialect: openai_compatible
    credential: GROQ_API_KEY
    default_model: llama-3.3-70b-versatile
chains:
  normal:
    - backend: groq
"#;
        let config = load_from_yaml_str(yaml).unwrap();
        assert_eq!(config.backends[0].max_concurrent, 4);
        assert_eq!(config.health.failure_threshold, 3);
        assert_eq!(config.normalizer.max_message_chars, 2000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
version: "0.1"
backends: []
chains: {}
retries: 5
"#;
        assert!(matches!(
            load_from_yaml_str(yaml),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
