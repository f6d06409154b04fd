//! Gateway facade
//!
//! Wires the registry, health tracker, HTTP client and orchestrator together
//! from one validated `GatewayConfig`.

use crate::config::{ConfigValidator, CredentialSource, GatewayConfig};
use crate::http::{BackendClient, HttpBackendClient};
use crate::protocol::{CanonicalRequest, CanonicalResponse};
use crate::providers::{
    AttemptLog, ChainEntry, FallbackOrchestrator, GatewayError, GatewayResult, HealthPolicy,
    HealthTracker, Normalizer, Registry,
};
use std::sync::Arc;
use tracing::info;

/// Entry point for callers: one `generate` call per logical request
pub struct Gateway {
    orchestrator: FallbackOrchestrator,
}

impl Gateway {
    /// Build a gateway that talks to backends over HTTPS
    pub fn from_config(
        config: &GatewayConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> GatewayResult<Self> {
        let client = HttpBackendClient::with_config(&config.connection, Arc::clone(&credentials))?;
        Self::with_client(config, credentials, Arc::new(client))
    }

    /// Build a gateway around any backend client
    pub fn with_client(
        config: &GatewayConfig,
        credentials: Arc<dyn CredentialSource>,
        client: Arc<dyn BackendClient>,
    ) -> GatewayResult<Self> {
        ConfigValidator::new()
            .validate(config)
            .map_err(|e| GatewayError::Config(e.into()))?;

        let registry = Arc::new(Registry::from_config(config)?);
        let health = Arc::new(HealthTracker::new(HealthPolicy::from(&config.health)));

        info!(
            backends = registry.backends().count(),
            chains = ?registry.chain_names(),
            "gateway ready"
        );

        let orchestrator = FallbackOrchestrator::new(registry, health, client, credentials)
            .with_normalizer(Normalizer::from(&config.normalizer))
            .with_config(config.orchestrator.clone())
            .with_attempt_log(Arc::new(AttemptLog::default()));

        Ok(Self { orchestrator })
    }

    /// Resolve `request` against the chain serving `mode`
    pub async fn generate(
        &self,
        mode: &str,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        self.orchestrator.resolve_mode(mode, request).await
    }

    /// Try `(backend, model)` first, then the mode's chain
    pub async fn generate_with_preference(
        &self,
        mode: &str,
        backend: &str,
        model: &str,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        self.orchestrator
            .resolve_with_preference(mode, ChainEntry::new(backend, model), request)
            .await
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        self.orchestrator.health()
    }

    pub fn attempt_log(&self) -> &Arc<AttemptLog> {
        self.orchestrator.attempt_log()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.orchestrator.registry()
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }
}
