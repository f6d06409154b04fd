//! Fallback orchestration across a chain of backends
//!
//! A resolution walks the eligible `(backend, model)` pairs of one chain in
//! order and stops at the first success. Attempts are strictly sequential.
//! Per-backend failures are recorded in the shared `HealthTracker` and the
//! attempt log; only `ChainExhausted` and `DeadlineExceeded` reach the caller.
//!
//! The caller's deadline wraps the whole loop. When it passes, the in-flight
//! attempt is dropped and health is left untouched, the same as when the
//! caller drops the `resolve` future.

use super::attempt_log::{AttemptLog, AttemptRecord};
use super::error::{Failure, GatewayError, GatewayResult};
use super::health::{instant_after, HealthTracker};
use super::mode::{CapabilityRouter, Mode};
use super::normalize::Normalizer;
use super::registry::{BackendDescriptor, ChainEntry, ChainSpec, Registry};
use crate::config::{CredentialSource, OrchestratorConfig};
use crate::http::{AttemptOutcome, BackendClient};
use crate::protocol::{CanonicalRequest, CanonicalResponse, CapabilitySet, ResponseMetrics};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Reason used when every eligible pair was skipped without an attempt
const ALL_COOLING_DOWN: &str = "all backends cooling down";

/// Runs resolutions against the registry's chains
pub struct FallbackOrchestrator {
    registry: Arc<Registry>,
    health: Arc<HealthTracker>,
    client: Arc<dyn BackendClient>,
    credentials: Arc<dyn CredentialSource>,
    normalizer: Normalizer,
    config: OrchestratorConfig,
    log: Arc<AttemptLog>,
}

/// A pair that passed the eligibility filter
struct Candidate<'a> {
    /// Position in the chain as declared
    index: usize,
    entry: &'a ChainEntry,
    descriptor: &'a BackendDescriptor,
}

impl FallbackOrchestrator {
    pub fn new(
        registry: Arc<Registry>,
        health: Arc<HealthTracker>,
        client: Arc<dyn BackendClient>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            registry,
            health,
            client,
            credentials,
            normalizer: Normalizer::default(),
            config: OrchestratorConfig::default(),
            log: Arc::new(AttemptLog::default()),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_attempt_log(mut self, log: Arc<AttemptLog>) -> Self {
        self.log = log;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn attempt_log(&self) -> &Arc<AttemptLog> {
        &self.log
    }

    /// Resolve against the named chain
    pub async fn resolve(
        &self,
        chain: &str,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        let spec = self
            .registry
            .chain(chain)
            .ok_or_else(|| GatewayError::UnknownChain(chain.to_string()))?;
        self.run(spec, request).await
    }

    /// Resolve against the chain serving `mode`.
    ///
    /// A mode name goes through the capability router, so a request needing
    /// tools lands on the `-tools` variant when one exists. Any other name is
    /// taken as a chain name.
    pub async fn resolve_mode(
        &self,
        mode: &str,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        let chain = self.chain_name_for(mode, request)?;
        self.resolve(chain, request).await
    }

    /// Try `preferred` first, then the mode's chain without duplicates
    pub async fn resolve_with_preference(
        &self,
        mode: &str,
        preferred: ChainEntry,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        if self.registry.backend(&preferred.backend).is_none() {
            return Err(GatewayError::UnknownBackend(preferred.backend));
        }
        let chain = self.chain_name_for(mode, request)?;
        let spec = self
            .registry
            .chain(chain)
            .ok_or_else(|| GatewayError::UnknownChain(chain.to_string()))?
            .with_preferred(preferred);
        self.run(&spec, request).await
    }

    /// Resolve against an ad-hoc chain; every entry must name a registered backend
    pub async fn resolve_chain(
        &self,
        chain: &ChainSpec,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        if let Some(unknown) = chain
            .entries
            .iter()
            .find(|entry| self.registry.backend(&entry.backend).is_none())
        {
            return Err(GatewayError::UnknownBackend(unknown.backend.clone()));
        }
        self.run(chain, request).await
    }

    fn chain_name_for<'a>(
        &'a self,
        mode: &'a str,
        request: &CanonicalRequest,
    ) -> GatewayResult<&'a str> {
        match mode.parse::<Mode>() {
            Ok(mode) => {
                let router = CapabilityRouter::new(&self.registry);
                Ok(router.chain_for(mode, request.tools_required))
            }
            Err(_) if self.registry.has_chain(mode) => Ok(mode),
            Err(_) => Err(GatewayError::UnknownChain(mode.to_string())),
        }
    }

    async fn run(
        &self,
        chain: &ChainSpec,
        request: &CanonicalRequest,
    ) -> GatewayResult<CanonicalResponse> {
        let deadline = instant_after(Instant::now(), request.timeout);
        let mut attempted = Vec::new();

        let result = timeout_at(
            deadline,
            self.attempt_pairs(chain, request, deadline, &mut attempted),
        )
        .await;

        match result {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    chain = %chain.name,
                    attempted = ?attempted,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "deadline exceeded, in-flight attempt cancelled"
                );
                Err(GatewayError::DeadlineExceeded {
                    chain: chain.name.clone(),
                    attempted,
                })
            }
        }
    }

    async fn attempt_pairs(
        &self,
        chain: &ChainSpec,
        request: &CanonicalRequest,
        deadline: Instant,
        attempted: &mut Vec<String>,
    ) -> GatewayResult<CanonicalResponse> {
        let candidates = self.eligible(chain, &request.required_capabilities());
        if candidates.is_empty() {
            warn!(chain = %chain.name, "no eligible backend");
            return Err(GatewayError::ChainExhausted {
                chain: chain.name.clone(),
                attempted: Vec::new(),
                last_reason: GatewayError::NO_ELIGIBLE_BACKEND.to_string(),
            });
        }

        let mut last_reason: Option<String> = None;
        let mut rejected_credentials: HashSet<&str> = HashSet::new();

        for (position, candidate) in candidates.iter().enumerate() {
            let backend = candidate.descriptor.name.as_str();
            let model = candidate.entry.model.as_str();
            let is_last = position + 1 == candidates.len();

            // Same credential, same answer
            if rejected_credentials.contains(backend) {
                debug!(chain = %chain.name, backend, model, "skipping, credential rejected");
                continue;
            }
            if !is_last && self.health.is_cooling_down(backend) {
                debug!(chain = %chain.name, backend, model, "skipping, cooling down");
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = self.attempt_timeout(request.timeout, remaining, is_last);
            let fallback = candidate.index != 0;

            attempted.push(backend.to_string());
            debug!(
                chain = %chain.name,
                backend,
                model,
                timeout_ms = timeout.as_millis() as u64,
                "attempting"
            );

            let outcome = self
                .client
                .attempt(candidate.descriptor, model, request, timeout)
                .await;

            let (failure, latency) = match outcome {
                AttemptOutcome::Success { reply, latency, .. } => {
                    let normalized = self
                        .normalizer
                        .normalize_from(&reply.text, reply.tool_calls.len());
                    let mut tool_calls = reply.tool_calls;
                    tool_calls.extend(normalized.tool_calls);

                    if normalized.content.is_empty() && tool_calls.is_empty() {
                        (
                            Failure::bad_response("nothing left after normalization"),
                            latency,
                        )
                    } else {
                        self.health.record_success(backend);
                        self.record(chain, candidate, AttemptRecord::SUCCESS, latency, fallback);
                        info!(
                            chain = %chain.name,
                            backend,
                            model,
                            latency_ms = latency.as_millis() as u64,
                            fallback,
                            attempts = attempted.len(),
                            "resolved"
                        );

                        return Ok(CanonicalResponse {
                            content: normalized.content,
                            tool_calls,
                            backend: backend.to_string(),
                            model: reply.model.unwrap_or_else(|| model.to_string()),
                            fallback_used: fallback,
                            truncated: normalized.truncated,
                            metrics: ResponseMetrics {
                                latency,
                                usage: reply.usage,
                                attempts: attempted.len(),
                            },
                        });
                    }
                }
                AttemptOutcome::FatalFailure { failure, latency, .. }
                | AttemptOutcome::RetryableFailure { failure, latency, .. } => (failure, latency),
            };

            // A timeout caused by the caller's own deadline says nothing about the backend
            if failure.timed_out && Instant::now() >= deadline {
                warn!(chain = %chain.name, backend, model, "deadline reached during attempt");
                return Err(GatewayError::DeadlineExceeded {
                    chain: chain.name.clone(),
                    attempted: std::mem::take(attempted),
                });
            }

            self.record_failure(backend, &failure);
            if failure.is_fatal() {
                rejected_credentials.insert(backend);
            }
            self.record(chain, candidate, failure.kind.as_str(), latency, fallback);
            warn!(
                chain = %chain.name,
                backend,
                model,
                kind = failure.kind.as_str(),
                detail = %failure.detail,
                "attempt failed, moving on"
            );
            last_reason = Some(failure.to_string());
        }

        let last_reason = last_reason.unwrap_or_else(|| ALL_COOLING_DOWN.to_string());
        warn!(chain = %chain.name, attempted = ?attempted, %last_reason, "chain exhausted");
        Err(GatewayError::ChainExhausted {
            chain: chain.name.clone(),
            attempted: std::mem::take(attempted),
            last_reason,
        })
    }

    /// Pairs whose backend has its credential and declares every required capability
    fn eligible<'a>(
        &'a self,
        chain: &'a ChainSpec,
        required: &CapabilitySet,
    ) -> Vec<Candidate<'a>> {
        chain
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let descriptor = self.registry.backend(&entry.backend)?.as_ref();
                if descriptor.requires_credential() && !self.has_credential(descriptor) {
                    debug!(backend = %descriptor.name, "excluded, credential missing");
                    return None;
                }
                if !descriptor.supports_all(required) {
                    debug!(
                        backend = %descriptor.name,
                        model = %entry.model,
                        "excluded, capability missing"
                    );
                    return None;
                }
                Some(Candidate {
                    index,
                    entry,
                    descriptor,
                })
            })
            .collect()
    }

    fn has_credential(&self, descriptor: &BackendDescriptor) -> bool {
        descriptor
            .credential
            .as_deref()
            .is_some_and(|key| self.credentials.credential(key).is_some())
    }

    /// `min(remaining, total * fraction, cap)`; the last pair may use all that is left up to the cap
    fn attempt_timeout(&self, total: Duration, remaining: Duration, is_last: bool) -> Duration {
        let cap = self.config.max_attempt_timeout();
        if is_last {
            remaining.min(cap)
        } else {
            let share = Duration::try_from_secs_f64(
                total.as_secs_f64() * self.config.attempt_timeout_fraction,
            )
            .unwrap_or(Duration::MAX);
            remaining.min(share).min(cap)
        }
    }

    fn record_failure(&self, backend: &str, failure: &Failure) {
        if !failure.kind.counts_against_health() {
            return;
        }
        self.health.record_failure(backend, failure.is_fatal());
        if let Some(retry_after) = failure.retry_after {
            self.health.extend_cooldown(backend, retry_after);
        }
    }

    fn record(
        &self,
        chain: &ChainSpec,
        candidate: &Candidate<'_>,
        outcome: &str,
        latency: Duration,
        fallback: bool,
    ) {
        self.log.push(AttemptRecord {
            chain: chain.name.clone(),
            backend: candidate.descriptor.name.clone(),
            model: candidate.entry.model.clone(),
            outcome: outcome.to_string(),
            latency,
            fallback,
            at: SystemTime::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use crate::protocol::Turn;
    use crate::providers::adapter::{BackendReply, Dialect};
    use crate::providers::health::HealthPolicy;
    use crate::providers::registry::tests::descriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails every backend named in `failing`, succeeds otherwise
    struct Scripted {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<(String, Duration)>>,
    }

    #[async_trait]
    impl BackendClient for Scripted {
        async fn attempt(
            &self,
            descriptor: &BackendDescriptor,
            _model: &str,
            _request: &CanonicalRequest,
            timeout: Duration,
        ) -> AttemptOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((descriptor.name.clone(), timeout));
            if self.failing.contains(&descriptor.name.as_str()) {
                AttemptOutcome::from_result(
                    descriptor.name.clone(),
                    Err(Failure::transport("reset")),
                    Duration::from_millis(7),
                )
            } else {
                AttemptOutcome::from_result(
                    descriptor.name.clone(),
                    Ok(BackendReply {
                        text: format!("hi from {}", descriptor.name),
                        ..BackendReply::default()
                    }),
                    Duration::from_millis(5),
                )
            }
        }
    }

    fn orchestrator(failing: Vec<&'static str>) -> (FallbackOrchestrator, Arc<Scripted>) {
        let mut registry = Registry::default();
        let mut credentials = StaticCredentials::new();
        for name in ["a", "b", "c"] {
            registry.insert_backend(descriptor(name, Dialect::OpenAiCompatible, "http://x"));
            credentials = credentials.with(format!("{}_KEY", name.to_uppercase()), "secret");
        }
        registry
            .insert_chain(ChainSpec::new(
                "normal",
                vec![
                    ChainEntry::new("a", "m"),
                    ChainEntry::new("b", "m"),
                    ChainEntry::new("c", "m"),
                ],
            ))
            .unwrap();

        let client = Arc::new(Scripted {
            failing,
            calls: Mutex::new(Vec::new()),
        });
        let orchestrator = FallbackOrchestrator::new(
            Arc::new(registry),
            Arc::new(HealthTracker::new(HealthPolicy::default().without_jitter())),
            client.clone(),
            Arc::new(credentials),
        );
        (orchestrator, client)
    }

    fn request() -> CanonicalRequest {
        CanonicalRequest::new(vec![Turn::user("hello")]).with_timeout(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_attempt_timeouts_follow_position() {
        let (orchestrator, client) = orchestrator(vec!["a", "b"]);
        let response = orchestrator.resolve("normal", &request()).await.unwrap();
        assert_eq!(response.backend, "c");
        assert!(response.fallback_used);
        assert_eq!(response.metrics.attempts, 3);

        let calls = client.calls.lock().unwrap();
        // non-final pairs get half of the budget, the last one what is left
        assert_eq!(calls[0].1, Duration::from_secs(30));
        assert!(calls[2].1 > Duration::from_secs(30));
        assert!(calls[2].1 <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_unknown_chain() {
        let (orchestrator, _) = orchestrator(vec![]);
        let err = orchestrator.resolve("creative", &request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownChain(name) if name == "creative"));
    }

    #[tokio::test]
    async fn test_preference_unknown_backend() {
        let (orchestrator, _) = orchestrator(vec![]);
        let err = orchestrator
            .resolve_with_preference("normal", ChainEntry::new("ghost", "m"), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownBackend(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_attempts_are_logged() {
        let (orchestrator, _) = orchestrator(vec!["a"]);
        orchestrator.resolve("normal", &request()).await.unwrap();

        let recent = orchestrator.attempt_log().recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].backend, "b");
        assert!(recent[0].succeeded());
        assert!(recent[0].fallback);
        assert_eq!(recent[1].outcome, "transport");
        assert_eq!(recent[1].latency, Duration::from_millis(7));
    }

    #[tokio::test]
    async fn test_unbounded_caller_timeout() {
        let (orchestrator, client) = orchestrator(vec!["a"]);
        let request = request().with_timeout(Duration::MAX);
        let response = orchestrator.resolve("normal", &request).await.unwrap();
        assert_eq!(response.backend, "b");

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[0].1, orchestrator.config.max_attempt_timeout());
    }

    #[tokio::test]
    async fn test_full_share_of_unbounded_timeout() {
        let (orchestrator, client) = orchestrator(vec!["a"]);
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            attempt_timeout_fraction: 1.0,
            ..OrchestratorConfig::default()
        });
        let request = request().with_timeout(Duration::MAX);
        orchestrator.resolve("normal", &request).await.unwrap();
        assert_eq!(client.calls.lock().unwrap().len(), 2);
    }
}
