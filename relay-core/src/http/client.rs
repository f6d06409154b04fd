//! reqwest-backed backend client

use super::error::{classify_transport, parse_retry_after};
use super::{AttemptOutcome, BackendClient};
use crate::config::{ConnectionConfig, CredentialSource, SecretString};
use crate::protocol::CanonicalRequest;
use crate::providers::adapter::BackendReply;
use crate::providers::error::{Failure, GatewayError};
use crate::providers::rate_limit::{BudgetPermit, RateLimiter, RequestBudget};
use crate::providers::registry::BackendDescriptor;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest response body accepted (10 MiB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

/// Backend client issuing one HTTPS request per attempt
#[derive(Clone)]
pub struct HttpBackendClient {
    client: Client,
    credentials: Arc<dyn CredentialSource>,
    limiter: Arc<RateLimiter>,
    max_response_size: usize,
}

impl HttpBackendClient {
    /// Create a client with default connection settings
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Result<Self, GatewayError> {
        Self::with_config(&ConnectionConfig::default(), credentials)
    }

    /// Create a client with explicit connection settings
    pub fn with_config(
        connection: &ConnectionConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, GatewayError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(connection.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(connection.keepalive_secs))
            .connect_timeout(Duration::from_millis(connection.connect_timeout_ms))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| GatewayError::Client(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            limiter: Arc::new(RateLimiter::new()),
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// Per-backend request budgets used by this client
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn lookup_credential(&self, descriptor: &BackendDescriptor) -> Option<SecretString> {
        descriptor
            .credential
            .as_deref()
            .and_then(|key| self.credentials.credential(key))
    }

    /// Wait up to `timeout` for a slot in the backend's budget
    async fn reserve(budget: &RequestBudget, timeout: Duration) -> Result<BudgetPermit, Failure> {
        tokio::time::timeout(timeout, budget.acquire())
            .await
            .unwrap_or_else(|_| Err(Failure::throttled("concurrency cap reached")))
    }

    async fn send(
        &self,
        budget: &RequestBudget,
        descriptor: &BackendDescriptor,
        model: &str,
        request: &CanonicalRequest,
        credential: Option<&SecretString>,
        request_id: Uuid,
    ) -> Result<BackendReply, Failure> {
        let adapter = descriptor.dialect.adapter();
        let wire = adapter.encode(request, model, descriptor, credential);
        debug!(
            backend = %descriptor.name,
            %request_id,
            url = %wire.url,
            "sending attempt"
        );

        let mut builder = self
            .client
            .post(&wire.url)
            .json(&wire.body)
            .header("X-Request-ID", request_id.to_string());
        for (name, value) in &wire.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status().as_u16();
        budget.update_from_headers(response.headers());
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        if let Some(length) = response.content_length() {
            if length as usize > self.max_response_size {
                return Err(Failure::bad_response(format!(
                    "response size {} exceeds maximum {}",
                    length, self.max_response_size
                )));
            }
        }

        let body = response.bytes().await.map_err(|e| classify_transport(&e))?;
        if body.len() > self.max_response_size {
            return Err(Failure::bad_response(format!(
                "response size {} exceeds maximum {}",
                body.len(),
                self.max_response_size
            )));
        }

        adapter.decode(status, &body).map_err(|failure| {
            if failure.retry_after.is_none() {
                failure.with_retry_after(retry_after)
            } else {
                failure
            }
        })
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn attempt(
        &self,
        descriptor: &BackendDescriptor,
        model: &str,
        request: &CanonicalRequest,
        timeout: Duration,
    ) -> AttemptOutcome {
        let request_id = Uuid::new_v4();
        let credential = self.lookup_credential(descriptor);

        if credential.is_none() && descriptor.requires_credential() {
            warn!(
                backend = %descriptor.name,
                %request_id,
                "credential missing, attempt not sent"
            );
            return AttemptOutcome::failed(
                descriptor.name.clone(),
                Failure::auth(format!(
                    "credential '{}' is not configured",
                    descriptor.credential.as_deref().unwrap_or_default()
                )),
            );
        }

        // Queueing behind our own cap is throttling; the HTTP timeout starts once a slot is held
        let budget = self.limiter.budget_for(descriptor);
        let started = Instant::now();
        let result = match Self::reserve(&budget, timeout).await {
            Ok(_permit) => tokio::time::timeout(
                timeout,
                self.send(&budget, descriptor, model, request, credential.as_ref(), request_id),
            )
            .await
            .unwrap_or_else(|_| Err(Failure::timeout(timeout))),
            Err(failure) => Err(failure),
        };
        let latency = started.elapsed();

        match &result {
            Ok(_) => info!(
                backend = %descriptor.name,
                model,
                %request_id,
                latency_ms = latency.as_millis() as u64,
                "attempt succeeded"
            ),
            Err(failure) => warn!(
                backend = %descriptor.name,
                model,
                %request_id,
                latency_ms = latency.as_millis() as u64,
                kind = failure.kind.as_str(),
                detail = %failure.detail,
                "attempt failed"
            ),
        }

        AttemptOutcome::from_result(descriptor.name.clone(), result, latency)
    }
}
