//! Backend client abstraction
//!
//! A `BackendClient` issues exactly one attempt against one backend and
//! reports a classified `AttemptOutcome`. It never retries; the orchestrator
//! owns retry and fallback policy.

pub mod client;
pub mod error;

use crate::protocol::CanonicalRequest;
use crate::providers::adapter::BackendReply;
use crate::providers::error::Failure;
use crate::providers::registry::BackendDescriptor;
use async_trait::async_trait;
use std::time::Duration;

pub use client::HttpBackendClient;

/// Result of one attempt, consumed once by the orchestrator
#[derive(Debug)]
pub enum AttemptOutcome {
    Success {
        reply: BackendReply,
        backend: String,
        latency: Duration,
    },
    RetryableFailure {
        failure: Failure,
        backend: String,
        latency: Duration,
    },
    FatalFailure {
        failure: Failure,
        backend: String,
        latency: Duration,
    },
}

impl AttemptOutcome {
    /// Wrap a failure that happened before anything was sent
    pub fn failed(backend: impl Into<String>, failure: Failure) -> Self {
        Self::failed_after(backend, failure, Duration::ZERO)
    }

    /// Wrap a failure in the variant its kind calls for
    pub fn failed_after(backend: impl Into<String>, failure: Failure, latency: Duration) -> Self {
        let backend = backend.into();
        if failure.is_fatal() {
            AttemptOutcome::FatalFailure {
                failure,
                backend,
                latency,
            }
        } else {
            AttemptOutcome::RetryableFailure {
                failure,
                backend,
                latency,
            }
        }
    }

    pub fn from_result(
        backend: impl Into<String>,
        result: Result<BackendReply, Failure>,
        latency: Duration,
    ) -> Self {
        match result {
            Ok(reply) => AttemptOutcome::Success {
                reply,
                backend: backend.into(),
                latency,
            },
            Err(failure) => Self::failed_after(backend, failure, latency),
        }
    }

    pub fn backend(&self) -> &str {
        match self {
            AttemptOutcome::Success { backend, .. }
            | AttemptOutcome::RetryableFailure { backend, .. }
            | AttemptOutcome::FatalFailure { backend, .. } => backend,
        }
    }

    /// Time spent on the attempt, zero when nothing was sent
    pub fn latency(&self) -> Duration {
        match self {
            AttemptOutcome::Success { latency, .. }
            | AttemptOutcome::RetryableFailure { latency, .. }
            | AttemptOutcome::FatalFailure { latency, .. } => *latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

/// Issues single attempts against backends
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Run one attempt bounded by `timeout`
    async fn attempt(
        &self,
        descriptor: &BackendDescriptor,
        model: &str,
        request: &CanonicalRequest,
        timeout: Duration,
    ) -> AttemptOutcome;
}
