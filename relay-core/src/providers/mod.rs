//! Backends, dialects and fallback orchestration
//!
//! The registry describes backends and chains, dialect adapters translate
//! canonical requests to each backend's wire format, and the orchestrator
//! walks a chain with help from the health tracker and the normalizer.

pub mod adapter;
pub mod attempt_log;
pub mod cloudflare;
pub mod cohere;
pub mod error;
pub mod gemini;
pub mod generate;
pub mod health;
pub mod mode;
pub mod normalize;
pub mod openai;
pub mod rate_limit;
pub mod registry;
pub mod routing;

pub use adapter::{BackendReply, Dialect, DialectAdapter, WireRequest};
pub use attempt_log::{AttemptLog, AttemptRecord, BackendStats};
pub use error::{Failure, FailureKind, GatewayError, GatewayResult};
pub use health::{HealthPolicy, HealthSnapshot, HealthTracker};
pub use mode::{CapabilityRouter, Mode, ModeDetector, TOOLS_CHAIN_SUFFIX};
pub use normalize::{NormalizedText, Normalizer};
pub use rate_limit::{RateLimiter, RequestBudget};
pub use registry::{BackendDescriptor, ChainEntry, ChainSpec, Registry};
pub use routing::FallbackOrchestrator;
