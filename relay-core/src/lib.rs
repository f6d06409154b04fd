//! Relay Core Library
//!
//! Multi-backend inference gateway. One logical "generate a reply" request is
//! served by trying an ordered chain of text-generation backends until one
//! succeeds, with per-backend cool-downs and a single response shape.
//!
//! ```no_run
//! use relay_core::config::{builtin_config, EnvCredentials};
//! use relay_core::protocol::{CanonicalRequest, Turn};
//! use relay_core::Gateway;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), relay_core::providers::GatewayError> {
//! let gateway = Gateway::from_config(&builtin_config(), Arc::new(EnvCredentials))?;
//! let request = CanonicalRequest::new(vec![Turn::user("hello")]);
//! let response = gateway.generate("normal", &request).await?;
//! println!("{} via {}", response.content, response.backend);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod providers;

pub use gateway::Gateway;

/// Returns the version of the Relay Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
