//! Backend descriptor registry and named chains
//!
//! Built once from a validated `GatewayConfig`; read-only afterwards.

use super::adapter::Dialect;
use super::error::{GatewayError, GatewayResult};
use crate::config::{GatewayConfig, ValidationError};
use crate::protocol::{Capability, CapabilitySet};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Static description of one backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    pub name: String,
    pub base_url: String,
    pub dialect: Dialect,
    /// Lookup key for the credential source
    pub credential: Option<String>,
    pub credential_optional: bool,
    pub capabilities: CapabilitySet,
    pub requests_per_minute: Option<u32>,
    pub max_concurrent: u32,
    pub default_model: String,
    pub headers: BTreeMap<String, String>,
}

impl BackendDescriptor {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// True when every required capability is declared
    pub fn supports_all(&self, required: &CapabilitySet) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// A credential must be present before the backend may be attempted
    pub fn requires_credential(&self) -> bool {
        self.credential.is_some() && !self.credential_optional
    }
}

/// One `(backend, model)` pair of a chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainEntry {
    pub backend: String,
    pub model: String,
}

impl ChainEntry {
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            model: model.into(),
        }
    }
}

/// Ordered fallback list; the first entry is the primary
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    pub name: String,
    pub entries: Vec<ChainEntry>,
}

impl ChainSpec {
    pub fn new(name: impl Into<String>, entries: Vec<ChainEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn primary(&self) -> Option<&ChainEntry> {
        self.entries.first()
    }

    /// Put `preferred` first and keep the rest of the chain without duplicates
    pub fn with_preferred(&self, preferred: ChainEntry) -> ChainSpec {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.push(preferred);
        for entry in &self.entries {
            if !entries.contains(entry) {
                entries.push(entry.clone());
            }
        }
        ChainSpec::new(self.name.clone(), entries)
    }
}

/// Catalog of backends and chains
#[derive(Debug, Clone, Default)]
pub struct Registry {
    backends: HashMap<String, Arc<BackendDescriptor>>,
    order: Vec<String>,
    chains: HashMap<String, ChainSpec>,
}

impl Registry {
    /// Build from a validated config
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let mut registry = Registry::default();

        for backend in &config.backends {
            registry.insert_backend(BackendDescriptor {
                name: backend.name.clone(),
                base_url: backend.base_url.clone(),
                dialect: backend.dialect,
                credential: backend.credential.clone(),
                credential_optional: backend.credential_optional,
                capabilities: backend.capabilities.iter().copied().collect(),
                requests_per_minute: backend.requests_per_minute,
                max_concurrent: backend.max_concurrent,
                default_model: backend.default_model.clone(),
                headers: backend.headers.clone(),
            });
        }

        for (name, entries) in &config.chains {
            let mut resolved = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                let descriptor = registry.backend(&entry.backend).ok_or_else(|| {
                    GatewayError::Config(
                        ValidationError::unknown_reference(
                            format!("chains.{}[{}].backend", name, i),
                            entry.backend.clone(),
                        )
                        .into(),
                    )
                })?;
                let model = entry
                    .model
                    .clone()
                    .unwrap_or_else(|| descriptor.default_model.clone());
                resolved.push(ChainEntry::new(entry.backend.clone(), model));
            }
            registry.insert_chain(ChainSpec::new(name.clone(), resolved))?;
        }

        Ok(registry)
    }

    /// Add or replace a backend
    pub fn insert_backend(&mut self, descriptor: BackendDescriptor) {
        if !self.backends.contains_key(&descriptor.name) {
            self.order.push(descriptor.name.clone());
        }
        self.backends
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    /// Add a chain; every entry must name a registered backend
    pub fn insert_chain(&mut self, chain: ChainSpec) -> GatewayResult<()> {
        for entry in &chain.entries {
            if !self.backends.contains_key(&entry.backend) {
                return Err(GatewayError::UnknownBackend(entry.backend.clone()));
            }
        }
        self.chains.insert(chain.name.clone(), chain);
        Ok(())
    }

    pub fn backend(&self, name: &str) -> Option<&Arc<BackendDescriptor>> {
        self.backends.get(name)
    }

    pub fn chain(&self, name: &str) -> Option<&ChainSpec> {
        self.chains.get(name)
    }

    pub fn has_chain(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    /// Backends in configuration order
    pub fn backends(&self) -> impl Iterator<Item = &Arc<BackendDescriptor>> {
        self.order.iter().filter_map(|name| self.backends.get(name))
    }

    pub fn chain_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::builtin_config;

    pub(crate) fn descriptor(name: &str, dialect: Dialect, base_url: &str) -> BackendDescriptor {
        BackendDescriptor {
            name: name.to_string(),
            base_url: base_url.to_string(),
            dialect,
            credential: Some(format!("{}_KEY", name.to_uppercase())),
            credential_optional: false,
            capabilities: CapabilitySet::new(),
            requests_per_minute: None,
            max_concurrent: 4,
            default_model: "default".to_string(),
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_from_builtin_config() {
        let registry = Registry::from_config(&builtin_config()).unwrap();
        let normal = registry.chain("normal").unwrap();
        assert_eq!(normal.primary().unwrap().backend, "groq");
        assert_eq!(registry.backends().next().unwrap().name, "groq");
        assert!(registry.backend("mlvoca").unwrap().credential.is_none());
    }

    #[test]
    fn test_insert_chain_rejects_unknown_backend() {
        let mut registry = Registry::default();
        registry.insert_backend(descriptor("a", Dialect::OpenAiCompatible, "http://a"));
        let err = registry
            .insert_chain(ChainSpec::new("normal", vec![ChainEntry::new("ghost", "m")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownBackend(name) if name == "ghost"));
    }

    #[test]
    fn test_with_preferred_dedups() {
        let chain = ChainSpec::new(
            "normal",
            vec![ChainEntry::new("a", "x"), ChainEntry::new("b", "y")],
        );
        let reordered = chain.with_preferred(ChainEntry::new("b", "y"));
        assert_eq!(
            reordered.entries,
            vec![ChainEntry::new("b", "y"), ChainEntry::new("a", "x")]
        );
    }

    #[test]
    fn test_requires_credential() {
        let mut d = descriptor("p", Dialect::OpenAiCompatible, "http://p");
        assert!(d.requires_credential());
        d.credential_optional = true;
        assert!(!d.requires_credential());
        d.credential = None;
        assert!(!d.requires_credential());
    }
}
