//! Built-in backend catalog and fallback chains
//!
//! Mirrors the free-tier backends the gateway was first deployed against.
//! Cloudflare Workers AI is not listed because its URL embeds an account id;
//! add it from a config file with `base_url: https://api.cloudflare.com/client/v4/accounts/${CLOUDFLARE_ACCOUNT_ID}/ai/run`.

use super::schema::{
    BackendConfig, ChainEntryConfig, ConnectionConfig, GatewayConfig, HealthConfig,
    NormalizerConfig, OrchestratorConfig, SUPPORTED_VERSION,
};
use crate::protocol::Capability;
use crate::providers::Dialect;
use std::collections::BTreeMap;

struct Entry {
    name: &'static str,
    base_url: &'static str,
    dialect: Dialect,
    credential: Option<&'static str>,
    credential_optional: bool,
    capabilities: &'static [Capability],
    requests_per_minute: Option<u32>,
    default_model: &'static str,
    headers: &'static [(&'static str, &'static str)],
}

const BACKENDS: &[Entry] = &[
    Entry {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("GROQ_API_KEY"),
        credential_optional: false,
        capabilities: &[
            Capability::ToolCalling,
            Capability::Vision,
            Capability::Reasoning,
            Capability::SearchGrounding,
        ],
        requests_per_minute: Some(100),
        default_model: "llama-3.3-70b-versatile",
        headers: &[],
    },
    Entry {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("OPENROUTER_API_KEY"),
        credential_optional: false,
        capabilities: &[Capability::ToolCalling, Capability::Vision, Capability::Reasoning],
        requests_per_minute: Some(20),
        default_model: "openrouter/free",
        headers: &[("HTTP-Referer", "https://relay.local"), ("X-Title", "Relay Gateway")],
    },
    Entry {
        name: "pollinations",
        base_url: "https://gen.pollinations.ai/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("POLLINATIONS_API_KEY"),
        credential_optional: true,
        capabilities: &[Capability::Reasoning, Capability::SearchGrounding],
        requests_per_minute: Some(4),
        default_model: "openai",
        headers: &[],
    },
    Entry {
        name: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/models",
        dialect: Dialect::Gemini,
        credential: Some("GEMINI_API_KEY"),
        credential_optional: false,
        capabilities: &[Capability::Reasoning],
        requests_per_minute: Some(10),
        default_model: "gemini-2.5-flash",
        headers: &[],
    },
    Entry {
        name: "cerebras",
        base_url: "https://api.cerebras.ai/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("CEREBRAS_API_KEY"),
        credential_optional: false,
        capabilities: &[Capability::ToolCalling, Capability::Reasoning],
        requests_per_minute: Some(30),
        default_model: "llama3.1-8b",
        headers: &[],
    },
    Entry {
        name: "huggingface",
        base_url: "https://router.huggingface.co/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("HUGGINGFACE_TOKEN"),
        credential_optional: false,
        capabilities: &[Capability::Reasoning],
        requests_per_minute: Some(5),
        default_model: "meta-llama/Meta-Llama-3.1-8B-Instruct",
        headers: &[],
    },
    Entry {
        name: "cohere",
        base_url: "https://api.cohere.ai/v2",
        dialect: Dialect::Cohere,
        credential: Some("COHERE_API_KEY"),
        credential_optional: false,
        capabilities: &[Capability::ToolCalling, Capability::SearchGrounding],
        requests_per_minute: Some(20),
        default_model: "command-r-08-2024",
        headers: &[],
    },
    Entry {
        name: "siliconflow",
        base_url: "https://api.siliconflow.cn/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("SILICONFLOW_API_KEY"),
        credential_optional: false,
        capabilities: &[],
        requests_per_minute: None,
        default_model: "Qwen/Qwen2.5-7B-Instruct",
        headers: &[],
    },
    Entry {
        name: "routeway",
        base_url: "https://api.routeway.ai/v1",
        dialect: Dialect::OpenAiCompatible,
        credential: Some("ROUTEWAY_API_KEY"),
        credential_optional: false,
        capabilities: &[Capability::ToolCalling, Capability::Reasoning],
        requests_per_minute: None,
        default_model: "glm-4.5-air:free",
        headers: &[],
    },
    Entry {
        name: "mlvoca",
        base_url: "https://mlvoca.com",
        dialect: Dialect::Generate,
        credential: None,
        credential_optional: false,
        capabilities: &[],
        requests_per_minute: None,
        default_model: "tinyllama",
        headers: &[],
    },
];

const NORMAL: &[(&str, &str)] = &[
    ("groq", "llama-3.3-70b-versatile"),
    ("groq", "llama-3.1-8b-instant"),
    ("openrouter", "meta-llama/llama-4-scout:free"),
    ("openrouter", "deepseek/deepseek-chat-v3-0324:free"),
    ("pollinations", "openai"),
    ("pollinations", "gemini"),
    ("cerebras", "llama3.1-8b"),
    ("gemini", "gemini-2.5-flash"),
    ("cohere", "command-r-08-2024"),
    ("siliconflow", "Qwen/Qwen2.5-7B-Instruct"),
    ("mlvoca", "tinyllama"),
];

const REASONING: &[(&str, &str)] = &[
    ("groq", "deepseek-r1-distill-llama-70b"),
    ("groq", "qwen/qwen3-32b"),
    ("groq", "openai/gpt-oss-120b"),
    ("openrouter", "deepseek/deepseek-r1:free"),
    ("openrouter", "deepseek/deepseek-r1-0528:free"),
    ("openrouter", "stepfun/step-3.5-flash:free"),
    ("pollinations", "perplexity-reasoning"),
    ("cerebras", "gpt-oss-120b"),
    ("routeway", "deepseek-r1:free"),
    ("huggingface", "deepseek-ai/DeepSeek-R1"),
    ("mlvoca", "deepseek-r1:1.5b"),
];

const SEARCH: &[(&str, &str)] = &[
    ("pollinations", "gemini-search"),
    ("pollinations", "perplexity-fast"),
    ("groq", "groq/compound"),
    ("groq", "groq/compound-mini"),
    ("pollinations", "perplexity-reasoning"),
    ("cohere", "command-r-plus-08-2024"),
];

const NORMAL_TOOLS: &[(&str, &str)] = &[
    ("groq", "openai/gpt-oss-120b"),
    ("openrouter", "qwen/qwen3-next-80b-a3b-instruct:free"),
    ("routeway", "glm-4.6:free"),
    ("cerebras", "gpt-oss-120b"),
    ("cohere", "command-a"),
];

/// Default gateway configuration with the built-in catalog
pub fn builtin_config() -> GatewayConfig {
    let backends = BACKENDS
        .iter()
        .map(|e| BackendConfig {
            name: e.name.to_string(),
            base_url: e.base_url.to_string(),
            dialect: e.dialect,
            credential: e.credential.map(str::to_string),
            credential_optional: e.credential_optional,
            capabilities: e.capabilities.to_vec(),
            requests_per_minute: e.requests_per_minute,
            max_concurrent: 4,
            default_model: e.default_model.to_string(),
            headers: e
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .collect();

    let chain = |pairs: &[(&str, &str)]| -> Vec<ChainEntryConfig> {
        pairs
            .iter()
            .map(|(backend, model)| ChainEntryConfig::new(*backend, *model))
            .collect()
    };

    let mut chains = BTreeMap::new();
    chains.insert("normal".to_string(), chain(NORMAL));
    chains.insert("reasoning".to_string(), chain(REASONING));
    chains.insert("search".to_string(), chain(SEARCH));
    chains.insert("normal-tools".to_string(), chain(NORMAL_TOOLS));

    GatewayConfig {
        version: SUPPORTED_VERSION.to_string(),
        backends,
        chains,
        health: HealthConfig::default(),
        orchestrator: OrchestratorConfig::default(),
        normalizer: NormalizerConfig::default(),
        connection: ConnectionConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValidator;

    #[test]
    fn test_builtin_config_validates() {
        let config = builtin_config();
        ConfigValidator::new().validate(&config).unwrap();
    }

    #[test]
    fn test_builtin_chains_present() {
        let config = builtin_config();
        for name in ["normal", "reasoning", "search", "normal-tools"] {
            assert!(config.chains.contains_key(name), "missing chain {name}");
        }
    }

    #[test]
    fn test_openrouter_identifies_itself() {
        let config = builtin_config();
        let openrouter = config.backend("openrouter").unwrap();
        assert!(openrouter.headers.contains_key("HTTP-Referer"));
        assert!(openrouter.headers.contains_key("X-Title"));
    }

    #[test]
    fn test_keyless_backends() {
        let config = builtin_config();
        assert!(config.backend("mlvoca").unwrap().credential.is_none());
        assert!(config.backend("pollinations").unwrap().credential_optional);
    }
}
