//! Fallback demo
//!
//! Sends one prompt through the built-in catalog (or a YAML file given as the
//! first argument) and prints which backend answered. Backends whose API key
//! is not set in the environment are skipped.
//!
//! Run with: RUST_LOG=relay_core=debug cargo run --example fallback_demo -- [relay.yaml] "prompt"

use anyhow::Context;
use relay_core::config::{builtin_config, load_from_yaml, EnvCredentials};
use relay_core::protocol::{CanonicalRequest, Turn};
use relay_core::providers::ModeDetector;
use relay_core::Gateway;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_core=info")),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let prompt = args
        .pop()
        .unwrap_or_else(|| "Explain in two sentences why the sky is blue.".to_string());
    let config = match args.first() {
        Some(path) => load_from_yaml(path).with_context(|| format!("loading {path}"))?,
        None => builtin_config(),
    };

    let gateway = Gateway::from_config(&config, Arc::new(EnvCredentials))?;
    let mode = ModeDetector::detect(&prompt);
    println!("mode: {mode}");

    let request = CanonicalRequest::new(vec![Turn::user(prompt)])
        .with_system("You are a concise assistant.");

    match gateway.generate(mode.as_str(), &request).await {
        Ok(response) => {
            println!("backend: {} ({})", response.backend, response.model);
            println!("fallback used: {}", response.fallback_used);
            println!(
                "attempts: {}, latency: {:?}",
                response.metrics.attempts, response.metrics.latency
            );
            println!("\n{}", response.content);
        }
        Err(e) => println!("no backend answered: {e}"),
    }

    println!("\nbackend health:");
    for (backend, snapshot) in gateway.health().snapshot_all() {
        if snapshot.consecutive_failures > 0 || snapshot.is_cooling_down() {
            println!(
                "  {backend}: {} failures, cooling for {:?}",
                snapshot.consecutive_failures, snapshot.cooldown_remaining
            );
        }
    }

    for (backend, stats) in gateway.attempt_log().stats() {
        println!(
            "  {backend}: {}/{} ok, avg {:?}",
            stats.successes, stats.attempts, stats.average_latency
        );
    }

    Ok(())
}
