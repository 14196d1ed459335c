//! Satsdice server binary.
//!
//! Wires the stores, payment listener, and HTTP API together and runs
//! until interrupted.

use clap::Parser;
use satsdice::api::handlers::AppState;
use satsdice::api::monitoring::MetricsRegistry;
use satsdice::api::{ApiConfig, ApiServer};
use satsdice::config::{generate_sample_config, ConfigLoader};
use satsdice::dice::DiceService;
use satsdice::draw::DrawEngine;
use satsdice::hub::NotificationHub;
use satsdice::payments::{spawn_payment_listener, MockPaymentProvider, PaymentProvider};
use satsdice::repository::{MemoryRepository, Repository};
use satsdice::session::{SessionStore, SettlementResolver};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "satsdiced")]
#[command(about = "Satsdice Lightning wagering server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Host to bind the API server to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the API server to (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Comma-separated list of allowed CORS origins (overrides the config file)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Write a sample configuration file to the given path and exit
    #[arg(long)]
    sample_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.sample_config {
        generate_sample_config(&path)?;
        println!("📝 Sample configuration written to {}", path);
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.server.listen_address = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(origins) = args.cors_origins {
        config.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }

    // A seeded draw key keeps the published fairness key stable across
    // restarts; without one each boot gets a fresh keypair.
    let draw = match &config.draw.key_seed_hex {
        Some(seed_hex) => {
            let seed = hex::decode(seed_hex)?;
            Arc::new(DrawEngine::from_seed(&seed)?)
        }
        None => Arc::new(DrawEngine::new_random()),
    };

    let provider: Arc<dyn PaymentProvider> = match config.payments.provider.as_str() {
        "mock" => Arc::new(MockPaymentProvider::new()),
        other => {
            return Err(format!(
                "unsupported payment provider '{}': only the mock provider is wired in this build",
                other
            )
            .into())
        }
    };

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let hub = Arc::new(NotificationHub::new());
    let sessions = Arc::new(SessionStore::new(
        SettlementResolver::new(draw.clone()),
        hub.clone(),
        provider.clone(),
        repo.clone(),
    ));
    let dice = Arc::new(DiceService::new(
        draw.clone(),
        hub.clone(),
        provider.clone(),
        repo.clone(),
    ));

    let (confirmations_tx, confirmations_rx) = mpsc::channel(1024);
    spawn_payment_listener(sessions.clone(), dice.clone(), confirmations_rx);

    let state = Arc::new(AppState {
        sessions,
        dice,
        hub,
        metrics: Arc::new(MetricsRegistry::new()),
        confirmations: confirmations_tx,
        draw_public_key: draw.public_key_hex(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let api_config = ApiConfig {
        host: config.server.listen_address,
        port: config.server.port,
        allowed_origins: config.server.cors_origins,
        request_timeout_secs: config.server.request_timeout_secs,
        log_filter: config.logging.filter,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    ApiServer::new(api_config, state).run().await
}
