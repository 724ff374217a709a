//! Turnstile - wallet-gated meme card gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile::config::Args;
use turnstile::server;
use turnstile::store::MongoClient;
use turnstile::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("turnstile={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Turnstile - Meme Card Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("Rate limit: {}/min", args.rate_limit_per_minute);
    info!("Nonce TTL: {}s requested", args.nonce_ttl_seconds);
    info!("======================================");

    let state = if args.dev_mode {
        warn!("Development mode - in-memory stores, stub image provider");
        AppState::in_memory(args)
    } else {
        let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => client,
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };
        match AppState::with_mongo(args, mongo).await {
            Ok(state) => state,
            Err(e) => {
                error!("Startup failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    server::run(Arc::new(state)).await?;
    Ok(())
}
