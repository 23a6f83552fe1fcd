// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Crosspost API Server
//!
//! Backend for the post-scheduling dashboard: OAuth account linking and
//! cross-platform analytics aggregation.

use crosspost::{
    config::Config,
    db::Database,
    services::{AnalyticsCache, AnalyticsService, PlatformRegistry, TokenCipher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Crosspost API");

    // Connect to SQLite and apply schema
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Token encryption for OAuth credentials at rest
    let cipher =
        TokenCipher::new(&config.token_encryption_key).expect("Failed to initialize token cipher");

    // Platform clients for every provider with configured credentials
    let registry = Arc::new(PlatformRegistry::from_config(&config));

    let analytics = AnalyticsService::new(db.clone(), registry.clone(), cipher.clone());

    // Process-wide analytics response cache, shared across requests
    let analytics_cache = AnalyticsCache::new();

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        registry,
        cipher,
        analytics,
        analytics_cache,
    });

    // Build router
    let app = crosspost::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crosspost=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
