//! Listing Claims Service
//!
//! REST API for submitting and verifying listing claims

use anyhow::{Context, Result};
use claims_service::{build_service, create_router, AppState, Config};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claims_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Listing Claims Service");
    info!("Storage backend: {:?}", config.storage_backend);
    info!("Verification links point at {}", config.public_base_url);
    if config.admin_secret.is_none() {
        warn!("CLAIMS_ADMIN_SECRET not set; admin endpoints will refuse all requests");
    }

    let service = build_service(&config).await?;

    // Create application state
    let state = AppState {
        service,
        admin_secret: config.admin_secret.clone(),
    };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Listing Claims Service running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
