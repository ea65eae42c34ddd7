//! Listing Claims Service
//!
//! Lets the owner or manager of a directory listing claim it. A claim is
//! submitted, confirmed through an emailed single-use link, and the first
//! verified claim of a listing wins.

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod rate_limit;
pub mod service;
pub mod storage;
pub mod validation;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{Config, StorageBackend};
pub use error::ClaimError;
pub use handlers::AppState;
pub use models::{Claim, ClaimStatus, ClaimSummary, Role, StatusKind, Tier};
pub use service::{ClaimService, ServiceSettings, SubmitReceipt, VerifyOutcome};
pub use storage::{ClaimStore, MemoryClaimStore, RedisClaimStore};

use notify::{LogNotifier, Notifier, WebhookNotifier};
use rate_limit::{FixedWindowLimiter, RateLimiter, RedisRateLimiter};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/claims",
            post(handlers::submit_claim_handler).get(handlers::claim_stats_handler),
        )
        .route("/api/claims/status", get(handlers::claim_status_handler))
        .route("/api/claims/verify", get(handlers::verify_claim_handler))
        .route("/api/claims/expire", post(handlers::expire_stale_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Wire storage, rate limiting and notification according to the configuration
pub async fn build_service(config: &Config) -> Result<ClaimService> {
    let (store, limiter): (Arc<dyn ClaimStore>, Arc<dyn RateLimiter>) =
        match config.storage_backend {
            StorageBackend::Redis => {
                let store = RedisClaimStore::new(&config.redis_url)
                    .await
                    .context("Failed to initialize storage")?;
                let limiter = RedisRateLimiter::new(store.connection(), config.rate_limit());
                (Arc::new(store), Arc::new(limiter))
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; claims are lost on restart");
                (
                    Arc::new(MemoryClaimStore::new()),
                    Arc::new(FixedWindowLimiter::new(config.rate_limit())),
                )
            }
        };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Delivering notifications to webhook {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    Ok(ClaimService::new(
        store,
        limiter,
        notifier,
        config.service_settings(),
    ))
}
