//! API request handlers for the claims service

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use claims_common::{ListingIdentity, ListingType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ClaimError;
use crate::models::{ClaimSummary, Provenance};
use crate::service::{ClaimService, VerifyOutcome};
use crate::storage::ClaimStats;
use crate::validation::SubmitClaimRequest;

/// Shared application state
pub struct AppState {
    pub service: ClaimService,

    /// Bearer secret for admin endpoints; admin endpoints are closed when unset
    pub admin_secret: Option<String>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.code,
            "message": self.message,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        if err.is_storage() {
            error!("Storage failure: {:?}", err);
        }

        ApiError {
            status: err.status(),
            code: err.code(),
            message: err.message(),
        }
    }
}

/// Response from a successful submission
#[derive(Debug, Serialize)]
pub struct SubmitClaimResponse {
    pub success: bool,
    pub claim_id: String,
    pub message: String,
}

/// Listing identity as given in the status query string
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "type", default)]
    pub listing_type: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub country: String,
}

impl StatusQuery {
    fn identity(&self) -> Result<ListingIdentity, ClaimError> {
        if self.listing_type.trim().is_empty()
            || self.slug.trim().is_empty()
            || self.country.trim().is_empty()
        {
            return Err(ClaimError::MissingListingInfo);
        }

        let listing_type: ListingType = self
            .listing_type
            .parse()
            .map_err(|_| ClaimError::InvalidListingType)?;

        Ok(ListingIdentity::new(listing_type, &self.slug, &self.country))
    }
}

/// Response to a status query
#[derive(Debug, Serialize)]
pub struct ClaimStatusResponse {
    pub success: bool,
    pub claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<ClaimSummary>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

/// Admin statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: ClaimStats,
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub success: bool,
    pub expired: usize,
}

/// Caller address, preferring the proxy headers
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded.or_else(real_ip).map(str::to_string)
}

fn provenance(headers: &HeaderMap) -> Provenance {
    Provenance {
        ip_address: client_ip(headers),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

/// Compare without short-circuiting on the first differing byte
fn secrets_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }

    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_secret.as_deref() else {
        warn!("Admin request rejected: no admin secret configured");
        return Err(ClaimError::Unauthorized.into());
    };

    let given = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match given {
        Some(given) if secrets_match(given.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(ClaimError::Unauthorized.into()),
    }
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "service": "claims-service",
                "storage": "ok"
            })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": "claims-service",
                    "storage": "unreachable"
                })),
            )
        }
    }
}

/// Submit a listing claim
pub async fn submit_claim_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitClaimRequest>, JsonRejection>,
) -> Result<Json<SubmitClaimResponse>, ApiError> {
    let provenance = provenance(&headers);

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            // Unreadable bodies still spend the requester's budget
            state.service.check_rate_limit(&provenance).await?;
            return Err(ClaimError::InvalidRequest(format!(
                "Malformed request body: {}",
                rejection.body_text()
            ))
            .into());
        }
    };

    info!(
        "Claim submission for {} {} in {}",
        request.listing_type, request.listing_slug, request.listing_country
    );

    let receipt = state.service.submit(request, provenance).await?;

    Ok(Json(SubmitClaimResponse {
        success: true,
        claim_id: receipt.claim_id,
        message: receipt.message,
    }))
}

/// Whether a listing has been claimed
pub async fn claim_status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ClaimStatusResponse>, ApiError> {
    let listing = query.identity()?;
    let claim = state.service.status(&listing).await?;

    Ok(Json(ClaimStatusResponse {
        success: true,
        claimed: claim.is_some(),
        claim: claim.as_ref().map(ClaimSummary::from),
    }))
}

/// Verify a claim from an emailed link and redirect the browser
pub async fn verify_claim_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Redirect {
    match state.service.verify(query.token.as_deref()).await {
        Ok(outcome) => {
            let indicator = match outcome {
                VerifyOutcome::Verified { .. } => "success",
                VerifyOutcome::AlreadyVerified { .. } => "already_verified",
            };
            Redirect::temporary(&format!(
                "{}?claimed={}",
                outcome.listing().page_path(),
                indicator
            ))
        }
        Err(err) => {
            if err.is_storage() {
                error!("Verification failed on storage: {:?}", err);
            } else {
                info!("Verification refused: {}", err.code());
            }
            Redirect::temporary(&format!("/claim/error?reason={}", err.redirect_reason()))
        }
    }
}

/// Aggregate claim statistics (admin)
pub async fn claim_stats_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let stats = state.service.stats().await?;

    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

/// Expire pending claims past their link lifetime (admin)
pub async fn expire_stale_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ExpireResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let expired = state.service.expire_stale().await?;

    Ok(Json(ExpireResponse {
        success: true,
        expired,
    }))
}
