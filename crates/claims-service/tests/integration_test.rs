//! Integration tests for the Listing Claims Service

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use claims_common::{Error, ListingIdentity, ListingType, VerificationToken};
use claims_service::clock::ManualClock;
use claims_service::notify::LogNotifier;
use claims_service::rate_limit::{FixedWindowLimiter, RateLimitConfig};
use claims_service::storage::ListingReservation;
use claims_service::{
    create_router, AppState, Claim, ClaimService, ClaimStore, MemoryClaimStore,
    ServiceSettings, StatusKind,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

const ADMIN_SECRET: &str = "test-admin-secret";

struct TestApp {
    router: axum::Router,
    store: Arc<MemoryClaimStore>,
    clock: Arc<ManualClock>,
}

/// Helper to create a test app over the in-memory store
fn create_test_app_with_limit(max_requests: u32) -> TestApp {
    let store = Arc::new(MemoryClaimStore::new());
    let clock = Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(1_750_000_000, 0).unwrap(),
    ));
    let limiter = Arc::new(FixedWindowLimiter::new(RateLimitConfig {
        max_requests,
        window: std::time::Duration::from_secs(3600),
    }));

    let service = ClaimService::new(
        store.clone(),
        limiter,
        Arc::new(LogNotifier),
        ServiceSettings::default(),
    )
    .with_clock(clock.clone());

    let router = create_router(AppState {
        service,
        admin_secret: Some(ADMIN_SECRET.to_string()),
    });

    TestApp {
        router,
        store,
        clock,
    }
}

fn create_test_app() -> TestApp {
    create_test_app_with_limit(100)
}

fn submission(email: &str) -> Value {
    json!({
        "listing_type": "solar_park",
        "listing_slug": "zonnepark-a",
        "listing_country": "netherlands",
        "listing_name": "Zonnepark A",
        "email": email,
        "phone": "+31 6 12345678",
        "role": "owner"
    })
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn post_claim(app: &TestApp, body: &Value) -> Response {
    send(
        app,
        Request::builder()
            .uri("/api/claims")
            .method("POST")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
    )
    .await
}

async fn get(app: &TestApp, uri: &str) -> Response {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

async fn token_for(app: &TestApp, claim_id: &str) -> String {
    app.store
        .find_by_id(claim_id)
        .await
        .unwrap()
        .unwrap()
        .verification_token()
        .unwrap()
        .to_hex()
}

async fn submit_ok(app: &TestApp, email: &str) -> String {
    let response = post_claim(app, &submission(email)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["claim_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "claims-service");
    assert_eq!(json["storage"], "ok");
}

#[tokio::test]
async fn test_submit_claim() {
    let app = create_test_app();

    let response = post_claim(&app, &submission("jan@example.nl")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    let claim_id = json["claim_id"].as_str().unwrap();
    assert!(claim_id.starts_with("claim_"));
    assert!(json.get("verification_token").is_none());

    let claim = app.store.find_by_id(claim_id).await.unwrap().unwrap();
    assert_eq!(claim.kind(), StatusKind::Pending);
    assert_eq!(claim.ip_address.as_deref(), Some("198.51.100.4"));
}

#[tokio::test]
async fn test_resubmit_conflict() {
    let app = create_test_app();
    submit_ok(&app, "jan@example.nl").await;

    let response = post_claim(&app, &submission("jan@example.nl")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "verification_already_sent");
}

#[tokio::test]
async fn test_verify_redirects_to_listing() {
    let app = create_test_app();
    let claim_id = submit_ok(&app, "jan@example.nl").await;
    let token = token_for(&app, &claim_id).await;

    let response = get(&app, &format!("/api/claims/verify?token={}", token)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/solarparks/netherlands/zonnepark-a?claimed=success"
    );

    let claim = app.store.find_by_id(&claim_id).await.unwrap().unwrap();
    assert_eq!(claim.kind(), StatusKind::Verified);
    assert!(claim.verified_at().is_some());

    let response = get(
        &app,
        "/api/claims/status?type=solar_park&slug=zonnepark-a&country=Netherlands",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["claimed"], true);
    assert_eq!(json["claim"]["id"], claim_id.as_str());
    assert_eq!(json["claim"]["role"], "owner");
    assert_eq!(json["claim"]["tier"], "free");
    assert!(json["claim"].get("email").is_none());
    assert!(json["claim"].get("phone").is_none());

    // Same link again
    let response = get(&app, &format!("/api/claims/verify?token={}", token)).await;
    assert_eq!(
        location(&response),
        "/solarparks/netherlands/zonnepark-a?claimed=already_verified"
    );
}

#[tokio::test]
async fn test_claimed_listing_rejects_other_email() {
    let app = create_test_app();
    let claim_id = submit_ok(&app, "jan@example.nl").await;
    let token = token_for(&app, &claim_id).await;
    get(&app, &format!("/api/claims/verify?token={}", token)).await;

    let response = post_claim(&app, &submission("piet@example.nl")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "already_claimed");
}

#[tokio::test]
async fn test_invalid_email() {
    let app = create_test_app();

    let response = post_claim(&app, &submission("not-an-email")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "invalid_email");
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_body() {
    let app = create_test_app();

    let response = send(
        &app,
        Request::builder()
            .uri("/api/claims")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_unknown_token_redirects_to_error() {
    let app = create_test_app();

    let response = get(&app, &format!("/api/claims/verify?token={}", "ab".repeat(32))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/claim/error?reason=invalid_or_expired_token"
    );

    let response = get(&app, "/api/claims/verify").await;
    assert_eq!(location(&response), "/claim/error?reason=missing_token");
}

#[tokio::test]
async fn test_expired_link_redirects() {
    let app = create_test_app();
    let claim_id = submit_ok(&app, "jan@example.nl").await;
    let token = token_for(&app, &claim_id).await;

    app.clock.advance(Duration::days(7) + Duration::seconds(1));

    let response = get(&app, &format!("/api/claims/verify?token={}", token)).await;
    assert_eq!(location(&response), "/claim/error?reason=link_expired");

    let claim = app.store.find_by_id(&claim_id).await.unwrap().unwrap();
    assert_eq!(claim.kind(), StatusKind::Expired);
}

#[tokio::test]
async fn test_status_unclaimed_listing() {
    let app = create_test_app();
    submit_ok(&app, "jan@example.nl").await;

    let response = get(
        &app,
        "/api/claims/status?type=solar_park&slug=zonnepark-a&country=netherlands",
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["claimed"], false);
    assert!(json.get("claim").is_none());

    let response = get(&app, "/api/claims/status?type=wind_farm&slug=x&country=y").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_listing_type");
}

#[tokio::test]
async fn test_rate_limited() {
    let app = create_test_app_with_limit(2);

    submit_ok(&app, "a@example.nl").await;
    submit_ok(&app, "b@example.nl").await;

    let response = post_claim(&app, &submission("c@example.nl")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"], "rate_limited");
}

#[tokio::test]
async fn test_admin_stats_requires_secret() {
    let app = create_test_app();
    let claim_id = submit_ok(&app, "jan@example.nl").await;
    let token = token_for(&app, &claim_id).await;
    get(&app, &format!("/api/claims/verify?token={}", token)).await;

    let response = get(&app, "/api/claims").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");

    let response = send(
        &app,
        Request::builder()
            .uri("/api/claims")
            .header(header::AUTHORIZATION, "Bearer wrong-secret")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        Request::builder()
            .uri("/api/claims")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_SECRET))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["stats"]["total"], 1);
    assert_eq!(json["stats"]["verified"], 1);
    assert_eq!(json["stats"]["by_country"]["netherlands"], 1);
    assert_eq!(json["stats"]["by_type"]["solar_park"], 1);
    assert!(!json.to_string().contains("jan@example.nl"));
}

#[tokio::test]
async fn test_admin_expire_sweep() {
    let app = create_test_app();
    let claim_id = submit_ok(&app, "jan@example.nl").await;

    app.clock.advance(Duration::days(8));

    let response = send(
        &app,
        Request::builder()
            .uri("/api/claims/expire")
            .method("POST")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_SECRET))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["expired"], 1);

    let claim = app.store.find_by_id(&claim_id).await.unwrap().unwrap();
    assert_eq!(claim.kind(), StatusKind::Expired);

    let listing = ListingIdentity::new(ListingType::SolarPark, "zonnepark-a", "netherlands");
    assert!(app
        .store
        .find_pending_by_listing_and_email(&listing, "jan@example.nl")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_malformed_body_counts_against_rate_limit() {
    let app = create_test_app_with_limit(1);

    let response = send(
        &app,
        Request::builder()
            .uri("/api/claims")
            .method("POST")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    let response = post_claim(&app, &submission("jan@example.nl")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"], "rate_limited");
    assert!(app.store.is_empty().await);
}

/// Store that refuses every call, as when Redis is down
struct UnavailableStore;

fn refused<T>() -> claims_common::Result<T> {
    Err(Error::Redis("connection refused".to_string()))
}

#[async_trait]
impl ClaimStore for UnavailableStore {
    async fn find_by_id(&self, _id: &str) -> claims_common::Result<Option<Claim>> {
        refused()
    }

    async fn find_by_listing_identity(
        &self,
        _listing: &ListingIdentity,
    ) -> claims_common::Result<Option<Claim>> {
        refused()
    }

    async fn find_pending_by_listing_and_email(
        &self,
        _listing: &ListingIdentity,
        _email: &str,
    ) -> claims_common::Result<Option<Claim>> {
        refused()
    }

    async fn find_by_token(
        &self,
        _token: &VerificationToken,
    ) -> claims_common::Result<Option<Claim>> {
        refused()
    }

    async fn insert(&self, _claim: &Claim) -> claims_common::Result<()> {
        refused()
    }

    async fn update(&self, _claim: &Claim) -> claims_common::Result<()> {
        refused()
    }

    async fn commit_verification(
        &self,
        _claim: &Claim,
    ) -> claims_common::Result<ListingReservation> {
        refused()
    }

    async fn list_all(&self) -> claims_common::Result<Vec<Claim>> {
        refused()
    }

    async fn ping(&self) -> claims_common::Result<()> {
        refused()
    }
}

fn unavailable_router() -> axum::Router {
    let service = ClaimService::new(
        Arc::new(UnavailableStore),
        Arc::new(FixedWindowLimiter::new(RateLimitConfig::default())),
        Arc::new(LogNotifier),
        ServiceSettings::default(),
    );

    create_router(AppState {
        service,
        admin_secret: Some(ADMIN_SECRET.to_string()),
    })
}

#[tokio::test]
async fn test_storage_outage_responses() {
    let router = unavailable_router();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/claims")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&submission("jan@example.nl")).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "storage_error");
    assert_eq!(json["message"], "Something went wrong. Please try again later.");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/claims/verify?token={}", "ab".repeat(32)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/claim/error?reason=server_error");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/claims/status?type=solar_park&slug=zonnepark-a&country=netherlands")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "storage_error");

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["storage"], "unreachable");
}
