//! Claim lifecycle
//!
//! `pending` is the only non-terminal state. A claim leaves it by being
//! verified, by its link expiring, by a newer submission from the same
//! email after the resubmission window, or by losing the listing to a
//! claim that verified first.

use claims_common::{
    Error, ListingIdentity, SecureTokenGenerator, TokenGenerator, VerificationToken,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::ClaimError;
use crate::models::{Claim, Provenance, StatusKind};
use crate::notify::Notifier;
use crate::rate_limit::RateLimiter;
use crate::storage::{ClaimStats, ClaimStore, ListingReservation};
use crate::validation::{validate_submission, SubmitClaimRequest};

/// Attempts at drawing a fresh token when the store reports a collision
const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Successful submission. The verification token is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub claim_id: String,
    pub message: String,
}

/// Successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The claim moved from pending to verified
    Verified {
        claim_id: String,
        listing: ListingIdentity,
    },
    /// The claim had been verified before; nothing changed
    AlreadyVerified {
        claim_id: String,
        listing: ListingIdentity,
    },
}

impl VerifyOutcome {
    pub fn claim_id(&self) -> &str {
        match self {
            VerifyOutcome::Verified { claim_id, .. }
            | VerifyOutcome::AlreadyVerified { claim_id, .. } => claim_id,
        }
    }

    pub fn listing(&self) -> &ListingIdentity {
        match self {
            VerifyOutcome::Verified { listing, .. }
            | VerifyOutcome::AlreadyVerified { listing, .. } => listing,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            VerifyOutcome::Verified { .. } => "Email verified! Your listing claim is now active.",
            VerifyOutcome::AlreadyVerified { .. } => "This listing has already been verified",
        }
    }
}

/// Settings for [`ClaimService`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base URL verification links point at
    pub public_base_url: String,

    /// Upper bound for every storage call
    pub storage_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            public_base_url: "https://ombaa.com".to_string(),
            storage_timeout: Duration::from_secs(5),
        }
    }
}

/// One async mutex per listing identity, serializing read-check-write sequences
#[derive(Debug, Default)]
struct ListingLocks {
    locks: Mutex<HashMap<ListingIdentity, Arc<Mutex<()>>>>,
}

impl ListingLocks {
    async fn acquire(&self, listing: &ListingIdentity) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody else holds a handle to are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(listing.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Claim workflow: submission, verification, status and reporting
pub struct ClaimService {
    store: Arc<dyn ClaimStore>,
    limiter: Arc<dyn RateLimiter>,
    notifier: Arc<dyn Notifier>,
    tokens: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    locks: ListingLocks,
    settings: ServiceSettings,
}

impl ClaimService {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        limiter: Arc<dyn RateLimiter>,
        notifier: Arc<dyn Notifier>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            limiter,
            notifier,
            tokens: Arc::new(SecureTokenGenerator),
            clock: Arc::new(SystemClock),
            locks: ListingLocks::default(),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn store(&self) -> &Arc<dyn ClaimStore> {
        &self.store
    }

    /// Link mailed to the claimant
    pub fn verification_url(&self, token: &VerificationToken) -> String {
        format!(
            "{}/api/claims/verify?token={}",
            self.settings.public_base_url.trim_end_matches('/'),
            token.to_hex()
        )
    }

    /// Run a storage call under the configured timeout
    async fn timed<T>(
        &self,
        call: impl Future<Output = claims_common::Result<T>>,
    ) -> Result<T, ClaimError> {
        match tokio::time::timeout(self.settings.storage_timeout, call).await {
            Ok(result) => result.map_err(ClaimError::from),
            Err(_) => Err(ClaimError::Storage(Error::Timeout(
                self.settings.storage_timeout.as_millis() as u64,
            ))),
        }
    }

    /// Count one submission attempt against the requester's budget
    pub async fn check_rate_limit(&self, provenance: &Provenance) -> Result<(), ClaimError> {
        if !self.limiter.allow(provenance.requester()).await {
            info!("Rate limited claim submission from {}", provenance.requester());
            return Err(ClaimError::RateLimited);
        }
        Ok(())
    }

    /// Submit a new claim. Counts against the rate limit before anything else.
    pub async fn submit(
        &self,
        request: SubmitClaimRequest,
        provenance: Provenance,
    ) -> Result<SubmitReceipt, ClaimError> {
        self.check_rate_limit(&provenance).await?;

        let submission = validate_submission(&request)?;
        let listing = submission.listing.clone();
        let email = submission.claimant.email.clone();

        let _guard = self.locks.acquire(&listing).await;
        let now = self.clock.now();

        if self
            .timed(self.store.find_by_listing_identity(&listing))
            .await?
            .is_some()
        {
            debug!("Listing {} already claimed", listing);
            return Err(ClaimError::AlreadyClaimed);
        }

        if let Some(mut previous) = self
            .timed(self.store.find_pending_by_listing_and_email(&listing, &email))
            .await?
        {
            if previous.resubmission_blocked(now) {
                return Err(ClaimError::VerificationAlreadySent);
            }

            previous.mark_expired(now);
            self.timed(self.store.update(&previous)).await?;
            info!(
                "Expired stale pending claim {} superseded by a new submission",
                previous.id
            );
        }

        let mut attempt = 0;
        let claim = loop {
            attempt += 1;
            let claim = Claim::new(
                self.tokens.claim_id(),
                self.tokens.verification_token(),
                submission.clone(),
                provenance.clone(),
                now,
            );

            match self.timed(self.store.insert(&claim)).await {
                Ok(()) => break claim,
                Err(ClaimError::Storage(Error::TokenCollision)) if attempt < MAX_TOKEN_ATTEMPTS => {
                    warn!("Verification token collision, drawing a new token");
                }
                Err(e) => return Err(e),
            }
        };

        info!("Claim {} submitted for listing {}", claim.id, claim.listing);

        if let Some(token) = claim.verification_token() {
            let url = self.verification_url(token);
            if let Err(e) = self.notifier.send_verification(&claim, &url).await {
                warn!("Failed to deliver verification link for claim {}: {}", claim.id, e);
            }
        }

        Ok(SubmitReceipt {
            claim_id: claim.id,
            message: "Claim submitted. Please check your email to verify.".to_string(),
        })
    }

    /// Verify a claim from the token in an emailed link
    pub async fn verify(&self, token: Option<&str>) -> Result<VerifyOutcome, ClaimError> {
        let raw = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ClaimError::MissingToken)?;

        // Malformed and unknown tokens are indistinguishable to the caller
        let token =
            VerificationToken::from_hex(raw).map_err(|_| ClaimError::InvalidOrExpiredToken)?;

        let found = self
            .timed(self.store.find_by_token(&token))
            .await?
            .ok_or(ClaimError::InvalidOrExpiredToken)?;

        let _guard = self.locks.acquire(&found.listing).await;

        // Re-read under the listing lock; a concurrent request may have moved it
        let mut claim = self
            .timed(self.store.find_by_id(&found.id))
            .await?
            .ok_or(ClaimError::InvalidOrExpiredToken)?;

        match claim.kind() {
            StatusKind::Verified => {
                return Ok(VerifyOutcome::AlreadyVerified {
                    claim_id: claim.id,
                    listing: claim.listing,
                });
            }
            StatusKind::Expired | StatusKind::Rejected => return Err(ClaimError::LinkExpired),
            StatusKind::Pending => {}
        }

        if claim.verification_token() != Some(&token) {
            return Err(ClaimError::InvalidOrExpiredToken);
        }

        let now = self.clock.now();

        if claim.link_expired(now) {
            claim.mark_expired(now);
            self.timed(self.store.update(&claim)).await?;
            info!("Verification link for claim {} expired", claim.id);
            return Err(ClaimError::LinkExpired);
        }

        let mut verified = claim.clone();
        verified.mark_verified(now);

        // Slot and record are written together; on failure neither is
        if let ListingReservation::HeldBy(holder) = self
            .timed(self.store.commit_verification(&verified))
            .await?
        {
            claim.mark_rejected(now);
            self.timed(self.store.update(&claim)).await?;
            warn!(
                "Claim {} rejected: listing {} already verified by claim {}",
                claim.id, claim.listing, holder
            );
            return Err(ClaimError::LinkExpired);
        }
        let claim = verified;

        info!("Claim {} verified for listing {}", claim.id, claim.listing);

        if let Err(e) = self.notifier.send_listing_claimed(&claim).await {
            warn!("Failed to announce verified claim {}: {}", claim.id, e);
        }

        Ok(VerifyOutcome::Verified {
            claim_id: claim.id,
            listing: claim.listing,
        })
    }

    /// The verified claim of a listing, if it has been claimed
    pub async fn status(&self, listing: &ListingIdentity) -> Result<Option<Claim>, ClaimError> {
        self.timed(self.store.find_by_listing_identity(listing))
            .await
    }

    /// Get a claim by id
    pub async fn claim(&self, id: &str) -> Result<Option<Claim>, ClaimError> {
        self.timed(self.store.find_by_id(id)).await
    }

    /// Aggregate counts for reporting
    pub async fn stats(&self) -> Result<ClaimStats, ClaimError> {
        self.timed(self.store.stats()).await
    }

    /// All claims, optionally restricted to one status
    pub async fn list(&self, status: Option<StatusKind>) -> Result<Vec<Claim>, ClaimError> {
        let claims = self.timed(self.store.list_all()).await?;
        Ok(claims
            .into_iter()
            .filter(|claim| status.map_or(true, |kind| claim.kind() == kind))
            .collect())
    }

    /// Mark every pending claim whose link has outlived its lifetime as expired.
    ///
    /// Pending claims otherwise only expire lazily, when verified or resubmitted.
    /// Returns the number of claims expired.
    pub async fn expire_stale(&self) -> Result<usize, ClaimError> {
        let now = self.clock.now();
        let candidates: Vec<Claim> = self
            .timed(self.store.list_all())
            .await?
            .into_iter()
            .filter(|claim| claim.is_pending() && claim.link_expired(now))
            .collect();

        let mut expired = 0;
        for candidate in candidates {
            let _guard = self.locks.acquire(&candidate.listing).await;

            let Some(mut claim) = self.timed(self.store.find_by_id(&candidate.id)).await? else {
                continue;
            };
            if claim.is_pending() && claim.link_expired(now) {
                claim.mark_expired(now);
                self.timed(self.store.update(&claim)).await?;
                expired += 1;
            }
        }

        info!("Expired {} stale pending claims", expired);
        Ok(expired)
    }

    /// Check storage is reachable
    pub async fn ping(&self) -> Result<(), ClaimError> {
        self.timed(self.store.ping()).await
    }
}
