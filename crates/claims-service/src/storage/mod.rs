//! Claim storage
//!
//! The store owns two constraints the workflow relies on:
//! - a verification token resolves to at most one claim (insert fails with
//!   `TokenCollision` instead of overwriting), and
//! - at most one claim per listing identity holds the verified slot, and the
//!   slot is only ever written together with the verified claim record
//!   (`commit_verification`).

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use claims_common::{ListingIdentity, Result, VerificationToken};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Claim, StatusKind};

pub use memory::MemoryClaimStore;
pub use redis_store::RedisClaimStore;

/// Result of trying to take the verified slot of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingReservation {
    /// The slot was free, or already held by the same claim, and now belongs to it
    Acquired,
    /// The slot already belongs to the given claim id
    HeldBy(String),
}

/// Aggregate claim counts. Contains no claimant data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimStats {
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
    pub expired: usize,
    pub rejected: usize,
    /// Verified claims per country
    pub by_country: BTreeMap<String, usize>,
    /// Verified claims per listing type
    pub by_type: BTreeMap<String, usize>,
}

impl ClaimStats {
    pub fn from_claims<'a>(claims: impl IntoIterator<Item = &'a Claim>) -> Self {
        let mut stats = ClaimStats::default();

        for claim in claims {
            stats.total += 1;
            match claim.kind() {
                StatusKind::Pending => stats.pending += 1,
                StatusKind::Expired => stats.expired += 1,
                StatusKind::Rejected => stats.rejected += 1,
                StatusKind::Verified => {
                    stats.verified += 1;
                    *stats
                        .by_country
                        .entry(claim.listing.country.clone())
                        .or_default() += 1;
                    *stats
                        .by_type
                        .entry(claim.listing.listing_type.to_string())
                        .or_default() += 1;
                }
            }
        }

        stats
    }
}

/// Durable collection of claim records
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Get a claim by id
    async fn find_by_id(&self, id: &str) -> Result<Option<Claim>>;

    /// Get the verified claim of a listing, if any
    async fn find_by_listing_identity(&self, listing: &ListingIdentity) -> Result<Option<Claim>>;

    /// Get the pending claim for a listing from one email address
    async fn find_pending_by_listing_and_email(
        &self,
        listing: &ListingIdentity,
        email: &str,
    ) -> Result<Option<Claim>>;

    /// Get the claim a verification token was issued to, whatever its current status
    async fn find_by_token(&self, token: &VerificationToken) -> Result<Option<Claim>>;

    /// Store a new claim. Fails with `TokenCollision` if its token was ever issued before.
    async fn insert(&self, claim: &Claim) -> Result<()>;

    /// Replace an existing claim record. Fails with `ClaimNotFound` if it does not exist.
    async fn update(&self, claim: &Claim) -> Result<()>;

    /// Atomically take the verified slot of the claim's listing and store the
    /// claim record, which must already be marked verified.
    ///
    /// Nothing is written when another claim holds the slot. Fails with
    /// `ClaimNotFound` if the claim does not exist.
    async fn commit_verification(&self, claim: &Claim) -> Result<ListingReservation>;

    /// All claims, oldest first
    async fn list_all(&self) -> Result<Vec<Claim>>;

    /// Aggregate counts for reporting
    async fn stats(&self) -> Result<ClaimStats> {
        let claims = self.list_all().await?;
        Ok(ClaimStats::from_claims(&claims))
    }

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;
}
