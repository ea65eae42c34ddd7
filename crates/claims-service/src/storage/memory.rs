//! In-memory claim store, for tests and single-node development

use async_trait::async_trait;
use claims_common::{Error, ListingIdentity, Result, VerificationToken};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ClaimStore, ListingReservation};
use crate::models::Claim;

#[derive(Debug, Default)]
struct MemoryState {
    claims: HashMap<String, Claim>,
    /// Insertion order of claim ids
    order: Vec<String>,
    /// Every token ever issued, kept after the claim leaves pending
    by_token: HashMap<VerificationToken, String>,
    verified: HashMap<ListingIdentity, String>,
    pending: HashMap<(ListingIdentity, String), String>,
}

/// Claim store keeping everything behind one lock, so every write is atomic
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    state: RwLock<MemoryState>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored claims
    pub async fn len(&self) -> usize {
        self.state.read().await.claims.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn pending_key(claim: &Claim) -> (ListingIdentity, String) {
    (claim.listing.clone(), claim.claimant.email.clone())
}

impl MemoryState {
    /// Write a claim record, dropping its pending slot once it is no longer pending
    fn store(&mut self, claim: &Claim) {
        if !claim.is_pending() {
            let key = pending_key(claim);
            if self.pending.get(&key) == Some(&claim.id) {
                self.pending.remove(&key);
            }
        }

        self.claims.insert(claim.id.clone(), claim.clone());
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Claim>> {
        Ok(self.state.read().await.claims.get(id).cloned())
    }

    async fn find_by_listing_identity(&self, listing: &ListingIdentity) -> Result<Option<Claim>> {
        let state = self.state.read().await;
        Ok(state
            .verified
            .get(listing)
            .and_then(|id| state.claims.get(id))
            .filter(|claim| claim.verified_at().is_some())
            .cloned())
    }

    async fn find_pending_by_listing_and_email(
        &self,
        listing: &ListingIdentity,
        email: &str,
    ) -> Result<Option<Claim>> {
        let state = self.state.read().await;
        let key = (listing.clone(), email.to_lowercase());
        Ok(state
            .pending
            .get(&key)
            .and_then(|id| state.claims.get(id))
            .filter(|claim| claim.is_pending())
            .cloned())
    }

    async fn find_by_token(&self, token: &VerificationToken) -> Result<Option<Claim>> {
        let state = self.state.read().await;
        Ok(state
            .by_token
            .get(token)
            .and_then(|id| state.claims.get(id))
            .cloned())
    }

    async fn insert(&self, claim: &Claim) -> Result<()> {
        let mut state = self.state.write().await;

        if let Some(token) = claim.verification_token() {
            if state.by_token.contains_key(token) {
                return Err(Error::TokenCollision);
            }
            state.by_token.insert(token.clone(), claim.id.clone());
        }

        if claim.is_pending() {
            state.pending.insert(pending_key(claim), claim.id.clone());
        }

        if state.claims.insert(claim.id.clone(), claim.clone()).is_none() {
            state.order.push(claim.id.clone());
        }

        Ok(())
    }

    async fn update(&self, claim: &Claim) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.claims.contains_key(&claim.id) {
            return Err(Error::ClaimNotFound(claim.id.clone()));
        }

        state.store(claim);
        Ok(())
    }

    async fn commit_verification(&self, claim: &Claim) -> Result<ListingReservation> {
        let mut state = self.state.write().await;

        if !state.claims.contains_key(&claim.id) {
            return Err(Error::ClaimNotFound(claim.id.clone()));
        }

        if let Some(holder) = state.verified.get(&claim.listing) {
            if holder != &claim.id {
                return Ok(ListingReservation::HeldBy(holder.clone()));
            }
        }

        state
            .verified
            .insert(claim.listing.clone(), claim.id.clone());
        state.store(claim);
        Ok(ListingReservation::Acquired)
    }

    async fn list_all(&self) -> Result<Vec<Claim>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.claims.get(id))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
