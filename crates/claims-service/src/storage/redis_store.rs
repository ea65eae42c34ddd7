//! Redis storage for listing claims
//!
//! Key layout:
//! - `claim:{id}`: claim JSON
//! - `claims:all`: set of claim ids
//! - `claim:token:{hex}`: claim id the token was issued to (never deleted)
//! - `claim:listing:{identity}:verified`: id of the claim holding the listing
//! - `claim:listing:{identity}:pending:{email}`: id of the pending claim from that email

use async_trait::async_trait;
use claims_common::{Error, ListingIdentity, Result, VerificationToken};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tracing::{debug, info};

use super::{ClaimStore, ListingReservation};
use crate::models::Claim;

const ALL_CLAIMS_KEY: &str = "claims:all";

/// KEYS: verified slot, claim record, pending slot. ARGV: claim id, claim JSON.
///
/// Returns nil when the claim does not exist, an empty string when the slot
/// was taken (or already held by this claim), otherwise the holder's id.
const COMMIT_VERIFICATION_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 0 then
    return false
end
local holder = redis.call('GET', KEYS[1])
if holder and holder ~= ARGV[1] then
    return holder
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
if redis.call('GET', KEYS[3]) == ARGV[1] then
    redis.call('DEL', KEYS[3])
end
return ''
"#;

/// Storage backend for claims
#[derive(Clone)]
pub struct RedisClaimStore {
    conn: ConnectionManager,
}

fn redis_err(e: RedisError) -> Error {
    Error::Redis(e.to_string())
}

fn claim_key(id: &str) -> String {
    format!("claim:{}", id)
}

fn token_key(token: &VerificationToken) -> String {
    format!("claim:token:{}", token.to_hex())
}

fn verified_key(listing: &ListingIdentity) -> String {
    format!("claim:listing:{}:verified", listing.storage_key())
}

fn pending_key(listing: &ListingIdentity, email: &str) -> String {
    format!(
        "claim:listing:{}:pending:{}",
        listing.storage_key(),
        email.to_lowercase()
    )
}

impl RedisClaimStore {
    /// Create a new storage instance
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(redis_err)?;

        let conn = ConnectionManager::new(client).await.map_err(redis_err)?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Shared connection, for components that keep their own keys in the same Redis
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Get a claim through an index key holding its id
    async fn find_via(&self, index_key: &str) -> Result<Option<Claim>> {
        let mut conn = self.conn.clone();
        let id: Option<String> = conn.get(index_key).await.map_err(redis_err)?;

        match id {
            Some(id) => self.find_by_id(&id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ClaimStore for RedisClaimStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Claim>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(claim_key(id)).await.map_err(redis_err)?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_by_listing_identity(&self, listing: &ListingIdentity) -> Result<Option<Claim>> {
        let claim = self.find_via(&verified_key(listing)).await?;
        Ok(claim.filter(|claim| claim.verified_at().is_some()))
    }

    async fn find_pending_by_listing_and_email(
        &self,
        listing: &ListingIdentity,
        email: &str,
    ) -> Result<Option<Claim>> {
        let claim = self.find_via(&pending_key(listing, email)).await?;
        Ok(claim.filter(Claim::is_pending))
    }

    async fn find_by_token(&self, token: &VerificationToken) -> Result<Option<Claim>> {
        self.find_via(&token_key(token)).await
    }

    async fn insert(&self, claim: &Claim) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(claim)?;

        // SET NX reserves the token; a second claim can never take it over
        if let Some(token) = claim.verification_token() {
            let reserved: bool = conn
                .set_nx(token_key(token), &claim.id)
                .await
                .map_err(redis_err)?;
            if !reserved {
                debug!("Token collision while inserting claim: {}", claim.id);
                return Err(Error::TokenCollision);
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(claim_key(&claim.id), &json)
            .ignore()
            .sadd(ALL_CLAIMS_KEY, &claim.id)
            .ignore();
        if claim.is_pending() {
            pipe.set(pending_key(&claim.listing, &claim.claimant.email), &claim.id)
                .ignore();
        }

        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            // Release the token so the dangling index entry does not outlive the failure
            if let Some(token) = claim.verification_token() {
                let _: std::result::Result<(), RedisError> = conn.del(token_key(token)).await;
            }
            return Err(redis_err(e));
        }

        info!("Stored claim {} for listing {}", claim.id, claim.listing);
        Ok(())
    }

    async fn update(&self, claim: &Claim) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = claim_key(&claim.id);

        let exists: bool = conn.exists(&key).await.map_err(redis_err)?;
        if !exists {
            return Err(Error::ClaimNotFound(claim.id.clone()));
        }

        let json = serde_json::to_string(claim)?;

        let mut pipe = redis::pipe();
        pipe.atomic().set(&key, &json).ignore();
        if !claim.is_pending() {
            pipe.del(pending_key(&claim.listing, &claim.claimant.email))
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_err)?;

        debug!("Updated claim: {} status: {}", claim.id, claim.kind());
        Ok(())
    }

    async fn commit_verification(&self, claim: &Claim) -> Result<ListingReservation> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(claim)?;

        // One script so the slot and the verified record are never written apart
        let script = redis::Script::new(COMMIT_VERIFICATION_SCRIPT);
        let outcome: Option<String> = script
            .key(verified_key(&claim.listing))
            .key(claim_key(&claim.id))
            .key(pending_key(&claim.listing, &claim.claimant.email))
            .arg(&claim.id)
            .arg(&json)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        match outcome {
            None => Err(Error::ClaimNotFound(claim.id.clone())),
            Some(holder) if holder.is_empty() => {
                debug!("Claim {} took listing {}", claim.id, claim.listing);
                Ok(ListingReservation::Acquired)
            }
            Some(holder) => Ok(ListingReservation::HeldBy(holder)),
        }
    }

    async fn list_all(&self) -> Result<Vec<Claim>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(ALL_CLAIMS_KEY).await.map_err(redis_err)?;

        let mut claims = Vec::new();
        for id in ids {
            if let Some(claim) = self.find_by_id(&id).await? {
                claims.push(claim);
            }
        }

        // Sort by created_at ascending
        claims.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(claims)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}
