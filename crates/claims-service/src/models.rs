//! Data models for listing claims

use chrono::{DateTime, Duration, Utc};
use claims_common::{Error, ListingIdentity, VerificationToken};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How long a pending claim blocks a resubmission from the same email
pub const RESUBMIT_WINDOW_SECS: i64 = 24 * 60 * 60;

/// How long a verification link stays valid
pub const LINK_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

/// Relationship of the claimant to the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Representative,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Representative => "representative",
            Role::Other => "other",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "owner" => Ok(Role::Owner),
            "manager" => Ok(Role::Manager),
            "representative" => Ok(Role::Representative),
            "other" => Ok(Role::Other),
            other => Err(Error::Other(anyhow::anyhow!("unknown role: {}", other))),
        }
    }
}

/// Listing tier, reserved for paid features
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Verified,
    Premium,
}

/// Person asserting control over a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimant {
    /// Lowercased email address
    pub email: String,

    pub phone: String,

    pub role: Role,

    /// Free-text role, only present when `role` is `Other`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_other: Option<String>,
}

/// Lifecycle state of a claim.
///
/// The verification token lives inside `Pending`, so a claim that has left
/// the pending state cannot carry a live token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending {
        verification_token: VerificationToken,
    },
    Verified {
        verified_at: DateTime<Utc>,
    },
    Expired,
    Rejected,
}

/// Data-free view of [`ClaimStatus`], used for filtering and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Pending,
    Verified,
    Expired,
    Rejected,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Pending => "pending",
            StatusKind::Verified => "verified",
            StatusKind::Expired => "expired",
            StatusKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(StatusKind::Pending),
            "verified" => Ok(StatusKind::Verified),
            "expired" => Ok(StatusKind::Expired),
            "rejected" => Ok(StatusKind::Rejected),
            other => Err(Error::Other(anyhow::anyhow!("unknown status: {}", other))),
        }
    }
}

impl ClaimStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ClaimStatus::Pending { .. } => StatusKind::Pending,
            ClaimStatus::Verified { .. } => StatusKind::Verified,
            ClaimStatus::Expired => StatusKind::Expired,
            ClaimStatus::Rejected => StatusKind::Rejected,
        }
    }
}

/// Where a submission came from, kept for abuse investigation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Provenance {
    /// Identity used for rate limiting
    pub fn requester(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}

/// A submission that passed field validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub listing: ListingIdentity,
    pub listing_name: String,
    pub claimant: Claimant,
}

/// Claim record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Unique claim identifier
    pub id: String,

    /// Listing being claimed
    pub listing: ListingIdentity,

    /// Display name of the listing at submission time
    pub listing_name: String,

    pub claimant: Claimant,

    #[serde(flatten)]
    pub status: ClaimStatus,

    /// When the verification token was issued
    pub verification_sent_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub tier: Tier,
}

impl Claim {
    /// Create a new pending claim
    pub fn new(
        id: String,
        verification_token: VerificationToken,
        submission: ValidSubmission,
        provenance: Provenance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            listing: submission.listing,
            listing_name: submission.listing_name,
            claimant: submission.claimant,
            status: ClaimStatus::Pending { verification_token },
            verification_sent_at: now,
            created_at: now,
            updated_at: now,
            ip_address: provenance.ip_address,
            user_agent: provenance.user_agent,
            tier: Tier::Free,
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ClaimStatus::Pending { .. })
    }

    /// Token of a pending claim
    pub fn verification_token(&self) -> Option<&VerificationToken> {
        match &self.status {
            ClaimStatus::Pending { verification_token } => Some(verification_token),
            _ => None,
        }
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ClaimStatus::Verified { verified_at } => Some(verified_at),
            _ => None,
        }
    }

    /// True while a pending claim still blocks resubmission from the same email
    pub fn resubmission_blocked(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now - self.verification_sent_at < Duration::seconds(RESUBMIT_WINDOW_SECS)
    }

    /// True once the verification link is past its lifetime
    pub fn link_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.verification_sent_at > Duration::seconds(LINK_LIFETIME_SECS)
    }

    /// Mark pending claim as verified. Returns false if the claim was not pending.
    pub fn mark_verified(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(ClaimStatus::Verified { verified_at: now }, now)
    }

    /// Mark pending claim as expired
    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(ClaimStatus::Expired, now)
    }

    /// Mark pending claim as rejected
    pub fn mark_rejected(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(ClaimStatus::Rejected, now)
    }

    fn transition(&mut self, next: ClaimStatus, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        true
    }
}

/// Public, non-sensitive view of a verified claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimSummary {
    pub id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub tier: Tier,
}

impl From<&Claim> for ClaimSummary {
    fn from(claim: &Claim) -> Self {
        Self {
            id: claim.id.clone(),
            role: claim.claimant.role,
            verified_at: claim.verified_at(),
            tier: claim.tier,
        }
    }
}
