//! Outcomes of the claim workflow that are not a success

use axum::http::StatusCode;
use thiserror::Error;

/// Every way a claim operation can fail.
///
/// Business-rule failures carry a stable machine-readable [`code`](Self::code);
/// only `Storage` represents an infrastructure fault.
#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Invalid phone number")]
    InvalidPhone,

    #[error("Missing listing information")]
    MissingListingInfo,

    #[error("Invalid role")]
    InvalidRole,

    #[error("Invalid listing type")]
    InvalidListingType,

    #[error("Missing role description")]
    MissingRoleOther,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("This listing has already been claimed")]
    AlreadyClaimed,

    #[error("A verification email was already sent")]
    VerificationAlreadySent,

    #[error("Too many requests")]
    RateLimited,

    #[error("Missing verification token")]
    MissingToken,

    #[error("Invalid or expired verification link")]
    InvalidOrExpiredToken,

    #[error("This verification link has expired")]
    LinkExpired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(#[from] claims_common::Error),
}

impl ClaimError {
    /// Stable error code returned to callers
    pub fn code(&self) -> &'static str {
        match self {
            ClaimError::InvalidEmail => "invalid_email",
            ClaimError::InvalidPhone => "invalid_phone",
            ClaimError::MissingListingInfo => "missing_listing_info",
            ClaimError::InvalidRole => "invalid_role",
            ClaimError::InvalidListingType => "invalid_listing_type",
            ClaimError::MissingRoleOther => "missing_role_other",
            ClaimError::InvalidRequest(_) => "invalid_request",
            ClaimError::AlreadyClaimed => "already_claimed",
            ClaimError::VerificationAlreadySent => "verification_already_sent",
            ClaimError::RateLimited => "rate_limited",
            ClaimError::MissingToken => "missing_token",
            ClaimError::InvalidOrExpiredToken => "invalid_or_expired_token",
            ClaimError::LinkExpired => "link_expired",
            ClaimError::Unauthorized => "unauthorized",
            ClaimError::Storage(_) => "storage_error",
        }
    }

    /// HTTP status for the JSON surface
    pub fn status(&self) -> StatusCode {
        match self {
            ClaimError::InvalidEmail
            | ClaimError::InvalidPhone
            | ClaimError::MissingListingInfo
            | ClaimError::InvalidRole
            | ClaimError::InvalidListingType
            | ClaimError::MissingRoleOther
            | ClaimError::InvalidRequest(_)
            | ClaimError::MissingToken
            | ClaimError::InvalidOrExpiredToken
            | ClaimError::LinkExpired => StatusCode::BAD_REQUEST,
            ClaimError::AlreadyClaimed | ClaimError::VerificationAlreadySent => {
                StatusCode::CONFLICT
            }
            ClaimError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ClaimError::Unauthorized => StatusCode::UNAUTHORIZED,
            ClaimError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable hint shown next to the code. Never includes internals.
    pub fn message(&self) -> String {
        match self {
            ClaimError::InvalidEmail => {
                "email: expected an address like name@example.com".to_string()
            }
            ClaimError::InvalidPhone => {
                "phone: expected 8 to 15 digits, optionally starting with +".to_string()
            }
            ClaimError::MissingListingInfo => {
                "listing_type, listing_slug and listing_country are required".to_string()
            }
            ClaimError::InvalidRole => {
                "role: must be one of owner, manager, representative, other".to_string()
            }
            ClaimError::InvalidListingType => {
                "listing_type: must be solar_park or sheep_farm".to_string()
            }
            ClaimError::MissingRoleOther => {
                "role_other: describe your role when selecting other".to_string()
            }
            ClaimError::InvalidRequest(detail) => detail.clone(),
            ClaimError::AlreadyClaimed => {
                "If you believe this is an error, please contact support.".to_string()
            }
            ClaimError::VerificationAlreadySent => {
                "Please check your email or try again in 24 hours.".to_string()
            }
            ClaimError::RateLimited => "Too many requests. Please try again later.".to_string(),
            ClaimError::MissingToken | ClaimError::InvalidOrExpiredToken => {
                "This verification link is not valid.".to_string()
            }
            ClaimError::LinkExpired => {
                "This verification link has expired. Please submit a new claim.".to_string()
            }
            ClaimError::Unauthorized => "Unauthorized".to_string(),
            ClaimError::Storage(_) => "Something went wrong. Please try again later.".to_string(),
        }
    }

    /// Reason code used on the verification error page
    pub fn redirect_reason(&self) -> &'static str {
        match self {
            ClaimError::MissingToken => "missing_token",
            ClaimError::InvalidOrExpiredToken => "invalid_or_expired_token",
            ClaimError::LinkExpired => "link_expired",
            _ => "server_error",
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, ClaimError::Storage(_))
    }
}
