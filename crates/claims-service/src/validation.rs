//! Submission validation

use claims_common::{ListingIdentity, ListingType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::ClaimError;
use crate::models::{Claimant, Role, ValidSubmission};

/// Raw claim submission as received over the wire.
///
/// Fields default to empty so that missing values surface as validation
/// codes instead of deserialization failures.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitClaimRequest {
    #[serde(default)]
    pub listing_type: String,
    #[serde(default)]
    pub listing_slug: String,
    #[serde(default)]
    pub listing_country: String,
    #[serde(default)]
    pub listing_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub role_other: Option<String>,
}

/// `local@domain.tld` with no whitespace and a single `@`
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex")
});

/// Optional `+` followed by 8 to 15 ASCII digits
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{8,15}$").expect("Invalid phone regex"));

/// Separators people type into phone numbers
static PHONE_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-\(\)]").expect("Invalid phone separator regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Check phone shape after stripping spaces, hyphens and parentheses
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(&PHONE_SEPARATORS.replace_all(phone, ""))
}

/// Validate a submission. Checks run in a fixed order and stop at the first failure.
pub fn validate_submission(request: &SubmitClaimRequest) -> Result<ValidSubmission, ClaimError> {
    let email = request.email.as_str();
    if !is_valid_email(email) {
        return Err(ClaimError::InvalidEmail);
    }

    if !is_valid_phone(&request.phone) {
        return Err(ClaimError::InvalidPhone);
    }

    if request.listing_slug.trim().is_empty()
        || request.listing_type.trim().is_empty()
        || request.listing_country.trim().is_empty()
    {
        return Err(ClaimError::MissingListingInfo);
    }

    let role: Role = request.role.parse().map_err(|_| ClaimError::InvalidRole)?;

    let listing_type: ListingType = request
        .listing_type
        .parse()
        .map_err(|_| ClaimError::InvalidListingType)?;

    let role_other = match role {
        Role::Other => {
            let text = request
                .role_other
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .ok_or(ClaimError::MissingRoleOther)?;
            Some(text.to_string())
        }
        _ => None,
    };

    Ok(ValidSubmission {
        listing: ListingIdentity::new(listing_type, &request.listing_slug, &request.listing_country),
        listing_name: request.listing_name.trim().to_string(),
        claimant: Claimant {
            email: email.to_lowercase(),
            phone: request.phone.trim().to_string(),
            role,
            role_other,
        },
    })
}
