pub mod error;
pub mod listing;
pub mod token;

pub use error::{Error, Result};
pub use listing::{ListingIdentity, ListingType};
pub use token::{SecureTokenGenerator, TokenGenerator, VerificationToken};
