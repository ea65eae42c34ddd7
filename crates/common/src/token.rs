use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Single-use credential mailed to a claimant to prove control of their inbox.
///
/// 32 random bytes, carried over the wire as 64 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VerificationToken([u8; 32]);

impl VerificationToken {
    /// Create a token from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a token from the hex form used in verification links
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|_| Error::InvalidToken)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidToken)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Tokens end up in request spans; only a prefix is ever printed.
impl fmt::Debug for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationToken({}..)", hex::encode(&self.0[..4]))
    }
}

impl From<VerificationToken> for String {
    fn from(token: VerificationToken) -> Self {
        token.to_hex()
    }
}

impl TryFrom<String> for VerificationToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

/// Source of claim identifiers and verification tokens
pub trait TokenGenerator: Send + Sync {
    /// Allocate a new opaque claim identifier
    fn claim_id(&self) -> String;

    /// Allocate a new verification token
    fn verification_token(&self) -> VerificationToken;
}

/// Generator backed by the operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureTokenGenerator;

impl TokenGenerator for SecureTokenGenerator {
    fn claim_id(&self) -> String {
        format!("claim_{}", uuid::Uuid::new_v4().simple())
    }

    fn verification_token(&self) -> VerificationToken {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        VerificationToken::new(bytes)
    }
}
