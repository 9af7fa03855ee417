use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Query parameter the credential travels in.
pub const CREDENTIAL_PARAM: &str = "access_token";

/// Steam Web API key.
///
/// Never printed in full: `Debug` and log lines show only [`ApiKey::fingerprint`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::InvalidCredential("is empty"));
        }
        if raw.chars().any(char::is_control) {
            return Err(ValidationError::InvalidCredential(
                "contains invalid characters",
            ));
        }
        Ok(Self(raw))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the key truncated to 12 hex chars, prefixed with `key_`.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

pub(crate) fn fingerprint(raw: &str) -> String {
    let hash = Sha256::digest(raw.as_bytes());
    let hex: String = hash[..6].iter().map(|b| format!("{b:02x}")).collect();
    format!("key_{hex}")
}
