//! Bearer credential type.
//!
//! The token issued by `/login` and `/register`. It is opaque to the client
//! and only ever leaves memory as an `Authorization` header or through the
//! session store.

use core::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Opaque bearer token proving an authenticated session.
///
/// `Debug` never prints the token.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token for an `Authorization` header or for storage.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Bearer <token>` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.expose())
    }

    /// Whether the token is empty or whitespace (treated as no credential).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new("super-secret-token");
        let debug = format!("{credential:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn test_credential_bearer_and_blank() {
        assert_eq!(Credential::new("abc").bearer(), "Bearer abc");
        assert!(Credential::new("  ").is_blank());
        assert!(!Credential::new("abc").is_blank());
    }
}
