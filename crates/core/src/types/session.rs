//! Session types.
//!
//! A [`Session`] is what a successful login or registration leaves behind:
//! the bearer credential plus the profile the API returned with it.

use serde::{Deserialize, Serialize};

use super::credential::Credential;
use super::id::UserId;

/// Profile of the logged-in user as returned by `/login` and `/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Email address (kept as the server sent it).
    pub email: String,
    /// Avatar URL, if one was uploaded.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer credential.
    pub credential: Credential,
    /// Profile of the user the credential belongs to.
    pub user: User,
}

impl Session {
    /// Create a session from a credential and profile.
    #[must_use]
    pub const fn new(credential: Credential, user: User) -> Self {
        Self { credential, user }
    }

    /// User ID of the session owner.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Name to show in a header or greeting.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.user.username
    }

    /// Avatar reference, if any.
    #[must_use]
    pub fn avatar(&self) -> Option<&str> {
        self.user.avatar.as_deref()
    }
}
