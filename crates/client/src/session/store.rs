//! Durable session storage.
//!
//! The store is the per-user equivalent of browser local storage: whatever
//! one process writes here, every other process pointed at the same
//! directory reads back.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use redseam_core::{Credential, Session, User};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// File name of the persisted session inside the session directory.
pub const SESSION_FILE: &str = "session.json";

/// Errors from reading or writing the session store.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Filesystem error.
    #[error("session storage unavailable: {0}")]
    Io(#[from] io::Error),

    /// Stored data could not be parsed.
    #[error("stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage backend for the session.
pub trait SessionStore: Send + Sync {
    /// Read the stored session, `Ok(None)` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or holds invalid data.
    fn load(&self) -> Result<Option<Session>, SessionStoreError>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Remove every stored key.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    fn clear(&self) -> Result<(), SessionStoreError>;

    /// Directory whose changes reflect changes to the stored session, if the
    /// store lives on disk.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// On-disk layout, keyed the way the web storefront keyed local storage.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    #[serde(rename = "authToken")]
    auth_token: String,
    #[serde(rename = "userData")]
    user_data: User,
}

// =============================================================================
// FileSessionStore
// =============================================================================

/// Session persisted as JSON in `<dir>/session.json`.
///
/// Writes go through a temporary file and a rename so readers never observe
/// a half-written session.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the session file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn write_atomically(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // Each writer gets its own temp file so concurrent saves never share one.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        let contents = match fs::read(self.path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredSession = serde_json::from_slice(&contents)?;
        Ok(Some(Session::new(
            Credential::new(stored.auth_token),
            stored.user_data,
        )))
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let stored = StoredSession {
            auth_token: session.credential.expose().to_string(),
            user_data: session.user.clone(),
        };
        let contents = serde_json::to_vec_pretty(&stored)?;
        self.write_atomically(&self.path(), &contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}

// =============================================================================
// MemorySessionStore
// =============================================================================

/// In-process store. Share one instance behind an `Arc` to simulate several
/// contexts over the same storage.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a session.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
