//! Session holder.
//!
//! One [`SessionHolder`] owns the current [`Session`] for a context and
//! publishes every change through a `tokio::sync::watch` channel. Clones
//! share the same channel, so a logout through any clone is seen by all of
//! them immediately. Holders in other processes over the same
//! [`FileSessionStore`] find out through filesystem notifications on the
//! session directory ([`SessionHolder::spawn_store_watcher`]), with polling
//! as the fallback where notifications are unavailable.
//!
//! The holder never talks to the network.

mod store;
mod fs_watch;

pub use store::{FileSessionStore, MemorySessionStore, SESSION_FILE, SessionStore, SessionStoreError};
pub use fs_watch::WatchError;

use std::sync::{Arc, Weak};
use std::time::Duration;

use redseam_core::{Credential, Session};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::AuthResponse;

/// Holds the session for one context.
#[derive(Clone)]
pub struct SessionHolder {
    inner: Arc<SessionHolderInner>,
}

struct SessionHolderInner {
    store: Arc<dyn SessionStore>,
    tx: watch::Sender<Option<Session>>,
}

impl std::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHolder")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionHolder {
    /// Create a holder, loading whatever session the store already has.
    ///
    /// An unreadable or corrupt store starts the holder logged out.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let initial = match store.load() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Stored session unavailable, starting logged out");
                None
            }
        };
        let (tx, _) = watch::channel(initial);
        Self {
            inner: Arc::new(SessionHolderInner { store, tx }),
        }
    }

    /// Holder over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Current session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.inner.tx.borrow().clone()
    }

    /// Current credential. A blank token counts as no credential.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .tx
            .borrow()
            .as_ref()
            .map(|session| session.credential.clone())
            .filter(|credential| !credential.is_blank())
    }

    /// Whether a usable credential is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }

    /// Replace the session and persist it.
    ///
    /// The in-memory session is updated and published even when persisting
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the session could not be saved.
    pub fn set_session(&self, session: Session) -> Result<(), SessionStoreError> {
        let saved = self.inner.store.save(&session);
        if let Err(e) = &saved {
            warn!(error = %e, "Failed to persist session");
        }
        info!(user_id = %session.user_id(), "Session established");
        self.publish(Some(session));
        saved
    }

    /// Turn a login or registration response into the current session.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the session could not be saved; the
    /// session is still active in memory.
    pub fn establish(&self, auth: AuthResponse) -> Result<Session, SessionStoreError> {
        let session = Session::new(Credential::new(auth.token), auth.user);
        self.set_session(session.clone())?;
        Ok(session)
    }

    /// Drop the session and remove everything persisted for it.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the stored session could not be removed;
    /// the in-memory session is cleared regardless.
    pub fn clear_session(&self) -> Result<(), SessionStoreError> {
        let cleared = self.inner.store.clear();
        if let Err(e) = &cleared {
            warn!(error = %e, "Failed to remove stored session");
        }
        if self.publish(None) {
            info!("Session cleared");
        }
        cleared
    }

    /// Receiver that is notified on every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.tx.subscribe()
    }

    /// Re-read the store and publish if it differs from memory.
    ///
    /// Returns `true` when the session changed. A failed read leaves the
    /// in-memory session untouched.
    pub fn reload(&self) -> bool {
        match self.inner.store.load() {
            Ok(stored) => {
                let changed = self.publish(stored);
                if changed {
                    debug!(
                        authenticated = self.is_authenticated(),
                        "Session changed in store"
                    );
                }
                changed
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload session from store");
                false
            }
        }
    }

    /// Follow changes other processes make to the store.
    ///
    /// Uses filesystem notifications on the store's directory. Stores that
    /// cannot be watched fall back to polling every `fallback_interval`.
    pub fn spawn_store_watcher(&self, fallback_interval: Duration) -> JoinHandle<()> {
        match self.spawn_store_notifier() {
            Ok(handle) => handle,
            Err(e) => {
                debug!(error = %e, interval = ?fallback_interval, "Falling back to polling the session store");
                self.spawn_store_poller(fallback_interval)
            }
        }
    }

    /// Reload whenever the session file changes on disk.
    ///
    /// The task exits once every clone of this holder is dropped.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Unsupported` for stores without a directory, or
    /// the platform error if the watch cannot be installed.
    pub fn spawn_store_notifier(&self) -> Result<JoinHandle<()>, WatchError> {
        let dir = self.inner.store.location().ok_or(WatchError::Unsupported)?;
        let mut dir_watch = fs_watch::watch_dir(dir)?;
        let weak: Weak<SessionHolderInner> = Arc::downgrade(&self.inner);
        let mut alive = self.inner.tx.subscribe();

        // Catch anything written before the watch was in place.
        self.reload();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = dir_watch.events.recv() => {
                        let Some(event) = event else { break };
                        let Some(inner) = weak.upgrade() else { break };
                        match event {
                            Ok(event) if fs_watch::touches_session_file(&event) => {
                                SessionHolder { inner }.reload();
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Session directory watch error"),
                        }
                    }
                    changed = alive.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Session holder dropped, stopping store notifier");
        }))
    }

    /// Poll the store every `interval` and publish changes made by other
    /// processes.
    ///
    /// The task holds only a weak reference and exits once every clone of
    /// this holder is dropped.
    pub fn spawn_store_poller(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<SessionHolderInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Session holder dropped, stopping store poller");
                    break;
                };
                SessionHolder { inner }.reload();
            }
        })
    }

    fn publish(&self, next: Option<Session>) -> bool {
        self.inner.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}
