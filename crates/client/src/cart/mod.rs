//! Cart synchronization.
//!
//! [`CartSync`] mirrors the server-side cart of the logged-in user. The
//! server is the source of truth: every mutation is sent to the API and
//! followed by a full refresh, and the refreshed cart replaces the local
//! snapshot wholesale.
//!
//! # States
//!
//! ```text
//! Unauthenticated --refresh--> Loading --> Ready
//! Ready --mutation--> Loading --> Ready
//! Ready | Loading --401 / logout--> Unauthenticated
//! ```
//!
//! # Overlapping operations
//!
//! Each refresh takes a ticket when its request starts. A response is
//! applied only if no later ticket has been applied and the session still
//! carries the credential the request was made with, so a slow response can
//! never overwrite a newer one or resurrect a cart after logout.

mod backend;
mod error;

pub use backend::CartBackend;
pub use error::CartError;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use redseam_core::{CartLine, CartSnapshot, Credential, LineKey, Price, Session};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::session::SessionHolder;

/// Lifecycle phase of the cart mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CartPhase {
    /// No credential; the snapshot is empty.
    #[default]
    Unauthenticated,
    /// At least one operation is in flight.
    Loading,
    /// The snapshot reflects the last applied server response.
    Ready,
}

impl std::fmt::Display for CartPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Everything a cart view needs to render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Current phase.
    pub phase: CartPhase,
    /// Last applied cart.
    pub snapshot: CartSnapshot,
    /// Failure of the most recent operation, cleared by a successful refresh.
    pub last_error: Option<CartError>,
}

enum Mutation {
    Add { key: LineKey, quantity: u32 },
    Update { key: LineKey, quantity: u32 },
    Remove { key: LineKey },
}

impl Mutation {
    const fn key(&self) -> &LineKey {
        match self {
            Self::Add { key, .. } | Self::Update { key, .. } | Self::Remove { key } => key,
        }
    }
}

// =============================================================================
// CartSync
// =============================================================================

/// Mirror of the authenticated user's server-side cart.
///
/// Cheap to clone; clones share state.
pub struct CartSync<B = ApiClient> {
    inner: Arc<CartSyncInner<B>>,
}

struct CartSyncInner<B> {
    backend: B,
    session: SessionHolder,
    state: watch::Sender<CartState>,
    next_ticket: AtomicU64,
    applied_ticket: Mutex<u64>,
    in_flight: AtomicUsize,
}

impl<B> Clone for CartSync<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> std::fmt::Debug for CartSync<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CartSync")
            .field("phase", &state.phase)
            .field("lines", &state.snapshot.len())
            .finish_non_exhaustive()
    }
}

/// Marks an operation in flight; flips `Loading` back to `Ready` when the
/// last one finishes.
struct InFlight<'a, B> {
    inner: &'a CartSyncInner<B>,
}

impl<B> Drop for InFlight<'_, B> {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.state.send_if_modified(|state| {
                if state.phase == CartPhase::Loading {
                    state.phase = CartPhase::Ready;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl<B: CartBackend> CartSync<B> {
    /// Create a cart mirror bound to a session.
    ///
    /// Starts empty and `Unauthenticated`; call [`Self::refresh`] to load.
    #[must_use]
    pub fn new(backend: B, session: SessionHolder) -> Self {
        let (state, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(CartSyncInner {
                backend,
                session,
                state,
                next_ticket: AtomicU64::new(0),
                applied_ticket: Mutex::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Session this cart is bound to.
    #[must_use]
    pub fn session(&self) -> &SessionHolder {
        &self.inner.session
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.state.borrow().snapshot.clone()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> CartPhase {
        self.inner.state.borrow().phase
    }

    /// Failure of the most recent operation, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<CartError> {
        self.inner.state.borrow().last_error.clone()
    }

    /// Copy of the full state.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.inner.state.borrow().snapshot.item_count()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.inner.state.borrow().snapshot.subtotal()
    }

    /// Whether a line with this identity is in the cart.
    #[must_use]
    pub fn is_item_present(&self, key: &LineKey) -> bool {
        self.inner.state.borrow().snapshot.is_item_present(key)
    }

    /// Quantity of a line, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, key: &LineKey) -> u32 {
        self.inner.state.borrow().snapshot.quantity_of(key)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace the snapshot with the server's cart.
    ///
    /// Without a credential the mirror is cleared and an empty snapshot is
    /// returned. A failed fetch empties the snapshot and records the error.
    ///
    /// # Errors
    ///
    /// Returns the mapped error if the fetch fails. `Unauthenticated` also
    /// clears the session.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<CartSnapshot, CartError> {
        let Some(credential) = self.inner.session.credential() else {
            self.reset();
            return Ok(CartSnapshot::empty());
        };
        let _in_flight = self.begin();
        self.refresh_with(&credential).await
    }

    /// Add `item.quantity` units of a variant.
    ///
    /// An existing line is incremented; otherwise a new line is created.
    /// Name, price and image are taken from the refreshed server cart, never
    /// from `item`.
    ///
    /// # Errors
    ///
    /// `ValidationConflict` for a zero quantity (no request is sent),
    /// `Unauthenticated` without a credential, or the mapped API error.
    #[instrument(skip(self, item), fields(line = %item.key, quantity = item.quantity))]
    pub async fn add_item(&self, item: CartLine) -> Result<CartSnapshot, CartError> {
        if item.quantity == 0 {
            return Err(CartError::validation("quantity must be at least 1"));
        }

        let existing = self.quantity_of(&item.key);
        debug!(
            name = %item.name,
            unit_price = %item.unit_price,
            existing,
            "Adding to cart"
        );

        let mutation = if existing > 0 {
            let quantity = existing
                .checked_add(item.quantity)
                .ok_or_else(|| CartError::validation("quantity is too large"))?;
            Mutation::Update {
                key: item.key,
                quantity,
            }
        } else {
            Mutation::Add {
                key: item.key,
                quantity: item.quantity,
            }
        };

        self.mutate(mutation).await
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a credential, `ValidationConflict` for a
    /// quantity the API cannot represent, or the mapped API error.
    #[instrument(skip(self), fields(line = %key))]
    pub async fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<CartSnapshot, CartError> {
        if quantity <= 0 {
            return self.remove_item(key).await;
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| CartError::validation(format!("quantity {quantity} is too large")))?;

        self.mutate(Mutation::Update {
            key: key.clone(),
            quantity,
        })
        .await
    }

    /// Remove one line, scoped to its full identity.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a credential, or the mapped API error.
    #[instrument(skip(self), fields(line = %key))]
    pub async fn remove_item(&self, key: &LineKey) -> Result<CartSnapshot, CartError> {
        self.mutate(Mutation::Remove { key: key.clone() }).await
    }

    /// Remove every line currently in the snapshot, one request per line.
    ///
    /// Not atomic: a failed removal does not stop the others. The cart is
    /// refreshed afterwards either way.
    ///
    /// # Errors
    ///
    /// The first failure encountered. `Unauthenticated` aborts immediately
    /// and clears the session.
    #[instrument(skip(self))]
    pub async fn remove_all(&self) -> Result<CartSnapshot, CartError> {
        let credential = self.inner.session.credential().ok_or(CartError::Unauthenticated)?;
        let _in_flight = self.begin();

        let keys: Vec<LineKey> = self
            .snapshot()
            .lines()
            .iter()
            .map(|line| line.key.clone())
            .collect();

        let mut first_error = None;
        for key in &keys {
            if let Err(e) = self.inner.backend.remove_line(&credential, key).await {
                let err = CartError::from(e);
                if err == CartError::Unauthenticated {
                    self.record_failure(&err);
                    return Err(err);
                }
                warn!(line = %key, error = %err, "Failed to remove cart line");
                first_error.get_or_insert(err);
            }
        }

        let refreshed = self.refresh_with(&credential).await;
        match first_error {
            Some(err) => {
                self.record_failure(&err);
                Err(err)
            }
            None => {
                info!(removed = keys.len(), "Cart emptied");
                refreshed
            }
        }
    }

    /// Follow the session: refresh when a credential appears or changes,
    /// clear when it goes away.
    ///
    /// The task holds only a weak reference and exits once every clone of
    /// this cart is dropped.
    pub fn spawn_session_listener(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut rx = self.inner.session.subscribe();

        tokio::spawn(async move {
            let mut last = usable_credential(rx.borrow_and_update().as_ref());
            while rx.changed().await.is_ok() {
                let current = usable_credential(rx.borrow_and_update().as_ref());
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if current == last {
                    continue;
                }
                last.clone_from(&current);

                let cart = Self { inner };
                if current.is_some() {
                    debug!("Session changed, refreshing cart");
                    if let Err(e) = cart.refresh().await {
                        warn!(error = %e, "Cart refresh after session change failed");
                    }
                } else {
                    info!("Session ended, clearing cart");
                    cart.reset();
                }
            }
            debug!("Cart session listener stopped");
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn begin(&self) -> InFlight<'_, B> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_if_modified(|state| {
            if state.phase == CartPhase::Loading {
                false
            } else {
                state.phase = CartPhase::Loading;
                true
            }
        });
        InFlight { inner: &self.inner }
    }

    fn take_ticket(&self) -> u64 {
        self.inner.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn mutate(&self, mutation: Mutation) -> Result<CartSnapshot, CartError> {
        let credential = self.inner.session.credential().ok_or(CartError::Unauthenticated)?;
        let _in_flight = self.begin();

        let backend = &self.inner.backend;
        let sent = match &mutation {
            Mutation::Add { key, quantity } => backend.add_line(&credential, key, *quantity).await,
            Mutation::Update { key, quantity } => {
                backend.update_line(&credential, key, *quantity).await
            }
            Mutation::Remove { key } => backend.remove_line(&credential, key).await,
        };

        if let Err(e) = sent {
            let err = CartError::from(e);
            warn!(line = %mutation.key(), error = %err, "Cart update rejected");
            self.record_failure(&err);
            return Err(err);
        }

        self.refresh_with(&credential).await
    }

    async fn refresh_with(&self, credential: &Credential) -> Result<CartSnapshot, CartError> {
        let ticket = self.take_ticket();
        match self.inner.backend.fetch_cart(credential).await {
            Ok(snapshot) => {
                if self.apply(ticket, credential, Ok(snapshot)) {
                    debug!(ticket, "Applied cart refresh");
                }
                Ok(self.snapshot())
            }
            Err(e) => {
                let err = CartError::from(e);
                if err == CartError::Unauthenticated {
                    self.record_failure(&err);
                } else {
                    warn!(error = %err, "Cart refresh failed");
                    self.apply(ticket, credential, Err(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Apply a refresh outcome unless it is stale. Returns whether it was
    /// applied.
    fn apply(
        &self,
        ticket: u64,
        credential: &Credential,
        outcome: Result<CartSnapshot, CartError>,
    ) -> bool {
        let mut applied = self
            .inner
            .applied_ticket
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if ticket <= *applied {
            debug!(ticket, applied = *applied, "Discarding stale cart response");
            return false;
        }
        if self.inner.session.credential().as_ref() != Some(credential) {
            debug!(ticket, "Discarding cart response for a previous session");
            return false;
        }

        *applied = ticket;
        self.inner.state.send_modify(|state| match outcome {
            Ok(snapshot) => {
                state.snapshot = snapshot;
                state.last_error = None;
            }
            Err(err) => {
                state.snapshot = CartSnapshot::empty();
                state.last_error = Some(err);
            }
        });
        true
    }

    fn record_failure(&self, err: &CartError) {
        if *err == CartError::Unauthenticated {
            warn!("Credential rejected, ending session");
            // clear_session logs its own storage failures
            let _ = self.inner.session.clear_session();
            self.reset();
            self.inner
                .state
                .send_modify(|state| state.last_error = Some(CartError::Unauthenticated));
        } else {
            self.inner
                .state
                .send_modify(|state| state.last_error = Some(err.clone()));
        }
    }

    /// Clear the mirror and invalidate every refresh still in flight.
    fn reset(&self) {
        let ticket = self.take_ticket();
        let mut applied = self
            .inner
            .applied_ticket
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *applied = (*applied).max(ticket);

        self.inner.state.send_if_modified(|state| {
            let cleared = CartState::default();
            if *state == cleared {
                false
            } else {
                *state = cleared;
                true
            }
        });
    }
}

fn usable_credential(session: Option<&Session>) -> Option<Credential> {
    session
        .map(|s| s.credential.clone())
        .filter(|c| !c.is_blank())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::time::Duration;

    use async_trait::async_trait;
    use redseam_core::{ProductId, User, UserId};
    use tokio::sync::oneshot;

    use super::*;
    use crate::api::ApiError;

    /// Scripted failure, turned into an `ApiError` when triggered.
    #[derive(Clone, Copy)]
    enum Fail {
        Unauthorized,
        NotFound,
        Unavailable,
        Rejected,
    }

    impl Fail {
        fn into_error(self) -> ApiError {
            match self {
                Self::Unauthorized => ApiError::Unauthorized("Unauthenticated.".to_string()),
                Self::NotFound => ApiError::NotFound("No query results.".to_string()),
                Self::Unavailable => ApiError::Server {
                    status: 503,
                    message: "maintenance".to_string(),
                },
                Self::Rejected => ApiError::Rejected {
                    status: 422,
                    message: "Out of stock".to_string(),
                    field_errors: BTreeMap::new(),
                },
            }
        }
    }

    /// Holds the next fetch after it has read the cart.
    struct Gate {
        entered: oneshot::Sender<()>,
        release: oneshot::Receiver<()>,
    }

    /// In-memory cart with server-side pricing.
    #[derive(Default)]
    struct FakeBackend {
        lines: Mutex<Vec<CartLine>>,
        calls: Mutex<Vec<String>>,
        fail_fetch: Mutex<VecDeque<Fail>>,
        fail_mutation: Mutex<VecDeque<Fail>>,
        fail_remove_of: Mutex<Option<(LineKey, Fail)>>,
        gate: Mutex<Option<Gate>>,
    }

    fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        m.lock().unwrap()
    }

    impl FakeBackend {
        fn price_of(id: ProductId) -> Price {
            Price::from_cents(id.as_i64() * 1000 + 200)
        }

        fn seed(&self, key: &LineKey, quantity: u32) {
            lock(&self.lines).push(line(key, Self::price_of(key.product_id), quantity));
        }

        fn set_quantity(&self, key: &LineKey, quantity: u32) {
            for l in lock(&self.lines).iter_mut() {
                if l.key == *key {
                    l.quantity = quantity;
                }
            }
        }

        fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }

        fn record(&self, call: String) {
            lock(&self.calls).push(call);
        }

        fn next_mutation_failure(&self) -> Result<(), ApiError> {
            match lock(&self.fail_mutation).pop_front() {
                Some(fail) => Err(fail.into_error()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl CartBackend for Arc<FakeBackend> {
        async fn fetch_cart(&self, _: &Credential) -> Result<CartSnapshot, ApiError> {
            self.record("GET /cart".to_string());
            if let Some(fail) = lock(&self.fail_fetch).pop_front() {
                return Err(fail.into_error());
            }
            let snapshot = CartSnapshot::from_lines(lock(&self.lines).clone());
            let gate = lock(&self.gate).take();
            if let Some(gate) = gate {
                let _ = gate.entered.send(());
                let _ = gate.release.await;
            }
            Ok(snapshot)
        }

        async fn add_line(&self, _: &Credential, key: &LineKey, quantity: u32) -> Result<(), ApiError> {
            self.record(format!("POST {key} {quantity}"));
            self.next_mutation_failure()?;
            let mut lines = lock(&self.lines);
            match lines.iter_mut().find(|l| l.key == *key) {
                Some(existing) => existing.quantity += quantity,
                None => lines.push(line(key, FakeBackend::price_of(key.product_id), quantity)),
            }
            Ok(())
        }

        async fn update_line(&self, _: &Credential, key: &LineKey, quantity: u32) -> Result<(), ApiError> {
            self.record(format!("PATCH {key} {quantity}"));
            self.next_mutation_failure()?;
            let mut lines = lock(&self.lines);
            let existing = lines
                .iter_mut()
                .find(|l| l.key == *key)
                .ok_or_else(|| Fail::NotFound.into_error())?;
            existing.quantity = quantity;
            Ok(())
        }

        async fn remove_line(&self, _: &Credential, key: &LineKey) -> Result<(), ApiError> {
            self.record(format!("DELETE {key}"));
            if let Some((failing, fail)) = lock(&self.fail_remove_of).clone()
                && failing == *key
            {
                return Err(fail.into_error());
            }
            self.next_mutation_failure()?;
            let mut lines = lock(&self.lines);
            let before = lines.len();
            lines.retain(|l| l.key != *key);
            if lines.len() == before {
                return Err(Fail::NotFound.into_error());
            }
            Ok(())
        }
    }

    fn line(key: &LineKey, unit_price: Price, quantity: u32) -> CartLine {
        CartLine {
            key: key.clone(),
            name: format!("Product {}", key.product_id),
            unit_price,
            quantity,
            image: None,
        }
    }

    fn key(id: i64, color: &str, size: &str) -> LineKey {
        LineKey::new(ProductId::new(id), color, size)
    }

    fn logged_in() -> SessionHolder {
        let holder = SessionHolder::in_memory();
        holder
            .set_session(Session::new(
                Credential::new("token-1"),
                User {
                    id: UserId::new(1),
                    username: "ana".to_string(),
                    email: "ana@redseam.ge".to_string(),
                    avatar: None,
                },
            ))
            .unwrap();
        holder
    }

    fn setup() -> (CartSync<Arc<FakeBackend>>, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        (CartSync::new(backend.clone(), logged_in()), backend)
    }

    #[tokio::test]
    async fn test_refresh_without_credential_is_empty() {
        let backend = Arc::new(FakeBackend::default());
        backend.seed(&key(1, "red", "M"), 2);
        let cart = CartSync::new(backend.clone(), SessionHolder::in_memory());

        let snapshot = cart.refresh().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(cart.phase(), CartPhase::Unauthenticated);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_to_empty_cart() {
        let (cart, backend) = setup();
        let k = key(1, "red", "M");

        cart.add_item(line(&k, Price::from_cents(1000), 2)).await.unwrap();

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(cart.quantity_of(&k), 2);
        // Server price wins over what the caller passed in.
        assert_eq!(cart.subtotal(), Price::from_cents(2400));
        assert_eq!(cart.phase(), CartPhase::Ready);
        assert_eq!(backend.calls(), vec!["POST 1/red/M 2", "GET /cart"]);
    }

    #[tokio::test]
    async fn test_add_existing_line_increments() {
        let (cart, backend) = setup();
        let k = key(1, "red", "M");
        backend.seed(&k, 2);
        cart.refresh().await.unwrap();

        cart.add_item(line(&k, Price::from_cents(1200), 3)).await.unwrap();

        assert_eq!(cart.snapshot().len(), 1);
        assert_eq!(cart.quantity_of(&k), 5);
        assert_eq!(cart.item_count(), 5);
        assert!(backend.calls().contains(&"PATCH 1/red/M 5".to_string()));
    }

    #[tokio::test]
    async fn test_variants_are_separate_lines() {
        let (cart, _backend) = setup();
        cart.add_item(line(&key(1, "red", "M"), Price::ZERO, 1)).await.unwrap();
        cart.add_item(line(&key(1, "red", "L"), Price::ZERO, 1)).await.unwrap();
        cart.add_item(line(&key(1, "blue", "M"), Price::ZERO, 1)).await.unwrap();

        assert_eq!(cart.snapshot().len(), 3);
        assert_eq!(cart.item_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_is_rejected_locally() {
        let (cart, backend) = setup();
        let err = cart
            .add_item(line(&key(1, "red", "M"), Price::ZERO, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::ValidationConflict { .. }));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_to_zero_removes() {
        let (cart, backend) = setup();
        let k = key(1, "red", "M");
        backend.seed(&k, 1);
        cart.refresh().await.unwrap();

        cart.update_quantity(&k, 0).await.unwrap();
        assert!(cart.snapshot().is_empty());
        assert!(!cart.is_item_present(&k));

        backend.seed(&k, 4);
        cart.refresh().await.unwrap();
        cart.update_quantity(&k, -3).await.unwrap();
        assert!(cart.snapshot().is_empty());
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|c| c.starts_with("DELETE"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_update_quantity_patches_exact_value() {
        let (cart, backend) = setup();
        let k = key(2, "black", "S");
        backend.seed(&k, 1);
        cart.refresh().await.unwrap();

        cart.update_quantity(&k, 7).await.unwrap();
        assert_eq!(cart.quantity_of(&k), 7);

        let err = cart.update_quantity(&k, i64::from(u32::MAX) + 1).await.unwrap_err();
        assert!(matches!(err, CartError::ValidationConflict { .. }));
        assert_eq!(cart.quantity_of(&k), 7);
    }

    #[tokio::test]
    async fn test_remove_item_is_scoped_to_variant() {
        let (cart, backend) = setup();
        let red = key(1, "red", "M");
        let blue = key(1, "blue", "M");
        backend.seed(&red, 1);
        backend.seed(&blue, 2);
        cart.refresh().await.unwrap();

        cart.remove_item(&red).await.unwrap();
        assert!(!cart.is_item_present(&red));
        assert_eq!(cart.quantity_of(&blue), 2);
    }

    #[tokio::test]
    async fn test_mutations_require_credential() {
        let backend = Arc::new(FakeBackend::default());
        let cart = CartSync::new(backend.clone(), SessionHolder::in_memory());
        let k = key(1, "red", "M");

        assert_eq!(
            cart.add_item(line(&k, Price::ZERO, 1)).await.unwrap_err(),
            CartError::Unauthenticated
        );
        assert_eq!(cart.update_quantity(&k, 2).await.unwrap_err(), CartError::Unauthenticated);
        assert_eq!(cart.remove_item(&k).await.unwrap_err(), CartError::Unauthenticated);
        assert_eq!(cart.remove_all().await.unwrap_err(), CartError::Unauthenticated);
        assert!(backend.calls().is_empty());
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_mutation_keeps_snapshot() {
        let (cart, backend) = setup();
        let k = key(1, "red", "M");
        backend.seed(&k, 1);
        cart.refresh().await.unwrap();

        lock(&backend.fail_mutation).push_back(Fail::Rejected);
        let err = cart.update_quantity(&k, 9).await.unwrap_err();

        assert!(matches!(err, CartError::ValidationConflict { .. }));
        assert_eq!(cart.quantity_of(&k), 1);
        assert_eq!(cart.last_error(), Some(err));
        assert_eq!(cart.phase(), CartPhase::Ready);
    }

    #[tokio::test]
    async fn test_failed_refresh_empties_snapshot() {
        let (cart, backend) = setup();
        backend.seed(&key(1, "red", "M"), 1);
        cart.refresh().await.unwrap();

        lock(&backend.fail_fetch).push_back(Fail::Unavailable);
        let err = cart.refresh().await.unwrap_err();

        assert!(matches!(err, CartError::ServerUnavailable(_)));
        assert!(cart.snapshot().is_empty());
        assert_eq!(cart.last_error(), Some(err));
        assert!(cart.session().is_authenticated());

        cart.refresh().await.unwrap();
        assert_eq!(cart.snapshot().len(), 1);
        assert!(cart.last_error().is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session() {
        let (cart, backend) = setup();
        backend.seed(&key(1, "red", "M"), 1);
        cart.refresh().await.unwrap();

        lock(&backend.fail_fetch).push_back(Fail::Unauthorized);
        assert_eq!(cart.refresh().await.unwrap_err(), CartError::Unauthenticated);

        assert!(cart.session().current().is_none());
        assert_eq!(cart.phase(), CartPhase::Unauthenticated);
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_mutation_clears_session() {
        let (cart, backend) = setup();
        lock(&backend.fail_mutation).push_back(Fail::Unauthorized);

        let err = cart
            .add_item(line(&key(1, "red", "M"), Price::ZERO, 1))
            .await
            .unwrap_err();
        assert_eq!(err, CartError::Unauthenticated);
        assert!(!cart.session().is_authenticated());
        assert_eq!(cart.phase(), CartPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_remove_all_continues_past_failures() {
        let (cart, backend) = setup();
        let a = key(1, "red", "M");
        let b = key(2, "red", "M");
        let c = key(3, "red", "M");
        for k in [&a, &b, &c] {
            backend.seed(k, 1);
        }
        cart.refresh().await.unwrap();

        *lock(&backend.fail_remove_of) = Some((b.clone(), Fail::Unavailable));
        let err = cart.remove_all().await.unwrap_err();

        assert!(matches!(err, CartError::ServerUnavailable(_)));
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.is_item_present(&b));
        assert_eq!(cart.last_error(), Some(err));
    }

    #[tokio::test]
    async fn test_remove_all_aborts_on_unauthorized() {
        let (cart, backend) = setup();
        let a = key(1, "red", "M");
        let b = key(2, "red", "M");
        backend.seed(&a, 1);
        backend.seed(&b, 1);
        cart.refresh().await.unwrap();

        *lock(&backend.fail_remove_of) = Some((a, Fail::Unauthorized));
        assert_eq!(cart.remove_all().await.unwrap_err(), CartError::Unauthenticated);

        // Only the first DELETE was attempted.
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|c| c.starts_with("DELETE"))
                .count(),
            1
        );
        assert!(!cart.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_stale_refresh_is_discarded() {
        let (cart, backend) = setup();
        let k = key(1, "red", "M");
        backend.seed(&k, 1);

        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *lock(&backend.gate) = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });

        let slow = {
            let cart = cart.clone();
            tokio::spawn(async move { cart.refresh().await })
        };
        entered_rx.await.unwrap();
        assert_eq!(cart.phase(), CartPhase::Loading);

        // A newer refresh completes while the older one is still in flight.
        backend.set_quantity(&k, 3);
        cart.refresh().await.unwrap();
        assert_eq!(cart.quantity_of(&k), 3);

        release_tx.send(()).unwrap();
        slow.await.unwrap().unwrap();

        assert_eq!(cart.quantity_of(&k), 3);
        assert_eq!(cart.phase(), CartPhase::Ready);
    }

    #[tokio::test]
    async fn test_refresh_in_flight_during_logout_is_discarded() {
        let (cart, backend) = setup();
        backend.seed(&key(1, "red", "M"), 2);

        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *lock(&backend.gate) = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });

        let _listener = cart.spawn_session_listener();
        let slow = {
            let cart = cart.clone();
            tokio::spawn(async move { cart.refresh().await })
        };
        entered_rx.await.unwrap();

        cart.session().clear_session().unwrap();
        release_tx.send(()).unwrap();
        slow.await.unwrap().unwrap();

        let mut rx = cart.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| state.phase == CartPhase::Unauthenticated),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(state.snapshot.is_empty());
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_external_logout_clears_cart() {
        let (cart, backend) = setup();
        backend.seed(&key(1, "red", "M"), 2);
        let _listener = cart.spawn_session_listener();
        cart.refresh().await.unwrap();
        assert!(!cart.snapshot().is_empty());

        // Logout through another handle on the same session.
        let other_context = cart.session().clone();
        other_context.clear_session().unwrap();

        let mut rx = cart.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| state.phase == CartPhase::Unauthenticated),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_login_elsewhere_refreshes_cart() {
        let backend = Arc::new(FakeBackend::default());
        backend.seed(&key(4, "green", "XL"), 1);
        let session = SessionHolder::in_memory();
        let cart = CartSync::new(backend.clone(), session);
        let _listener = cart.spawn_session_listener();

        let donor = logged_in().current().unwrap();
        cart.session().set_session(donor).unwrap();

        let mut rx = cart.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| state.phase == CartPhase::Ready && state.snapshot.len() == 1),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
