//! Redseam storefront client library.
//!
//! Mirrors the server-side cart of the Redseam e-commerce API and keeps it
//! consistent with the authenticated session.
//!
//! # Architecture
//!
//! - [`api`] - `reqwest` client for catalog, cart and auth endpoints
//! - [`session`] - Session/identity holder with change notification
//! - [`cart`] - Cart synchronization: server is the source of truth, every
//!   mutation is followed by a refresh
//! - [`checkout`] - Order details validation and mock payment
//! - [`config`] - Environment-based configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod session;

pub use api::{ApiClient, ApiError};
pub use cart::{CartError, CartPhase, CartState, CartSync};
pub use checkout::{CheckoutDetails, CheckoutError, OrderConfirmation};
pub use config::{ApiConfig, ClientConfig, ConfigError};
pub use session::{FileSessionStore, MemorySessionStore, SessionHolder, SessionStore, SessionStoreError, WatchError};
