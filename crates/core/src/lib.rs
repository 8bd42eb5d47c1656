//! Redseam Core - Shared types library.
//!
//! This crate provides common types used across all Redseam components:
//! - `client` - API client, session holder and cart synchronization
//! - `cli` - Command-line front end for the client
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no storage. This keeps it lightweight and allows it to be used
//! anywhere, including in tests that never touch the network.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, emails, credentials, sessions and the
//!   cart snapshot model

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
