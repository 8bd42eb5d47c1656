//! Core types for Redseam.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod credential;
pub mod email;
pub mod id;
pub mod price;
pub mod session;

pub use cart::{CartLine, CartSnapshot, LineKey};
pub use credential::Credential;
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use session::{Session, User};
