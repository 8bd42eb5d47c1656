//! Redseam REST API client.
//!
//! # Architecture
//!
//! - Plain JSON over HTTPS with `reqwest`
//! - The API is the source of truth - NO local copy of the cart beyond the
//!   snapshot the cart module keeps
//! - In-memory caching via `moka` for catalog responses (5 minute TTL); cart
//!   and auth calls are never cached
//!
//! # Endpoints
//!
//! ## Catalog
//! - `GET /products` - paginated listing with price filter and sort
//! - `GET /products/{id}` - product detail
//!
//! ## Cart (bearer token required)
//! - `GET /cart`, `POST|PATCH|DELETE /cart/products/{id}`
//!
//! ## Auth
//! - `POST /login`, `POST /register`
//!
//! # Example
//!
//! ```rust,ignore
//! use redseam_client::api::{ApiClient, ProductQuery};
//!
//! let client = ApiClient::new(&config.api)?;
//!
//! let page = client.list_products(&ProductQuery::default()).await?;
//! let auth = client.login("shopper@redseam.ge", "hunter22").await?;
//! ```

mod cache;
mod client;
pub mod types;

pub use client::ApiClient;
pub use types::*;

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that can occur when talking to the Redseam API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connect, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing, expired or rejected bearer token (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by validation (HTTP 400/409/422 and other 4xx).
    #[error("Rejected ({status}): {}", format_rejection(.message, .field_errors))]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Top-level message.
        message: String,
        /// Per-field validation messages.
        field_errors: BTreeMap<String, Vec<String>>,
    },

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Server-side failure (HTTP 5xx).
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The request was refused locally before being sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn format_rejection(message: &str, field_errors: &BTreeMap<String, Vec<String>>) -> String {
    let fields = format_field_errors(field_errors);
    match (message.is_empty(), fields.is_empty()) {
        (true, true) => "(no error details provided)".to_string(),
        (false, true) => message.to_string(),
        (true, false) => fields,
        (false, false) => format!("{message} ({fields})"),
    }
}

/// Flatten `{ field: [msg, ...] }` into `field: msg; field: msg`.
pub fn format_field_errors(field_errors: &BTreeMap<String, Vec<String>>) -> String {
    field_errors
        .iter()
        .flat_map(|(field, messages)| {
            messages.iter().map(move |m| {
                if m.is_empty() {
                    format!("{field}: (no details)")
                } else {
                    format!("{field}: {m}")
                }
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}
