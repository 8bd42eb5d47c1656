//! Cart error taxonomy.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::api::{ApiError, format_field_errors};

/// Errors returned by cart operations.
///
/// Every [`ApiError`] is folded into one of these; callers never see
/// transport details beyond the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// No usable credential, or the API rejected it.
    #[error("not logged in")]
    Unauthenticated,

    /// The product or cart line does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was refused: bad quantity, unknown variant, out of stock.
    #[error("{}", describe_conflict(.message, .field_errors))]
    ValidationConflict {
        /// Top-level message.
        message: String,
        /// Per-field messages, keyed by field name.
        field_errors: BTreeMap<String, Vec<String>>,
    },

    /// Network failure, timeout, rate limit or 5xx.
    #[error("server unavailable: {0}")]
    ServerUnavailable(String),

    /// Anything else, including responses that could not be parsed.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl CartError {
    /// Validation failure with only a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationConflict {
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }
}

fn describe_conflict(message: &str, field_errors: &BTreeMap<String, Vec<String>>) -> String {
    if field_errors.is_empty() {
        message.to_string()
    } else {
        format!("{message} ({})", format_field_errors(field_errors))
    }
}

impl From<ApiError> for CartError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(_) => Self::Unauthenticated,
            ApiError::NotFound(message) => Self::NotFound(message),
            ApiError::Rejected {
                message,
                field_errors,
                ..
            } => Self::ValidationConflict {
                message,
                field_errors,
            },
            ApiError::InvalidRequest(message) => Self::validation(message),
            ApiError::Http(e) if e.is_decode() => Self::Unknown(e.to_string()),
            ApiError::Http(e) => Self::ServerUnavailable(e.to_string()),
            ApiError::RateLimited(secs) => {
                Self::ServerUnavailable(format!("rate limited, retry after {secs} seconds"))
            }
            ApiError::Server { status, message } => {
                Self::ServerUnavailable(format!("HTTP {status}: {message}"))
            }
            ApiError::Parse(e) => Self::Unknown(e.to_string()),
        }
    }
}
