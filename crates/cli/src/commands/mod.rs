//! Command implementations.
//!
//! Every command gets a [`Context`] wired from [`ClientConfig`]: one API
//! client, one session holder over the file store, and one cart bound to
//! both.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;

use std::sync::Arc;

use redseam_client::{
    ApiClient, ApiError, CartError, CartSync, CheckoutError, ClientConfig, ConfigError,
    FileSessionStore, SessionHolder, SessionStoreError,
};
use thiserror::Error;

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Cart(#[from] CartError),

    #[error("{0}")]
    Checkout(#[from] CheckoutError),

    #[error("{0}")]
    Session(#[from] SessionStoreError),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Not logged in. Run `redseam login` first.")]
    NotLoggedIn,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Shared handles for one command invocation.
pub struct Context {
    pub config: ClientConfig,
    pub api: ApiClient,
    pub session: SessionHolder,
    pub cart: CartSync,
    pub json: bool,
}

impl Context {
    pub fn new(config: ClientConfig, json: bool) -> Result<Self, CliError> {
        let api = ApiClient::new(&config.api)?;
        let session = SessionHolder::new(Arc::new(FileSessionStore::new(&config.session_dir)));
        let cart = CartSync::new(api.clone(), session.clone());

        tracing::debug!(
            base_url = api.base_url(),
            session_dir = %config.session_dir.display(),
            authenticated = session.is_authenticated(),
            "Client ready"
        );

        Ok(Self {
            config,
            api,
            session,
            cart,
            json,
        })
    }

    /// Fail early for commands that need a session.
    pub fn require_login(&self) -> Result<(), CliError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CliError::NotLoggedIn)
        }
    }
}
