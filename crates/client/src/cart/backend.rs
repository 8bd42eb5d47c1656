//! Remote cart operations used by [`super::CartSync`].

use async_trait::async_trait;
use redseam_core::{CartSnapshot, Credential, LineKey};

use crate::api::{ApiClient, ApiError};

/// The four cart calls the sync module needs.
///
/// [`ApiClient`] is the production implementation; tests substitute an
/// in-memory cart.
#[async_trait]
pub trait CartBackend: Send + Sync + 'static {
    /// Fetch the authoritative cart.
    async fn fetch_cart(&self, credential: &Credential) -> Result<CartSnapshot, ApiError>;

    /// Create a line for a variant not yet in the cart.
    async fn add_line(
        &self,
        credential: &Credential,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), ApiError>;

    /// Set the quantity of an existing line.
    async fn update_line(
        &self,
        credential: &Credential,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), ApiError>;

    /// Delete one line.
    async fn remove_line(&self, credential: &Credential, key: &LineKey) -> Result<(), ApiError>;
}

#[async_trait]
impl CartBackend for ApiClient {
    async fn fetch_cart(&self, credential: &Credential) -> Result<CartSnapshot, ApiError> {
        self.get_cart(credential).await
    }

    async fn add_line(
        &self,
        credential: &Credential,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.add_cart_line(credential, key, quantity).await
    }

    async fn update_line(
        &self,
        credential: &Credential,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.update_cart_line(credential, key, quantity).await
    }

    async fn remove_line(&self, credential: &Credential, key: &LineKey) -> Result<(), ApiError> {
        self.remove_cart_line(credential, key).await
    }
}
