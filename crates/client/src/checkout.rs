//! Checkout.
//!
//! There is no order endpoint: checkout validates the shipping details,
//! prices the current cart with the flat delivery fee, hands back a mock
//! confirmation and empties the cart. No payment is taken.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use redseam_core::{CartLine, Email, Price};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::format_field_errors;
use crate::cart::{CartBackend, CartError, CartSync};

/// Flat delivery fee in cents.
pub const DELIVERY_FEE_CENTS: i64 = 500;

/// Delivery fee charged on every order.
#[must_use]
pub fn delivery_fee() -> Price {
    Price::from_cents(DELIVERY_FEE_CENTS)
}

/// Errors that can occur at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Shipping details failed validation.
    #[error("invalid order details: {}", format_field_errors(.0))]
    Invalid(BTreeMap<String, Vec<String>>),

    /// Nothing to order.
    #[error("cart is empty")]
    EmptyCart,

    /// The cart could not be read or emptied.
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Shipping details entered at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutDetails {
    /// First name.
    pub name: String,
    /// Last name.
    pub surname: String,
    /// Contact email.
    pub email: String,
    /// Street address.
    pub address: String,
    /// Postal code.
    pub zip: String,
}

impl CheckoutDetails {
    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns per-field messages if any field is blank or the email is
    /// malformed.
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                errors
                    .entry(field.to_string())
                    .or_default()
                    .push(format!("{field} is required"));
                false
            } else {
                true
            }
        };

        require("name", &self.name);
        require("surname", &self.surname);
        let has_email = require("email", &self.email);
        require("address", &self.address);
        require("zip", &self.zip);

        if has_email && let Err(e) = Email::parse(&self.email) {
            errors.entry("email".to_string()).or_default().push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CheckoutError::Invalid(errors))
        }
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderConfirmation {
    /// Locally generated order reference.
    pub order_id: Uuid,
    /// When the order was placed.
    pub placed_at: DateTime<Utc>,
    /// Shipping details as entered.
    pub details: CheckoutDetails,
    /// Lines that were ordered.
    pub lines: Vec<CartLine>,
    /// Sum of line totals.
    pub subtotal: Price,
    /// Flat delivery fee.
    pub delivery_fee: Price,
    /// `subtotal + delivery_fee`.
    pub total: Price,
}

impl<B: CartBackend> CartSync<B> {
    /// Place a mock order for the current cart and empty it.
    ///
    /// The order is priced from the snapshot as it stands; nothing is sent
    /// until the details validate and the cart is known to be non-empty. A
    /// failure to empty the cart afterwards is logged and recorded on the
    /// cart but does not undo the order.
    ///
    /// # Errors
    ///
    /// `Invalid` for bad details, `EmptyCart` when there is nothing to
    /// order, `Cart(Unauthenticated)` without a credential.
    #[instrument(skip(self, details))]
    pub async fn checkout(&self, details: CheckoutDetails) -> Result<OrderConfirmation, CheckoutError> {
        details.validate()?;
        if !self.session().is_authenticated() {
            return Err(CartError::Unauthenticated.into());
        }

        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let subtotal = snapshot.subtotal();
        let fee = delivery_fee();
        let confirmation = OrderConfirmation {
            order_id: Uuid::new_v4(),
            placed_at: Utc::now(),
            details,
            lines: snapshot.lines().to_vec(),
            subtotal,
            delivery_fee: fee,
            total: subtotal + fee,
        };

        info!(
            order_id = %confirmation.order_id,
            items = snapshot.item_count(),
            total = %confirmation.total,
            "Order placed"
        );

        if let Err(e) = self.remove_all().await {
            warn!(order_id = %confirmation.order_id, error = %e, "Failed to empty cart after checkout");
        }

        Ok(confirmation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use redseam_core::{CartSnapshot, Credential, LineKey, ProductId, Session, User, UserId};

    use super::*;
    use crate::api::ApiError;
    use crate::session::SessionHolder;

    #[derive(Default)]
    struct Cart {
        lines: Mutex<Vec<CartLine>>,
        requests: Mutex<u32>,
    }

    #[async_trait]
    impl CartBackend for Arc<Cart> {
        async fn fetch_cart(&self, _: &Credential) -> Result<CartSnapshot, ApiError> {
            *self.requests.lock().unwrap() += 1;
            Ok(CartSnapshot::from_lines(self.lines.lock().unwrap().clone()))
        }
        async fn add_line(&self, _: &Credential, _: &LineKey, _: u32) -> Result<(), ApiError> {
            *self.requests.lock().unwrap() += 1;
            Ok(())
        }
        async fn update_line(&self, _: &Credential, _: &LineKey, _: u32) -> Result<(), ApiError> {
            *self.requests.lock().unwrap() += 1;
            Ok(())
        }
        async fn remove_line(&self, _: &Credential, key: &LineKey) -> Result<(), ApiError> {
            *self.requests.lock().unwrap() += 1;
            self.lines.lock().unwrap().retain(|l| l.key != *key);
            Ok(())
        }
    }

    fn details() -> CheckoutDetails {
        CheckoutDetails {
            name: "Nino".to_string(),
            surname: "Beridze".to_string(),
            email: "nino@redseam.ge".to_string(),
            address: "12 Rustaveli Ave".to_string(),
            zip: "0108".to_string(),
        }
    }

    fn session() -> SessionHolder {
        let holder = SessionHolder::in_memory();
        holder
            .set_session(Session::new(
                Credential::new("t"),
                User {
                    id: UserId::new(3),
                    username: "nino".to_string(),
                    email: "nino@redseam.ge".to_string(),
                    avatar: None,
                },
            ))
            .unwrap();
        holder
    }

    #[test]
    fn test_validate_collects_every_field() {
        let err = CheckoutDetails {
            email: "not-an-email".to_string(),
            ..CheckoutDetails::default()
        }
        .validate()
        .unwrap_err();

        let CheckoutError::Invalid(fields) = err else {
            panic!("expected Invalid");
        };
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["address", "email", "name", "surname", "zip"]);
        assert!(details().validate().is_ok());
    }

    #[test]
    fn test_blank_email_reports_required_only() {
        let err = CheckoutDetails {
            email: "   ".to_string(),
            ..details()
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::Invalid(BTreeMap::from([(
                "email".to_string(),
                vec!["email is required".to_string()]
            )]))
        );
    }

    #[tokio::test]
    async fn test_checkout_prices_and_empties_cart() {
        let backend = Arc::new(Cart::default());
        backend.lines.lock().unwrap().push(CartLine {
            key: LineKey::new(ProductId::new(1), "red", "M"),
            name: "Jacket".to_string(),
            unit_price: Price::from_cents(2550),
            quantity: 2,
            image: None,
        });
        let cart = CartSync::new(backend.clone(), session());
        cart.refresh().await.unwrap();

        let order = cart.checkout(details()).await.unwrap();

        assert_eq!(order.subtotal, Price::from_cents(5100));
        assert_eq!(order.delivery_fee, Price::from_cents(500));
        assert_eq!(order.total, Price::from_cents(5600));
        assert_eq!(order.lines.len(), 1);
        assert!(cart.snapshot().is_empty());
        assert!(backend.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_fails_without_network() {
        let backend = Arc::new(Cart::default());
        let cart = CartSync::new(backend.clone(), session());

        assert_eq!(cart.checkout(details()).await.unwrap_err(), CheckoutError::EmptyCart);
        assert_eq!(*backend.requests.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_checkout_requires_login() {
        let cart = CartSync::new(Arc::new(Cart::default()), SessionHolder::in_memory());
        assert_eq!(
            cart.checkout(details()).await.unwrap_err(),
            CheckoutError::Cart(CartError::Unauthenticated)
        );
    }
}
