//! Terminal output.
//!
//! Logs go to stderr through `tracing`; results go to stdout from here.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Display;

use redseam_client::OrderConfirmation;
use redseam_client::api::{Product, ProductPage};
use redseam_core::{CartSnapshot, Session};
use serde::Serialize;

/// Print a line.
pub fn line(text: impl Display) {
    println!("{text}");
}

/// Print a value as pretty JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report a failed command.
pub fn failure(err: &dyn Display) {
    eprintln!("error: {err}");
}

pub fn session(session: &Session) {
    println!("{} <{}> (user {})", session.display_name(), session.user.email, session.user_id());
    if let Some(avatar) = session.avatar() {
        println!("avatar: {avatar}");
    }
}

pub fn cart(snapshot: &CartSnapshot) {
    if snapshot.is_empty() {
        println!("Cart is empty.");
        return;
    }

    for line in snapshot.lines() {
        println!(
            "{:>3} x {:<32} {:<16} {:>10} {:>10}",
            line.quantity,
            line.name,
            line.key.to_string(),
            line.unit_price.to_string(),
            line.line_total().to_string(),
        );
    }
    println!(
        "{} item(s), subtotal {}",
        snapshot.item_count(),
        snapshot.subtotal()
    );
}

pub fn product_page(page: &ProductPage) {
    for product in &page.data {
        println!("{:>6}  {:<40} {:>10}", product.id, product.name, product.price.to_string());
    }
    println!(
        "page {} of {} ({} products)",
        page.meta.current_page, page.meta.last_page, page.meta.total
    );
}

pub fn product(product: &Product) {
    println!("{} (#{})", product.name, product.id);
    if let Some(brand) = &product.brand {
        println!("brand: {}", brand.name);
    }
    println!("price: {}", product.price);
    if !product.available_colors.is_empty() {
        println!("colors: {}", product.available_colors.join(", "));
    }
    if !product.available_sizes.is_empty() {
        println!("sizes: {}", product.available_sizes.join(", "));
    }
    if let Some(description) = &product.description {
        println!();
        println!("{description}");
    }
}

pub fn order(order: &OrderConfirmation) {
    println!("Order {} placed at {}", order.order_id, order.placed_at.to_rfc3339());
    for line in &order.lines {
        println!("{:>3} x {} {}", line.quantity, line.name, line.line_total());
    }
    println!("subtotal {}", order.subtotal);
    println!("delivery {}", order.delivery_fee);
    println!("total    {}", order.total);
}
