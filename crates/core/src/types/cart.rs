//! Cart snapshot model.
//!
//! A [`CartSnapshot`] is the client's point-in-time mirror of the server
//! cart. Lines are unique by [`LineKey`]; totals are always recomputed from
//! the lines and never stored.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// Identity of a cart line: product plus the chosen color and size.
///
/// Two lines for the same product with a different color or size are
/// different lines. Blank color/size values are normalized to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    /// Product ID.
    pub product_id: ProductId,
    /// Selected color.
    pub color: Option<String>,
    /// Selected size.
    pub size: Option<String>,
}

impl LineKey {
    /// Key for a product variant with a color and size.
    #[must_use]
    pub fn new(product_id: ProductId, color: impl Into<String>, size: impl Into<String>) -> Self {
        Self::with_options(product_id, Some(color.into()), Some(size.into()))
    }

    /// Key where color and/or size may be absent.
    #[must_use]
    pub fn with_options(product_id: ProductId, color: Option<String>, size: Option<String>) -> Self {
        Self {
            product_id,
            color: normalize(color),
            size: normalize(size),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.product_id,
            self.color.as_deref().unwrap_or("-"),
            self.size.as_deref().unwrap_or("-")
        )
    }
}

/// One product variant in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Identity key.
    #[serde(flatten)]
    pub key: LineKey,
    /// Product name for display.
    pub name: String,
    /// Unit price as quoted by the server.
    pub unit_price: Price,
    /// Quantity, always at least 1.
    pub quantity: u32,
    /// Image URL for display. Not authoritative.
    pub image: Option<String>,
}

impl CartLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Client-side mirror of the cart at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// The empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a snapshot from lines in server order.
    ///
    /// Lines sharing a key are merged into the first occurrence with their
    /// quantities summed; lines with quantity 0 are dropped.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut merged: Vec<CartLine> = Vec::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            if let Some(existing) = merged.iter_mut().find(|l| l.key == line.key) {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            } else {
                merged.push(line);
            }
        }
        Self { lines: merged }
    }

    /// Lines in server order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Look up a line by key.
    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.key == key)
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Whether a line with this key exists.
    #[must_use]
    pub fn is_item_present(&self, key: &LineKey) -> bool {
        self.line(key).is_some()
    }

    /// Quantity for this key, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, key: &LineKey) -> u32 {
        self.line(key).map_or(0, |l| l.quantity)
    }
}
