//! Wire types for the Redseam REST API.
//!
//! Request bodies and response shapes as the API speaks them. Cart responses
//! are converted into [`redseam_core::CartSnapshot`] at the boundary so the
//! rest of the client never sees wire types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use redseam_core::{CartLine, CartSnapshot, LineKey, Price, ProductId, User};
use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog Types
// =============================================================================

/// Product brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    /// Brand ID.
    pub id: i64,
    /// Brand name.
    pub name: String,
    /// Logo URL.
    #[serde(default)]
    pub image: Option<String>,
}

/// A product as returned by `/products` and `/products/{id}`.
///
/// The listing endpoint omits `brand` and sometimes the variant lists, so
/// everything beyond id, name and price is defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Product name.
    pub name: String,
    /// Plain text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Release year as sent by the API.
    #[serde(default)]
    pub release_year: Option<String>,
    /// Cover image URL.
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Gallery image URLs, index-aligned with `available_colors`.
    #[serde(default)]
    pub images: Vec<String>,
    /// Unit price.
    pub price: Price,
    /// Colors the product can be ordered in.
    #[serde(default)]
    pub available_colors: Vec<String>,
    /// Sizes the product can be ordered in.
    #[serde(default)]
    pub available_sizes: Vec<String>,
    /// Brand, detail endpoint only.
    #[serde(default)]
    pub brand: Option<Brand>,
}

impl Product {
    /// Image for a color, falling back to the cover image.
    #[must_use]
    pub fn image_for_color(&self, color: &str) -> Option<&str> {
        self.available_colors
            .iter()
            .position(|c| c == color)
            .and_then(|i| self.images.get(i))
            .or(self.cover_image.as_ref())
            .map(String::as_str)
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMeta {
    /// Current page (1-indexed).
    pub current_page: u32,
    /// Last available page.
    pub last_page: u32,
    /// Results per page.
    pub per_page: u32,
    /// Total number of matching products.
    pub total: u64,
}

impl Default for PageMeta {
    fn default() -> Self {
        Self {
            current_page: 1,
            last_page: 1,
            per_page: 10,
            total: 0,
        }
    }
}

/// One page of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    /// Products on this page.
    #[serde(default)]
    pub data: Vec<Product>,
    /// Pagination metadata.
    #[serde(default)]
    pub meta: PageMeta,
}

/// Product ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProductSort {
    /// Newest first.
    #[default]
    Newest,
    /// Price: low to high.
    PriceAscending,
    /// Price: high to low.
    PriceDescending,
}

impl ProductSort {
    /// Value of the `sort` query parameter.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::Newest => "created_at",
            Self::PriceAscending => "price",
            Self::PriceDescending => "-price",
        }
    }
}

impl fmt::Display for ProductSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newest => write!(f, "newest"),
            Self::PriceAscending => write!(f, "price-asc"),
            Self::PriceDescending => write!(f, "price-desc"),
        }
    }
}

impl FromStr for ProductSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" | "created_at" => Ok(Self::Newest),
            "price-asc" | "price" => Ok(Self::PriceAscending),
            "price-desc" | "-price" => Ok(Self::PriceDescending),
            _ => Err(format!("invalid sort: {s} (expected newest, price-asc or price-desc)")),
        }
    }
}

/// Product listing query: page, price range and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    /// Page number (1-indexed).
    pub page: u32,
    /// Inclusive lower price bound.
    pub price_from: Option<u32>,
    /// Inclusive upper price bound.
    pub price_to: Option<u32>,
    /// Ordering.
    pub sort: ProductSort,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: 1,
            price_from: None,
            price_to: None,
            sort: ProductSort::default(),
        }
    }
}

impl ProductQuery {
    /// Query parameters in the order the API documents them.
    ///
    /// # Errors
    ///
    /// Returns a message if the page is 0 or the price range is inverted.
    pub fn to_params(&self) -> Result<Vec<(&'static str, String)>, String> {
        if self.page == 0 {
            return Err("page must be at least 1".to_string());
        }
        if let (Some(from), Some(to)) = (self.price_from, self.price_to)
            && from > to
        {
            return Err(format!("price_from ({from}) is greater than price_to ({to})"));
        }

        let mut params = vec![("page", self.page.to_string())];
        if let Some(from) = self.price_from {
            params.push(("filter[price_from]", from.to_string()));
        }
        if let Some(to) = self.price_to {
            params.push(("filter[price_to]", to.to_string()));
        }
        params.push(("sort", self.sort.as_query().to_string()));
        Ok(params)
    }
}

// =============================================================================
// Cart Types
// =============================================================================

/// Cart line as the API sends it.
///
/// `total_price` is also sent but ignored; line totals are recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemPayload {
    /// Product ID.
    pub id: ProductId,
    /// Product name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Quantity.
    pub quantity: u32,
    /// Selected color.
    #[serde(default)]
    pub color: Option<String>,
    /// Selected size.
    #[serde(default)]
    pub size: Option<String>,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
}

impl From<CartItemPayload> for CartLine {
    fn from(item: CartItemPayload) -> Self {
        Self {
            key: LineKey::with_options(item.id, item.color, item.size),
            name: item.name,
            unit_price: item.price,
            quantity: item.quantity,
            image: item.image,
        }
    }
}

/// `GET /cart` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartPayload {
    /// Cart lines in server order.
    pub products: Vec<CartItemPayload>,
}

impl From<CartPayload> for CartSnapshot {
    fn from(payload: CartPayload) -> Self {
        Self::from_lines(payload.products.into_iter().map(CartLine::from))
    }
}

/// Body of `POST`/`PATCH /cart/products/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineRequest {
    /// Target quantity.
    pub quantity: u32,
    /// Selected color.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<String>,
    /// Selected size.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<String>,
}

impl CartLineRequest {
    /// Request for a key at a quantity.
    #[must_use]
    pub fn new(key: &LineKey, quantity: u32) -> Self {
        Self {
            quantity,
            color: key.color.clone(),
            size: key.size.clone(),
        }
    }
}

/// Body of `DELETE /cart/products/{id}`: scopes removal to one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSelector {
    /// Selected color.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<String>,
    /// Selected size.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<String>,
}

impl From<&LineKey> for VariantSelector {
    fn from(key: &LineKey) -> Self {
        Self {
            color: key.color.clone(),
            size: key.size.clone(),
        }
    }
}

// =============================================================================
// Auth Types
// =============================================================================

/// Body of `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Email address.
    pub email: String,
    /// Password.
    pub password: String,
}

/// Avatar upload for registration.
#[derive(Debug, Clone)]
pub struct Avatar {
    /// File name sent with the part.
    pub file_name: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

/// Fields of the `POST /register` multipart form.
#[derive(Debug, Clone)]
pub struct RegisterForm {
    /// Display name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password.
    pub password: String,
    /// Must equal `password`; the API checks it too.
    pub password_confirmation: String,
    /// Optional avatar image.
    pub avatar: Option<Avatar>,
}

/// Successful `/login` or `/register` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Profile of the authenticated user.
    pub user: User,
    /// Bearer token.
    pub token: String,
}

/// Error body: `{ message }` and/or `{ errors: { field: [msg] } }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}
