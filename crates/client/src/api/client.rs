//! Redseam API client implementation.
//!
//! Uses `reqwest` for HTTP with JSON bodies. Caches products and listing
//! pages using `moka` (5-minute TTL).

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use redseam_core::{CartSnapshot, Credential, LineKey, ProductId};
use reqwest::{Method, RequestBuilder, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::ApiError;
use super::cache::{CacheKey, CacheValue};
use super::types::{
    AuthResponse, CartLineRequest, CartPayload, ErrorBody, LoginRequest, Product, ProductPage,
    ProductQuery, RegisterForm, VariantSelector,
};
use crate::config::ApiConfig;

/// Longest body excerpt written to logs or carried in errors.
const BODY_EXCERPT_CHARS: usize = 500;

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the Redseam REST API.
///
/// Cheap to clone; all clones share one connection pool and one cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                cache,
            }),
        })
    }

    /// API root this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Start a request with the shared headers.
    fn request(&self, method: Method, path: &str, credential: Option<&Credential>) -> RequestBuilder {
        let mut builder = self
            .inner
            .client
            .request(method, format!("{}{path}", self.inner.base_url))
            .header(header::ACCEPT, "application/json");

        if let Some(key) = &self.inner.api_key {
            builder = builder.header("X-API-Key", key.expose_secret());
        }
        if let Some(credential) = credential {
            builder = builder.header(header::AUTHORIZATION, credential.bearer());
        }
        builder
    }

    /// Send a request and return the body of a successful response.
    ///
    /// Non-success statuses are mapped onto [`ApiError`] variants.
    async fn send(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                body = %excerpt(&body),
                "Redseam API returned server error"
            );
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: excerpt(&body),
            });
        }

        debug!(status = %status, body = %excerpt(&body), "Redseam API rejected request");

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            _ => ApiError::Rejected {
                status: status.as_u16(),
                message,
                field_errors: parsed.errors,
            },
        })
    }

    /// Send a request and parse the JSON body.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(builder).await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse Redseam API response"
            );
            ApiError::Parse(e)
        })
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = CacheKey::Product(id);

        // Check cache
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .send_json(self.request(Method::GET, &format!("/products/{id}"), None))
            .await?;

        // Cache the result
        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Get a page of products.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a zero page or inverted price range, or an
    /// error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, ApiError> {
        let params = query.to_params().map_err(ApiError::InvalidRequest)?;
        let cache_key = CacheKey::Products(query.clone());

        if let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let page: ProductPage = self
            .send_json(self.request(Method::GET, "/products", None).query(&params))
            .await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(page.clone()))
            .await;

        Ok(page)
    }

    /// Invalidate a cached product.
    pub async fn invalidate_product(&self, id: ProductId) {
        self.inner.cache.invalidate(&CacheKey::Product(id)).await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    // =========================================================================
    // Cart Methods (not cached - mutable state)
    // =========================================================================

    /// Fetch the authoritative cart.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for a rejected token, or an error if the
    /// request or parsing fails.
    #[instrument(skip(self, credential))]
    pub async fn get_cart(&self, credential: &Credential) -> Result<CartSnapshot, ApiError> {
        let payload: CartPayload = self
            .send_json(self.request(Method::GET, "/cart", Some(credential)))
            .await?;
        Ok(CartSnapshot::from(payload))
    }

    /// Create a cart line for a variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the variant or quantity.
    #[instrument(skip(self, credential), fields(line = %key))]
    pub async fn add_cart_line(
        &self,
        credential: &Credential,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let path = format!("/cart/products/{}", key.product_id);
        self.send(
            self.request(Method::POST, &path, Some(credential))
                .json(&CartLineRequest::new(key, quantity)),
        )
        .await
        .map(drop)
    }

    /// Set the quantity of an existing cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the update.
    #[instrument(skip(self, credential), fields(line = %key))]
    pub async fn update_cart_line(
        &self,
        credential: &Credential,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let path = format!("/cart/products/{}", key.product_id);
        self.send(
            self.request(Method::PATCH, &path, Some(credential))
                .json(&CartLineRequest::new(key, quantity)),
        )
        .await
        .map(drop)
    }

    /// Remove one variant's line from the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not exist or the request fails.
    #[instrument(skip(self, credential), fields(line = %key))]
    pub async fn remove_cart_line(&self, credential: &Credential, key: &LineKey) -> Result<(), ApiError> {
        let path = format!("/cart/products/{}", key.product_id);
        self.send(
            self.request(Method::DELETE, &path, Some(credential))
                .json(&VariantSelector::from(key)),
        )
        .await
        .map(drop)
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` or `Rejected` (with field errors) when the API
    /// refuses the credentials, or an error if the request fails.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        self.send_json(self.request(Method::POST, "/login", None).json(&body))
            .await
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` with field errors for validation failures, or an
    /// error if the request fails.
    #[instrument(skip(self, form), fields(username = %form.username, email = %form.email))]
    pub async fn register(&self, form: RegisterForm) -> Result<AuthResponse, ApiError> {
        let mut multipart = reqwest::multipart::Form::new()
            .text("username", form.username)
            .text("email", form.email)
            .text("password", form.password)
            .text("password_confirmation", form.password_confirmation);

        if let Some(avatar) = form.avatar {
            let part = reqwest::multipart::Part::bytes(avatar.bytes)
                .file_name(avatar.file_name)
                .mime_str(&avatar.mime_type)?;
            multipart = multipart.part("avatar", part);
        }

        self.send_json(self.request(Method::POST, "/register", None).multipart(multipart))
            .await
    }
}
