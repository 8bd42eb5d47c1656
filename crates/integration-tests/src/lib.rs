//! Integration tests for the Redseam client.
//!
//! [`FakeRedseam`] is an in-process stand-in for the Redseam REST API,
//! served by axum on an ephemeral port under `/api`. Tests drive the real
//! `reqwest`-based [`ApiClient`] against it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p redseam-integration-tests
//! ```
//!
//! # Fake behavior
//!
//! - 25 seeded products (`1..=25`), colors `Red`/`Blue`, sizes `S`/`M`/`L`,
//!   10 per page
//! - Users registered through `/register` or [`FakeRedseam::add_user`]
//! - One cart per bearer token; unknown or revoked tokens get 401
//! - Every request is recorded; failures and stalls can be scripted per route

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use redseam_client::{ApiClient, ApiConfig, SessionHolder};
use redseam_core::{Credential, Session, User, UserId};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// Products per listing page.
pub const PER_PAGE: usize = 10;

/// Number of seeded products.
pub const PRODUCT_COUNT: i64 = 25;

// =============================================================================
// Fake state
// =============================================================================

/// A catalog entry.
#[derive(Debug, Clone)]
pub struct FakeProduct {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub created_at: i64,
}

impl FakeProduct {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": format!("Description of {}", self.name),
            "release_year": "2024",
            "cover_image": format!("https://cdn.fake/products/{}/cover.png", self.id),
            "images": self
                .colors
                .iter()
                .map(|c| format!("https://cdn.fake/products/{}/{}.png", self.id, c.to_lowercase()))
                .collect::<Vec<_>>(),
            "price": self.price,
            "available_colors": self.colors,
            "available_sizes": self.sizes,
            "brand": {"id": 1, "name": "Redseam", "image": null},
        })
    }
}

/// A line in a fake cart.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeLine {
    pub product_id: i64,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
}

/// A request as the fake saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeUser {
    id: i64,
    username: String,
    email: String,
    password: String,
    avatar: Option<String>,
}

impl FakeUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "avatar": self.avatar,
        })
    }
}

struct Scripted {
    method: String,
    path: String,
    action: ScriptedAction,
}

enum ScriptedAction {
    Respond { status: StatusCode, body: Value },
    Stall(Duration),
}

#[derive(Default)]
struct Store {
    products: BTreeMap<i64, FakeProduct>,
    users: Vec<FakeUser>,
    tokens: HashMap<String, i64>,
    carts: HashMap<i64, Vec<FakeLine>>,
    requests: Vec<RecordedRequest>,
    scripted: VecDeque<Scripted>,
    next_token: u64,
}

impl Store {
    fn seeded() -> Self {
        let mut store = Self::default();
        for id in 1..=PRODUCT_COUNT {
            #[allow(clippy::cast_precision_loss)]
            let price = (id * 15) as f64 + 0.5;
            store.products.insert(
                id,
                FakeProduct {
                    id,
                    name: format!("Product {id}"),
                    price,
                    colors: vec!["Red".to_string(), "Blue".to_string()],
                    sizes: vec!["S".to_string(), "M".to_string(), "L".to_string()],
                    // Higher IDs are newer
                    created_at: id,
                },
            );
        }
        store
    }

    fn issue_token(&mut self, user_id: i64) -> String {
        self.next_token += 1;
        let token = format!("token-{user_id}-{}", self.next_token);
        self.tokens.insert(token.clone(), user_id);
        token
    }

    fn cart_json(&self, user_id: i64) -> Value {
        let lines = self.carts.get(&user_id).cloned().unwrap_or_default();
        let products: Vec<Value> = lines
            .iter()
            .filter_map(|line| {
                let product = self.products.get(&line.product_id)?;
                Some(json!({
                    "id": product.id,
                    "name": product.name,
                    "price": product.price,
                    "quantity": line.quantity,
                    "color": line.color,
                    "size": line.size,
                    "image": format!("https://cdn.fake/products/{}/cover.png", product.id),
                    "total_price": product.price * f64::from(line.quantity),
                }))
            })
            .collect();
        json!({ "products": products })
    }
}

/// Shared state behind the fake's routes.
#[derive(Clone)]
pub struct FakeState {
    store: Arc<Mutex<Store>>,
}

impl FakeState {
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Server
// =============================================================================

/// Running fake Redseam API. The server stops when this is dropped.
pub struct FakeRedseam {
    base_url: String,
    state: FakeState,
    handle: JoinHandle<()>,
}

impl Drop for FakeRedseam {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeRedseam {
    /// Start the fake on an ephemeral port with the seeded catalog.
    pub async fn spawn() -> Self {
        let state = FakeState {
            store: Arc::new(Mutex::new(Store::seeded())),
        };
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has no local address");
        let base_url = format!("http://{addr}/api");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake server failed");
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    /// API root, including the `/api` prefix.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client settings pointing at the fake.
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::new(Url::parse(&self.base_url).expect("fake base URL is valid"))
    }

    /// Real API client pointing at the fake.
    #[must_use]
    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.api_config()).expect("failed to build API client")
    }

    /// Create a user directly and return a fresh token for it.
    pub fn add_user(&self, username: &str, email: &str, password: &str) -> String {
        let mut store = self.state.lock();
        let id = i64::try_from(store.users.len()).unwrap_or(i64::MAX) + 1;
        store.users.push(FakeUser {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            avatar: None,
        });
        store.issue_token(id)
    }

    /// In-memory session holder logged in as a new user.
    pub fn logged_in_holder(&self, username: &str) -> SessionHolder {
        let email = format!("{username}@redseam.ge");
        let token = self.add_user(username, &email, "password");
        let holder = SessionHolder::in_memory();
        holder
            .set_session(Session::new(
                Credential::new(token),
                User {
                    id: UserId::new(self.user_id(&email)),
                    username: username.to_string(),
                    email,
                    avatar: None,
                },
            ))
            .expect("memory store never fails");
        holder
    }

    fn user_id(&self, email: &str) -> i64 {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .map_or(0, |u| u.id)
    }

    /// Make a token unusable, as if it expired.
    pub fn revoke(&self, token: &str) {
        self.state.lock().tokens.remove(token);
    }

    /// Server-side cart for a token.
    #[must_use]
    pub fn cart_of(&self, token: &str) -> Vec<FakeLine> {
        let store = self.state.lock();
        store
            .tokens
            .get(token)
            .and_then(|user| store.carts.get(user))
            .cloned()
            .unwrap_or_default()
    }

    /// Put a line straight into a user's cart.
    pub fn seed_line(&self, token: &str, line: FakeLine) {
        let mut store = self.state.lock();
        let Some(&user) = store.tokens.get(token) else {
            return;
        };
        store.carts.entry(user).or_default().push(line);
    }

    /// Change a product's price.
    pub fn set_price(&self, product_id: i64, price: f64) {
        if let Some(product) = self.state.lock().products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Answer the next `method path` request with `status` and `body`.
    pub fn fail_next(&self, method: &str, path: &str, status: u16, body: Value) {
        self.script(
            method,
            path,
            ScriptedAction::Respond {
                status: StatusCode::from_u16(status).expect("valid status code"),
                body,
            },
        );
    }

    /// Hold the next `method path` request for `delay` before handling it.
    pub fn stall_next(&self, method: &str, path: &str, delay: Duration) {
        self.script(method, path, ScriptedAction::Stall(delay));
    }

    fn script(&self, method: &str, path: &str, action: ScriptedAction) {
        self.state.lock().scripted.push_back(Scripted {
            method: method.to_string(),
            path: format!("/api{path}"),
            action,
        });
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests matching a method and path (without the `/api` prefix).
    #[must_use]
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        let full = format!("/api{path}");
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == full)
            .collect()
    }
}

fn router(state: FakeState) -> Router {
    let api = Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/products", get(list_products))
        .route("/products/{id}", get(show_product))
        .route("/cart", get(show_cart))
        .route(
            "/cart/products/{id}",
            post(add_line).patch(update_line).delete(remove_line),
        );

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

/// Record the request and play back any scripted failure.
async fn record(State(state): State<FakeState>, request: Request, next: Next) -> Response {
    let recorded = {
        let header_value = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            api_key: header_value("x-api-key"),
            bearer: header_value(header::AUTHORIZATION.as_str())
                .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string)),
        }
    };

    let scripted = {
        let mut store = state.lock();
        store.requests.push(recorded.clone());
        let position = store
            .scripted
            .iter()
            .position(|f| f.method == recorded.method && f.path == recorded.path);
        position.and_then(|i| store.scripted.remove(i))
    };

    match scripted.map(|s| s.action) {
        Some(ScriptedAction::Respond { status, body }) => (status, Json(body)).into_response(),
        Some(ScriptedAction::Stall(delay)) => {
            tokio::time::sleep(delay).await;
            next.run(request).await
        }
        None => next.run(request).await,
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn validation(errors: &BTreeMap<&str, Vec<String>>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": "The given data was invalid.", "errors": errors })),
    )
        .into_response()
}

/// Resolve the bearer token to a user ID.
fn authorize(state: &FakeState, headers: &HeaderMap) -> Result<i64, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    token
        .and_then(|t| state.lock().tokens.get(t).copied())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthenticated."))
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(State(state): State<FakeState>, Json(body): Json<LoginBody>) -> Response {
    let mut errors = BTreeMap::new();
    if body.email.is_empty() {
        errors.insert("email", vec!["The email field is required.".to_string()]);
    }
    if body.password.is_empty() {
        errors.insert("password", vec!["The password field is required.".to_string()]);
    }
    if !errors.is_empty() {
        return validation(&errors);
    }

    let mut store = state.lock();
    let Some(user) = store
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials.");
    };
    let token = store.issue_token(user.id);
    Json(json!({ "user": user.to_json(), "token": token })).into_response()
}

async fn register(State(state): State<FakeState>, mut multipart: Multipart) -> Response {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut avatar = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "avatar" {
            avatar = field.file_name().map(str::to_string);
            // Drain the upload
            let _ = field.bytes().await;
        } else if let Ok(text) = field.text().await {
            fields.insert(name, text);
        }
    }
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    let mut store = state.lock();
    let mut errors: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    if field("username").len() < 3 {
        errors.insert("username", vec!["The username must be at least 3 characters.".to_string()]);
    }
    if !field("email").contains('@') {
        errors.insert("email", vec!["The email must be a valid email address.".to_string()]);
    } else if store.users.iter().any(|u| u.email == field("email")) {
        errors.insert("email", vec!["The email has already been taken.".to_string()]);
    }
    if field("password").len() < 3 {
        errors.insert("password", vec!["The password must be at least 3 characters.".to_string()]);
    } else if field("password") != field("password_confirmation") {
        errors.insert("password", vec!["The password confirmation does not match.".to_string()]);
    }
    if !errors.is_empty() {
        return validation(&errors);
    }

    let id = i64::try_from(store.users.len()).unwrap_or(i64::MAX) + 1;
    let user = FakeUser {
        id,
        username: field("username"),
        email: field("email"),
        password: field("password"),
        avatar: avatar.map(|name| format!("https://cdn.fake/avatars/{name}")),
    };
    store.users.push(user.clone());
    let token = store.issue_token(id);
    (
        StatusCode::CREATED,
        Json(json!({ "user": user.to_json(), "token": token })),
    )
        .into_response()
}

async fn list_products(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let number = |key: &str| params.get(key).and_then(|v| v.parse::<f64>().ok());
    let page = params
        .get("page")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    let from = number("filter[price_from]");
    let to = number("filter[price_to]");

    let store = state.lock();
    let mut products: Vec<&FakeProduct> = store
        .products
        .values()
        .filter(|p| from.is_none_or(|f| p.price >= f))
        .filter(|p| to.is_none_or(|t| p.price <= t))
        .collect();
    match params.get("sort").map(String::as_str) {
        Some("price") => products.sort_by(|a, b| a.price.total_cmp(&b.price)),
        Some("-price") => products.sort_by(|a, b| b.price.total_cmp(&a.price)),
        _ => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }

    let total = products.len();
    let last_page = total.div_ceil(PER_PAGE).max(1);
    let data: Vec<Value> = products
        .iter()
        .skip((page - 1) * PER_PAGE)
        .take(PER_PAGE)
        .map(|p| p.to_json())
        .collect();

    Json(json!({
        "data": data,
        "meta": {
            "current_page": page,
            "last_page": last_page,
            "per_page": PER_PAGE,
            "total": total,
        },
    }))
    .into_response()
}

async fn show_product(State(state): State<FakeState>, Path(id): Path<i64>) -> Response {
    state.lock().products.get(&id).map_or_else(
        || error(StatusCode::NOT_FOUND, "No query results for model [Product]."),
        |p| Json(p.to_json()).into_response(),
    )
}

async fn show_cart(State(state): State<FakeState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(user) => Json(state.lock().cart_json(user)).into_response(),
        Err(response) => response,
    }
}

#[derive(Deserialize)]
struct LineBody {
    #[serde(default)]
    quantity: i64,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

/// Check the product and variant; returns the validated quantity.
fn check_line(store: &Store, id: i64, body: &LineBody) -> Result<u32, Response> {
    let product = store
        .products
        .get(&id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "No query results for model [Product]."))?;

    let mut errors: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let quantity = u32::try_from(body.quantity).ok().filter(|q| *q >= 1);
    if quantity.is_none() {
        errors.insert("quantity", vec!["The quantity must be at least 1.".to_string()]);
    }
    if let Some(color) = &body.color
        && !product.colors.contains(color)
    {
        errors.insert("color", vec!["The selected color is invalid.".to_string()]);
    }
    if let Some(size) = &body.size
        && !product.sizes.contains(size)
    {
        errors.insert("size", vec!["The selected size is invalid.".to_string()]);
    }

    match quantity {
        Some(q) if errors.is_empty() => Ok(q),
        _ => Err(validation(&errors)),
    }
}

async fn add_line(
    State(state): State<FakeState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<LineBody>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let mut store = state.lock();
    let quantity = match check_line(&store, id, &body) {
        Ok(q) => q,
        Err(response) => return response,
    };

    let cart = store.carts.entry(user).or_default();
    match cart
        .iter_mut()
        .find(|l| l.product_id == id && l.color == body.color && l.size == body.size)
    {
        Some(line) => line.quantity += quantity,
        None => cart.push(FakeLine {
            product_id: id,
            color: body.color,
            size: body.size,
            quantity,
        }),
    }
    (StatusCode::CREATED, Json(store.cart_json(user))).into_response()
}

async fn update_line(
    State(state): State<FakeState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<LineBody>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let mut store = state.lock();
    let quantity = match check_line(&store, id, &body) {
        Ok(q) => q,
        Err(response) => return response,
    };

    let line = store
        .carts
        .entry(user)
        .or_default()
        .iter_mut()
        .find(|l| l.product_id == id && l.color == body.color && l.size == body.size);
    match line {
        Some(line) => {
            line.quantity = quantity;
            Json(store.cart_json(user)).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Product is not in the cart."),
    }
}

#[derive(Deserialize)]
struct VariantBody {
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

async fn remove_line(
    State(state): State<FakeState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<VariantBody>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let mut store = state.lock();
    let cart = store.carts.entry(user).or_default();
    let before = cart.len();
    cart.retain(|l| !(l.product_id == id && l.color == body.color && l.size == body.size));

    if cart.len() == before {
        error(StatusCode::NOT_FOUND, "Product is not in the cart.")
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}
