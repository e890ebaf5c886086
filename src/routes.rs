//! HTTP surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::{link_index, linked_product, merged_catalog, CatalogItem, CatalogQuery, CatalogSnapshot, SpreadsheetIngestor};
use crate::checkout::{build_message, whatsapp_url, CheckoutForm};
use crate::config::Config;
use crate::domain::aggregates::cart::SESSION_KEY;
use crate::domain::aggregates::{Cart, CartLineView, CartSummary, ImageContext, NewOrder, Order, OrderStatus, Product, SpreadsheetPayload};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{parse_price, ItemKey, Money, Origin};
use crate::storage::{OrderStore, ProductStore, SessionStore};
use crate::StorefrontError;

const ADMIN_HEADER: &str = "x-admin-token";
const SUMMARY_LIMIT: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub catalog: Arc<SpreadsheetIngestor>,
    pub config: Arc<Config>,
    pub nats: Option<async_nats::Client>,
}

fn images<'a>(snapshot: &'a CatalogSnapshot, config: &'a Config) -> ImageContext<'a> {
    ImageContext {
        index: &snapshot.images,
        local_prefix: &config.images_url_prefix,
        placeholder: &config.placeholder_image,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront"})) }))
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/catalog", get(catalog))
        .route("/api/v1/catalog/x/:idx", get(spreadsheet_row))
        .route("/api/v1/catalog/refresh", post(refresh_catalog))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/summary", get(cart_summary))
        .route("/api/v1/cart/:session/items", post(add_item))
        .route("/api/v1/cart/:session/items/:origin/:id", delete(remove_item))
        .route("/api/v1/cart/:session/products/:id", post(add_product))
        .route("/api/v1/cart/:session/checkout", get(quick_checkout).post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/cart/:session/orders/:id/confirmation", get(order_confirmation))
        .route("/api/v1/orders/:id/status", patch(update_order_status))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError { Forbidden, Storefront(StorefrontError) }

impl From<StorefrontError> for ApiError {
    fn from(e: StorefrontError) -> Self { Self::Storefront(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            Self::Forbidden => return (StatusCode::FORBIDDEN, Json(json!({"error": "Forbidden"}))).into_response(),
            Self::Storefront(e) => e,
        };
        let status = match &e {
            StorefrontError::ProductNotFound | StorefrontError::OrderNotFound => StatusCode::NOT_FOUND,
            StorefrontError::Validation(errors) => {
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"errors": errors}))).into_response();
            }
            StorefrontError::EmptyCart | StorefrontError::InvalidStatusTransition(_) | StorefrontError::ConcurrentUpdate => {
                StatusCode::CONFLICT
            }
            _ => {
                error!(error = %e, "request failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "Internal server error"}))).into_response();
            }
        };
        (status, Json(json!({"error": e.to_string()}))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let presented = headers.get(ADMIN_HEADER).and_then(|v| v.to_str().ok());
    match (state.config.admin_token.as_deref(), presented) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Runs `f` on the blocking pool. Used for file reads and for anything that
/// resolves images, since fuzzy matching is CPU bound.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorefrontError::Io(std::io::Error::other(e)).into())
}

async fn snapshot(state: &AppState) -> ApiResult<Arc<CatalogSnapshot>> {
    let ingestor = Arc::clone(&state.catalog);
    blocking(move || ingestor.load_catalog()).await
}

async fn load_cart(state: &AppState, session: &str) -> ApiResult<Cart> {
    Ok(Cart::from_session(state.sessions.load(session, SESSION_KEY).await?))
}

async fn save_cart(state: &AppState, session: &str, cart: &Cart) -> ApiResult<()> {
    state.sessions.save(session, SESSION_KEY, cart.to_session()).await?;
    Ok(())
}

async fn publish(state: &AppState, events: Vec<DomainEvent>) {
    let Some(client) = &state.nats else { return };
    for event in events {
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { warn!(error = %e, "event serialization failed"); continue; }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            warn!(subject = event.subject(), error = %e, "event publish failed");
        }
    }
}

fn image_url(config: &Config, item: &CatalogItem) -> String {
    item.image.url(&config.images_url_prefix).unwrap_or_else(|| config.placeholder_image.clone())
}

/// Loads the session cart, applies `change` and renders the result on the
/// blocking pool. The cart is saved when `change` reports a modification.
async fn with_cart<F>(s: &AppState, session: String, change: F) -> ApiResult<Json<CartView>>
where
    F: FnOnce(&mut Cart, &CatalogSnapshot, &ImageContext<'_>) -> crate::Result<bool> + Send + 'static,
{
    let snap = snapshot(s).await?;
    let mut cart = load_cart(s, &session).await?;
    let config = Arc::clone(&s.config);
    let (cart, changed, view) = blocking(move || -> crate::Result<_> {
        let images = images(&snap, &config);
        let changed = change(&mut cart, &*snap, &images)?;
        let view = CartView::new(session, &cart, &images)?;
        Ok((cart, changed, view))
    })
    .await??;
    if changed {
        save_cart(s, &view.session_id, &cart).await?;
    }
    Ok(Json(view))
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Serialize)] pub struct CatalogEntry { #[serde(flatten)] pub item: CatalogItem, pub image_url: String }
#[derive(Debug, Serialize)] pub struct CatalogResponse { pub items: Vec<CatalogEntry>, pub brands: Vec<String>, pub total: usize }
#[derive(Debug, Serialize)] pub struct ProductView { #[serde(flatten)] pub product: Product, pub available: bool, pub image_url: String }

#[derive(Debug, Serialize)]
pub struct CartView {
    pub session_id: String,
    pub items: Vec<CartLineView>,
    pub total: Decimal,
    pub total_display: String,
    pub total_items: u64,
    pub line_count: usize,
}

impl CartView {
    fn new(session_id: String, cart: &Cart, images: &ImageContext<'_>) -> crate::Result<Self> {
        let total = cart.total()?;
        Ok(Self {
            session_id,
            items: cart.lines(images)?,
            total: total.amount(),
            total_display: total.to_string(),
            total_items: cart.len(),
            line_count: cart.line_count(),
        })
    }
}

#[derive(Debug, Serialize)] pub struct Confirmation { pub order: Order, pub message: String, pub whatsapp_url: String }

// =============================================================================
// Catalog
// =============================================================================

async fn create_session() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::CREATED, Json(json!({"session_id": Uuid::new_v4().to_string()})))
}

async fn catalog(State(s): State<AppState>, Query(q): Query<CatalogQuery>) -> ApiResult<Json<CatalogResponse>> {
    let snap = snapshot(&s).await?;
    let products = s.products.active_products().await?;
    let config = Arc::clone(&s.config);
    let response = blocking(move || {
        let merged = merged_catalog(&snap.items, &products, &snap.images, &q);
        let items: Vec<CatalogEntry> = merged
            .items
            .into_iter()
            .map(|item| CatalogEntry { image_url: image_url(&config, &item), item })
            .collect();
        CatalogResponse { total: items.len(), items, brands: merged.brands }
    })
    .await?;
    Ok(Json(response))
}

async fn spreadsheet_row(State(s): State<AppState>, Path(idx): Path<usize>) -> ApiResult<Json<CatalogEntry>> {
    let snap = snapshot(&s).await?;
    let mut item = snap.row(idx).cloned().ok_or(StorefrontError::ProductNotFound)?;
    let products = s.products.active_products().await?;
    item.linked_product_id = linked_product(&item, &link_index(&products));
    Ok(Json(CatalogEntry { image_url: image_url(&s.config, &item), item }))
}

async fn refresh_catalog(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&s, &headers)?;
    let invalidated = s.catalog.invalidate();
    info!(invalidated, "spreadsheet catalog cache dropped");
    Ok(Json(json!({"invalidated": invalidated})))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ProductView>> {
    let product = s.products.product(id).await?.ok_or(StorefrontError::ProductNotFound)?;
    let snap = snapshot(&s).await?;
    let config = Arc::clone(&s.config);
    let view = blocking(move || {
        let image_url = product
            .image(&snap.images)
            .url(&config.images_url_prefix)
            .unwrap_or_else(|| config.placeholder_image.clone());
        ProductView { available: product.is_available(), image_url, product }
    })
    .await?;
    Ok(Json(view))
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize)] #[serde(untagged)] pub enum PriceInput { Text(String), Number(Decimal) }

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    #[serde(default = "default_origin")]
    pub origin: String,
    pub id: String,
    pub name: Option<String>,
    pub price: Option<PriceInput>,
    pub img: Option<String>,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub replace: bool,
}

fn default_origin() -> String { Origin::Spreadsheet.tag().to_string() }

#[derive(Debug, Default, Deserialize)] pub struct AddByIdRequest { pub quantity: Option<i64>, #[serde(default)] pub replace: bool }

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CartView>> {
    with_cart(&s, session, |_, _, _| Ok(false)).await
}

async fn cart_summary(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CartSummary>> {
    let snap = snapshot(&s).await?;
    let cart = load_cart(&s, &session).await?;
    let config = Arc::clone(&s.config);
    let summary = blocking(move || cart.summary(&images(&snap, &config), SUMMARY_LIMIT)).await?;
    Ok(Json(summary.map_err(StorefrontError::from)?))
}

async fn product_for(s: &AppState, id: &str) -> ApiResult<Product> {
    let id: i64 = id.trim().parse().map_err(|_| StorefrontError::ProductNotFound)?;
    Ok(s.products.product(id).await?.ok_or(StorefrontError::ProductNotFound)?)
}

fn posted_price(price: Option<PriceInput>) -> ApiResult<Option<Decimal>> {
    let price = price.map(|p| match p {
        PriceInput::Number(n) => n,
        PriceInput::Text(t) => parse_price(&t),
    });
    if price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
        return Err(StorefrontError::field("price", "El precio no puede ser negativo.").into());
    }
    Ok(price)
}

/// Generic add for either origin. Quantity 0 removes the line.
///
/// A spreadsheet row present in the current snapshot is priced from the
/// snapshot; the posted price only applies to ids the snapshot lacks.
async fn add_item(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItemRequest>) -> ApiResult<Json<CartView>> {
    let origin: Origin = r.origin.parse().map_err(|_| StorefrontError::field("origin", "Origen desconocido."))?;
    let quantity = r.quantity.unwrap_or(1);
    let replace = r.replace;
    let posted = posted_price(r.price)?;
    let product = match origin {
        Origin::Database => Some(product_for(&s, &r.id).await?),
        Origin::Spreadsheet => None,
    };
    let id = r.id.trim().to_string();
    if id.is_empty() {
        return Err(StorefrontError::field("id", "Falta el identificador del producto.").into());
    }
    let (name, img) = (r.name, r.img);

    with_cart(&s, session, move |cart, snap, images| {
        if let Some(product) = product {
            if quantity == 0 {
                return Ok(cart.remove(&ItemKey::database(product.id)));
            }
            cart.add_product(&product, images, quantity, replace)?;
            return Ok(true);
        }
        if quantity == 0 {
            return Ok(cart.remove(&ItemKey::new(Origin::Spreadsheet, id)));
        }
        let row = id.parse::<usize>().ok().and_then(|i| snap.row(i));
        let price = match row {
            Some(row) => row.price.unwrap_or_default(),
            None => posted.unwrap_or_default(),
        };
        let name = name.filter(|n| !n.trim().is_empty()).or_else(|| row.map(|row| row.title.clone())).unwrap_or_default();
        let img = img.or_else(|| row.and_then(|row| row.image.url(images.local_prefix)));
        cart.add_payload(SpreadsheetPayload { id, name, price, img }, images, quantity, replace)?;
        Ok(true)
    })
    .await
}

/// Add by database id. Quantity is at least 1 on this path.
async fn add_product(
    State(s): State<AppState>,
    Path((session, id)): Path<(String, String)>,
    body: Option<Json<AddByIdRequest>>,
) -> ApiResult<Json<CartView>> {
    let r = body.map(|Json(r)| r).unwrap_or_default();
    let product = product_for(&s, &id).await?;
    let quantity = r.quantity.unwrap_or(1).max(1);
    with_cart(&s, session, move |cart, _, images| {
        cart.add_product(&product, images, quantity, r.replace)?;
        Ok(true)
    })
    .await
}

async fn remove_item(State(s): State<AppState>, Path((session, origin, id)): Path<(String, String, String)>) -> ApiResult<Json<CartView>> {
    let origin: Origin = origin.parse().map_err(|_| StorefrontError::field("origin", "Origen desconocido."))?;
    let key = ItemKey::new(origin, id.trim());
    with_cart(&s, session, move |cart, _, _| Ok(cart.remove(&key))).await
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<StatusCode> {
    let mut cart = load_cart(&s, &session).await?;
    cart.clear();
    save_cart(&s, &session, &cart).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Checkout & orders
// =============================================================================

/// Rendered lines and total of a non-empty cart.
async fn priced_lines(s: &AppState, cart: Cart) -> ApiResult<(Vec<CartLineView>, Money)> {
    let snap = snapshot(s).await?;
    let config = Arc::clone(&s.config);
    let priced = blocking(move || -> crate::Result<_> {
        let lines = cart.lines(&images(&snap, &config))?;
        Ok((lines, cart.total()?))
    })
    .await??;
    Ok(priced)
}

/// Straight to WhatsApp with the cart contents; no order is recorded.
async fn quick_checkout(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Redirect> {
    let cart = load_cart(&s, &session).await?;
    if cart.is_empty() {
        return Err(StorefrontError::EmptyCart.into());
    }
    let (lines, total) = priced_lines(&s, cart).await?;
    let message = build_message(&lines, total, None, None, &s.config.country_code);
    Ok(Redirect::to(&whatsapp_url(&s.config.whatsapp_phone, &message)))
}

async fn checkout(State(s): State<AppState>, Path(session): Path<String>, Json(form): Json<CheckoutForm>) -> ApiResult<Redirect> {
    let cart = load_cart(&s, &session).await?;
    if cart.is_empty() {
        return Err(StorefrontError::EmptyCart.into());
    }
    let customer = form.into_customer()?;
    let (lines, total) = priced_lines(&s, cart).await?;
    let new = NewOrder::from_cart(&session, customer, lines, total).map_err(StorefrontError::from)?;
    let mut order = s.orders.create(new).await?;
    info!(order_id = order.id(), total = %order.total(), lines = order.items().len(), "order created");
    publish(&s, order.take_events()).await;

    // The order exists now; a retry after a failed save would record it twice.
    if let Err(e) = save_cart(&s, &session, &Cart::new()).await {
        warn!(order_id = order.id(), error = ?e, "cart not cleared after checkout");
    }
    Ok(Redirect::to(&format!("/api/v1/cart/{}/orders/{}/confirmation", urlencoding::encode(&session), order.id())))
}

/// Only the session that placed the order can read it back.
async fn order_confirmation(State(s): State<AppState>, Path((session, id)): Path<(String, i64)>) -> ApiResult<Json<Confirmation>> {
    let order = s
        .orders
        .order(id)
        .await?
        .filter(|order| order.placed_by(&session))
        .ok_or(StorefrontError::OrderNotFound)?;
    let message = build_message(order.items(), order.total(), Some(order.customer()), Some(order.id()), &s.config.country_code);
    let whatsapp_url = whatsapp_url(&s.config.whatsapp_phone, &message);
    Ok(Json(Confirmation { order, message, whatsapp_url }))
}

async fn list_orders(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<Order>>> {
    require_admin(&s, &headers)?;
    Ok(Json(s.orders.list().await?))
}

#[derive(Debug, Deserialize)] pub struct StatusUpdate { pub status: String }

async fn update_order_status(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(r): Json<StatusUpdate>,
) -> ApiResult<Json<Order>> {
    require_admin(&s, &headers)?;
    let status: OrderStatus = r.status.parse().map_err(|_| StorefrontError::field("status", "Estado desconocido."))?;
    let mut order = s.orders.update_status(id, status).await?;
    info!(order_id = id, status = status.as_str(), "order status updated");
    publish(&s, order.take_events()).await;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CartError;
    use crate::domain::value_objects::MoneyError;

    fn status_of(e: StorefrontError) -> StatusCode { ApiError::from(e).into_response().status() }

    #[test]
    fn test_error_statuses() {
        assert_eq!(status_of(StorefrontError::ConcurrentUpdate), StatusCode::CONFLICT);
        assert_eq!(status_of(StorefrontError::EmptyCart), StatusCode::CONFLICT);
        assert_eq!(status_of(StorefrontError::OrderNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CartError::QuantityTooLarge.into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(CartError::NegativePrice.into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(MoneyError::Overflow.into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(StorefrontError::Config("bad".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_posted_price_rejects_negatives() {
        assert_eq!(posted_price(Some(PriceInput::Text("2.800".into()))).unwrap(), Some(Decimal::new(2800, 0)));
        assert_eq!(posted_price(None).unwrap(), None);
        assert!(posted_price(Some(PriceInput::Text("-5000".into()))).is_err());
        assert!(posted_price(Some(PriceInput::Number(Decimal::new(-1, 2)))).is_err());
    }
}
