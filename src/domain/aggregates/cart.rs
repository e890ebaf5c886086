//! Cart Aggregate
//!
//! Lives in the visitor's session under [`SESSION_KEY`]: a JSON object from
//! namespaced item key (`DB:7`, `XLS:7`) to line record. A request loads
//! it, mutates it in memory and writes it back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::catalog::image::resolve_payload_url;
use crate::catalog::ImageIndex;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{ItemKey, Money, MoneyError, Origin};

pub const SESSION_KEY: &str = "cart";
/// Most units a single line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;
/// Highest unit price a line may carry, in pesos.
pub const MAX_UNIT_PRICE: u64 = 1_000_000_000_000;

/// A line as stored in the session. `quantity` is always at least 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub origin: Origin,
}

impl CartLine {
    pub fn key(&self) -> ItemKey { ItemKey::new(self.origin, self.id.clone()) }
    pub fn subtotal(&self) -> Result<Money, MoneyError> { Money::new(self.price).checked_multiply(self.quantity) }

    fn is_within_limits(&self) -> bool {
        self.quantity > 0 && self.quantity <= MAX_LINE_QUANTITY && check_price(self.price).is_ok()
    }
}

fn check_price(price: Decimal) -> Result<(), CartError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CartError::NegativePrice);
    }
    if price > Decimal::from(MAX_UNIT_PRICE) {
        return Err(CartError::PriceTooLarge);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)] pub enum CartError { QuantityTooLarge, NegativePrice, PriceTooLarge }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuantityTooLarge => write!(f, "a line holds at most {MAX_LINE_QUANTITY} units"),
            Self::NegativePrice => write!(f, "price cannot be negative"),
            Self::PriceTooLarge => write!(f, "price above {MAX_UNIT_PRICE}"),
        }
    }
}

/// A spreadsheet row as posted by the storefront page.
#[derive(Clone, Debug, Default)]
pub struct SpreadsheetPayload {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub img: Option<String>,
}

/// What image URLs are resolved against when rendering lines.
#[derive(Clone, Copy, Debug)]
pub struct ImageContext<'a> {
    pub index: &'a ImageIndex,
    pub local_prefix: &'a str,
    pub placeholder: &'a str,
}

/// Read-only rendering of a line; also the order snapshot format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLineView {
    pub key: String,
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
    pub img: Option<String>,
    pub image_url: String,
    pub origin: Origin,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartSummary {
    pub total_items: u64,
    pub total_price: Decimal,
    pub items: Vec<CartLineView>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds the cart from its session value. Entries that do not parse
    /// or fall outside the quantity and price limits are dropped.
    pub fn from_session(value: Option<Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::new();
        };
        let mut cart = Self::new();
        for (key, raw) in map {
            match serde_json::from_value::<CartLine>(raw) {
                Ok(line) if line.is_within_limits() => cart.lines.push(line),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "dropping unreadable cart line"),
            }
        }
        cart
    }

    pub fn to_session(&self) -> Value {
        let map: Map<String, Value> = self
            .lines
            .iter()
            .filter_map(|line| serde_json::to_value(line).ok().map(|v| (line.key().to_string(), v)))
            .collect();
        Value::Object(map)
    }

    /// Adds a database product. With `replace` the quantity is set rather
    /// than added to; a resulting quantity of zero or less removes the line.
    /// The cart is left unchanged when the line would exceed
    /// [`MAX_LINE_QUANTITY`] or the price is out of range.
    pub fn add_product(&mut self, product: &Product, images: &ImageContext<'_>, quantity: i64, replace: bool) -> Result<(), CartError> {
        let image_url = product.image(images.index).url(images.local_prefix);
        let line = CartLine {
            id: product.id.to_string(),
            name: product.name.clone(),
            price: product.price,
            quantity: 0,
            img: product.image_file.clone(),
            image_url,
            origin: Origin::Database,
        };
        self.apply(line, quantity, replace)
    }

    /// Adds a spreadsheet row; same rules as [`Cart::add_product`].
    pub fn add_payload(&mut self, payload: SpreadsheetPayload, images: &ImageContext<'_>, quantity: i64, replace: bool) -> Result<(), CartError> {
        let img = payload.img.filter(|i| !i.trim().is_empty());
        let image_url = img.as_deref().and_then(|i| resolve_payload_url(i, images.index, images.local_prefix));
        let line = CartLine {
            id: payload.id.trim().to_string(),
            name: payload.name.trim().to_string(),
            price: payload.price,
            quantity: 0,
            img,
            image_url,
            origin: Origin::Spreadsheet,
        };
        self.apply(line, quantity, replace)
    }

    fn apply(&mut self, fresh: CartLine, quantity: i64, replace: bool) -> Result<(), CartError> {
        if quantity.unsigned_abs() > u64::from(MAX_LINE_QUANTITY) {
            return Err(CartError::QuantityTooLarge);
        }
        let key = fresh.key();
        let position = self.lines.iter().position(|l| l.key() == key);
        let current = position.map_or(0, |i| i64::from(self.lines[i].quantity));
        let next = if replace { quantity.max(0) } else { current + quantity };

        if next <= 0 {
            if let Some(i) = position {
                self.lines.remove(i);
            }
            return Ok(());
        }
        let next = u32::try_from(next).ok().filter(|n| *n <= MAX_LINE_QUANTITY).ok_or(CartError::QuantityTooLarge)?;
        check_price(fresh.price)?;
        match position {
            Some(i) => {
                let line = &mut self.lines[i];
                line.quantity = next;
                if !fresh.name.is_empty() {
                    line.name = fresh.name;
                }
                line.price = fresh.price;
                if fresh.origin == Origin::Spreadsheet {
                    line.img = fresh.img;
                }
                if fresh.image_url.is_some() {
                    line.image_url = fresh.image_url;
                }
            }
            None => self.lines.push(CartLine { quantity: next, ..fresh }),
        }
        Ok(())
    }

    /// Removes the line if present.
    pub fn remove(&mut self, key: &ItemKey) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.key() != key);
        self.lines.len() != before
    }

    pub fn clear(&mut self) { self.lines.clear(); }

    pub fn quantity_of(&self, key: &ItemKey) -> u32 {
        self.lines.iter().find(|l| &l.key() == key).map_or(0, |l| l.quantity)
    }

    /// Total units across all lines.
    pub fn len(&self) -> u64 { self.lines.iter().map(|l| u64::from(l.quantity)).sum() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line_count(&self) -> usize { self.lines.len() }

    pub fn total(&self) -> Result<Money, MoneyError> {
        self.lines.iter().try_fold(Money::ZERO, |acc, line| acc.checked_add(&line.subtotal()?))
    }

    /// Lines ready for display, each with a usable image URL: the cached
    /// one, else a fresh resolution of the raw reference, else the
    /// placeholder.
    pub fn lines(&self, images: &ImageContext<'_>) -> Result<Vec<CartLineView>, MoneyError> {
        self.lines
            .iter()
            .map(|line| {
                let image_url = line
                    .image_url
                    .clone()
                    .filter(|u| !u.is_empty())
                    .or_else(|| line.img.as_deref().and_then(|i| resolve_payload_url(i, images.index, images.local_prefix)))
                    .unwrap_or_else(|| images.placeholder.to_string());
                Ok(CartLineView {
                    key: line.key().to_string(),
                    id: line.id.clone(),
                    name: line.name.clone(),
                    price: line.price,
                    quantity: line.quantity,
                    subtotal: line.subtotal()?.amount(),
                    img: line.img.clone(),
                    image_url,
                    origin: line.origin,
                })
            })
            .collect()
    }

    pub fn summary(&self, images: &ImageContext<'_>, limit: usize) -> Result<CartSummary, MoneyError> {
        let mut items = self.lines(images)?;
        items.truncate(limit);
        Ok(CartSummary { total_items: self.len(), total_price: self.total()?.amount(), items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const PLACEHOLDER: &str = "/static/img/placeholder.svg";

    fn ctx(index: &ImageIndex) -> ImageContext<'_> {
        ImageContext { index, local_prefix: "/static/img/productos/", placeholder: PLACEHOLDER }
    }

    fn payload(id: &str, price: Decimal) -> SpreadsheetPayload {
        SpreadsheetPayload { id: id.into(), name: format!("Row {id}"), price, img: None }
    }

    fn product(id: i64, price: Decimal) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            brand: "Hem".into(),
            description: String::new(),
            price,
            stock: 10,
            active: true,
            image_file: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_then_subtract_to_zero_removes_line() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        cart.add_payload(payload("4", Decimal::ONE), &ctx(&index), 3, false).unwrap();
        assert_eq!(cart.len(), 3);
        cart.add_payload(payload("4", Decimal::ONE), &ctx(&index), -3, false).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.quantity_of(&ItemKey::spreadsheet(4)), 0);
    }

    #[test]
    fn test_replace_sets_quantity() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        cart.add_payload(payload("4", Decimal::ONE), &ctx(&index), 2, false).unwrap();
        cart.add_payload(payload("4", Decimal::ONE), &ctx(&index), 1, true).unwrap();
        assert_eq!(cart.quantity_of(&ItemKey::spreadsheet(4)), 1);
        cart.add_payload(payload("4", Decimal::ONE), &ctx(&index), -5, true).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_origins_never_collide() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        cart.add_product(&product(7, Decimal::TEN), &ctx(&index), 1, false).unwrap();
        cart.add_payload(payload("7", Decimal::ONE), &ctx(&index), 2, false).unwrap();
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.len(), 3);
        assert!(cart.remove(&ItemKey::database(7)));
        assert!(!cart.remove(&ItemKey::database(7)));
        assert_eq!(cart.quantity_of(&ItemKey::spreadsheet(7)), 2);
    }

    #[test]
    fn test_total_is_exact_decimal() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        cart.add_payload(payload("1", Decimal::new(19999, 2)), &ctx(&index), 3, false).unwrap();
        assert_eq!(cart.total().unwrap().amount(), Decimal::new(59997, 2));
        cart.add_product(&product(2, Decimal::new(10, 2)), &ctx(&index), 3, false).unwrap();
        assert_eq!(cart.total().unwrap().amount(), Decimal::new(60027, 2));
        let views = cart.lines(&ctx(&index)).unwrap();
        assert_eq!(views[0].subtotal, Decimal::new(59997, 2));
    }

    #[test]
    fn test_readd_refreshes_name_and_price() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        cart.add_product(&product(7, Decimal::TEN), &ctx(&index), 1, false).unwrap();
        let mut changed = product(7, Decimal::new(12, 0));
        changed.name = "Renamed".into();
        cart.add_product(&changed, &ctx(&index), 1, false).unwrap();
        let views = cart.lines(&ctx(&index)).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "Renamed");
        assert_eq!(views[0].quantity, 2);
        assert_eq!(cart.total().unwrap().amount(), Decimal::new(24, 0));
    }

    #[test]
    fn test_image_url_resolution_order() {
        let index = ImageIndex::from_files(["canela.jpg"]);
        let mut cart = Cart::new();
        let mut with_image = payload("1", Decimal::ONE);
        with_image.img = Some("Canela".into());
        cart.add_payload(with_image, &ctx(&index), 1, false).unwrap();
        cart.add_payload(payload("2", Decimal::ONE), &ctx(&index), 1, false).unwrap();

        let views = cart.lines(&ctx(&index)).unwrap();
        assert_eq!(views[0].image_url, "/static/img/productos/canela.jpg");
        assert_eq!(views[1].image_url, PLACEHOLDER);

        // the raw reference resolves later once the file shows up
        let mut late = Cart::new();
        let mut missing = payload("3", Decimal::ONE);
        missing.img = Some("mirra".into());
        late.add_payload(missing, &ctx(&ImageIndex::default()), 1, false).unwrap();
        let index = ImageIndex::from_files(["Mirra.png"]);
        assert_eq!(late.lines(&ctx(&index)).unwrap()[0].image_url, "/static/img/productos/Mirra.png");
    }

    #[test]
    fn test_session_roundtrip_keeps_order_and_keys() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        cart.add_payload(payload("9", Decimal::new(2800, 0)), &ctx(&index), 2, false).unwrap();
        cart.add_product(&product(1, Decimal::TEN), &ctx(&index), 1, false).unwrap();

        let value = cart.to_session();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["XLS:9", "DB:1"]);

        let restored = Cart::from_session(Some(value));
        assert_eq!(restored, cart);
    }

    #[test]
    fn test_from_session_drops_garbage() {
        let value = serde_json::json!({
            "XLS:1": {"id": "1", "name": "Canela", "price": "2800", "quantity": 2, "origin": "XLS"},
            "XLS:2": {"id": "2", "name": "Zero", "price": "1", "quantity": 0, "origin": "XLS"},
            "bogus": "not a line",
        });
        let cart = Cart::from_session(Some(value));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.total().unwrap().amount(), Decimal::new(5600, 0));
        assert!(Cart::from_session(None).is_empty());
        assert!(Cart::from_session(Some(serde_json::json!([1, 2]))).is_empty());
    }

    #[test]
    fn test_summary_limits_items() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        for i in 0..7 {
            cart.add_payload(payload(&i.to_string(), Decimal::ONE), &ctx(&index), 1, false).unwrap();
        }
        let summary = cart.summary(&ctx(&index), 5).unwrap();
        assert_eq!(summary.items.len(), 5);
        assert_eq!(summary.total_items, 7);
        assert_eq!(summary.total_price, Decimal::new(7, 0));
    }

    #[test]
    fn test_quantity_above_line_limit_is_rejected() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        let huge = i64::from(u32::MAX);
        assert_eq!(cart.add_payload(payload("1", Decimal::ONE), &ctx(&index), huge, false), Err(CartError::QuantityTooLarge));
        assert_eq!(cart.add_payload(payload("2", Decimal::ONE), &ctx(&index), huge, false), Err(CartError::QuantityTooLarge));
        assert!(cart.is_empty());

        cart.add_payload(payload("1", Decimal::ONE), &ctx(&index), 600, false).unwrap();
        assert_eq!(cart.add_payload(payload("1", Decimal::ONE), &ctx(&index), 600, false), Err(CartError::QuantityTooLarge));
        assert_eq!(cart.quantity_of(&ItemKey::spreadsheet(1)), 600);
        cart.add_payload(payload("1", Decimal::ONE), &ctx(&index), 999, true).unwrap();
        assert_eq!(cart.len(), 999);
        assert_eq!(cart.add_payload(payload("1", Decimal::ONE), &ctx(&index), i64::MIN, true), Err(CartError::QuantityTooLarge));
    }

    #[test]
    fn test_price_out_of_range_is_rejected() {
        let index = ImageIndex::default();
        let mut cart = Cart::new();
        assert_eq!(cart.add_payload(payload("0", Decimal::MAX), &ctx(&index), 2, false), Err(CartError::PriceTooLarge));
        assert_eq!(cart.add_payload(payload("0", Decimal::new(-5000, 0)), &ctx(&index), 1, false), Err(CartError::NegativePrice));
        assert!(cart.is_empty());
        cart.add_payload(payload("0", Decimal::ZERO), &ctx(&index), 1, false).unwrap();
        assert_eq!(cart.total().unwrap(), Money::ZERO);
    }

    #[test]
    fn test_overflowing_subtotal_is_an_error() {
        let line = CartLine {
            id: "0".into(),
            name: "Huge".into(),
            price: Decimal::MAX,
            quantity: 2,
            img: None,
            image_url: None,
            origin: Origin::Spreadsheet,
        };
        assert_eq!(line.subtotal(), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_from_session_drops_lines_out_of_limits() {
        let value = serde_json::json!({
            "XLS:1": {"id": "1", "name": "Many", "price": "1", "quantity": 4294967295u32, "origin": "XLS"},
            "XLS:2": {"id": "2", "name": "Huge", "price": "79228162514264337593543950335", "quantity": 2, "origin": "XLS"},
            "XLS:3": {"id": "3", "name": "Negative", "price": "-5000", "quantity": 1, "origin": "XLS"},
            "XLS:4": {"id": "4", "name": "Fine", "price": "2800", "quantity": 2, "origin": "XLS"},
        });
        let cart = Cart::from_session(Some(value));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.total().unwrap().amount(), Decimal::new(5600, 0));
    }
}
