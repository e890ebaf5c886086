//! Order Aggregate

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::CartLineView;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, Phone};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMode { #[default] Pickup, Delivery }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod { #[default] OnlinePayment, BankTransfer, Cash }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Confirmed, Delivered, Cancelled }

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pickup => "PICKUP", Self::Delivery => "DELIVERY" }
    }
    pub fn label(&self) -> &'static str {
        match self { Self::Pickup => "Retiro en punto de entrega", Self::Delivery => "Envío a domicilio" }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::OnlinePayment => "ONLINE_PAYMENT", Self::BankTransfer => "BANK_TRANSFER", Self::Cash => "CASH" }
    }
    pub fn label(&self) -> &'static str {
        match self { Self::OnlinePayment => "Mercado Pago", Self::BankTransfer => "Transferencia", Self::Cash => "Efectivo" }
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Confirmed => "CONFIRMED", Self::Delivered => "DELIVERED", Self::Cancelled => "CANCELLED" }
    }
    pub fn label(&self) -> &'static str {
        match self { Self::Pending => "Pendiente", Self::Confirmed => "Confirmada", Self::Delivered => "Entregada", Self::Cancelled => "Cancelada" }
    }
}

/// Unrecognized enum token.
#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownVariant(pub String);
impl std::error::Error for UnknownVariant {}
impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown value '{}'", self.0) }
}

fn token(s: &str) -> String { s.trim().to_ascii_uppercase().replace(['-', ' '], "_") }

impl FromStr for DeliveryMode {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match token(s).as_str() {
            "PICKUP" | "RETIRO" => Ok(Self::Pickup),
            "DELIVERY" | "ENVIO" => Ok(Self::Delivery),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match token(s).as_str() {
            "ONLINE_PAYMENT" | "MP" | "MERCADOPAGO" | "MERCADO_PAGO" => Ok(Self::OnlinePayment),
            "BANK_TRANSFER" | "TRANSFERENCIA" => Ok(Self::BankTransfer),
            "CASH" | "EFECTIVO" => Ok(Self::Cash),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match token(s).as_str() {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// Validated checkout data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub phone: Phone,
    pub email: Option<String>,
    pub delivery: DeliveryMode,
    /// Present whenever `delivery` is `Delivery`.
    pub address: Option<String>,
    pub payment: PaymentMethod,
    pub comment: Option<String>,
}

/// An order about to be persisted, tied to the session whose cart it came
/// from.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub session_id: String,
    pub customer: CustomerDetails,
    pub items: Vec<CartLineView>,
    pub total: Money,
}

impl NewOrder {
    pub fn from_cart(session_id: &str, customer: CustomerDetails, items: Vec<CartLineView>, total: Money) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        Ok(Self { session_id: session_id.to_string(), customer, items, total })
    }
}

/// A recorded order. Only the status changes after creation.
#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: i64,
    #[serde(skip)]
    session_id: String,
    #[serde(flatten)]
    customer: CustomerDetails,
    total: Decimal,
    status: OrderStatus,
    items: Vec<CartLineView>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// Rebuilds an order from storage.
    pub fn from_parts(id: i64, new: NewOrder, status: OrderStatus, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, session_id: new.session_id, customer: new.customer, total: new.total.amount(), status, items: new.items, created_at, updated_at, events: vec![] }
    }

    /// A freshly stored order; raises `Created`.
    pub fn created(id: i64, new: NewOrder, at: DateTime<Utc>) -> Self {
        let mut order = Self::from_parts(id, new, OrderStatus::Pending, at, at);
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, total: order.total, lines: order.items.len() }));
        order
    }

    pub fn id(&self) -> i64 { self.id }
    pub fn customer(&self) -> &CustomerDetails { &self.customer }
    /// Whether `session_id` is the session that placed the order.
    pub fn placed_by(&self, session_id: &str) -> bool { !self.session_id.is_empty() && self.session_id == session_id }
    pub fn total(&self) -> Money { Money::new(self.total) }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[CartLineView] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Moves to `next`. Cancelled orders stay cancelled and delivered ones
    /// cannot be cancelled; setting the current status is a no-op.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if next == self.status { return Ok(()); }
        match (self.status, next) {
            (OrderStatus::Cancelled, _) => return Err(OrderError::CannotLeaveCancelled),
            (OrderStatus::Delivered, OrderStatus::Cancelled) => return Err(OrderError::CannotCancelDelivered),
            _ => {}
        }
        let from = self.status;
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, CannotLeaveCancelled, CannotCancelDelivered }
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::CannotLeaveCancelled => write!(f, "Cancelled orders cannot change status"),
            Self::CannotCancelDelivered => write!(f, "Delivered orders cannot be cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Origin;

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Ana".into(),
            phone: Phone::new("11 3456-7890").unwrap(),
            email: None,
            delivery: DeliveryMode::Pickup,
            address: None,
            payment: PaymentMethod::Cash,
            comment: None,
        }
    }

    fn line() -> CartLineView {
        CartLineView {
            key: "XLS:1".into(),
            id: "1".into(),
            name: "Canela".into(),
            price: Decimal::new(2800, 0),
            quantity: 2,
            subtotal: Decimal::new(5600, 0),
            img: None,
            image_url: "/static/img/placeholder.svg".into(),
            origin: Origin::Spreadsheet,
        }
    }

    #[test]
    fn test_new_order_requires_items() {
        assert_eq!(NewOrder::from_cart("s1", customer(), vec![], Money::ZERO).unwrap_err(), OrderError::NoItems);
        assert!(NewOrder::from_cart("s1", customer(), vec![line()], Money::new(Decimal::new(5600, 0))).is_ok());
    }

    #[test]
    fn test_order_workflow() {
        let new = NewOrder::from_cart("s1", customer(), vec![line()], Money::new(Decimal::new(5600, 0))).unwrap();
        let mut order = Order::created(1, new, Utc::now());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.take_events().len(), 1);

        order.transition_to(OrderStatus::Confirmed).unwrap();
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert_eq!(order.transition_to(OrderStatus::Cancelled), Err(OrderError::CannotCancelDelivered));
        order.transition_to(OrderStatus::Pending).unwrap();
        order.transition_to(OrderStatus::Cancelled).unwrap();
        assert_eq!(order.transition_to(OrderStatus::Confirmed), Err(OrderError::CannotLeaveCancelled));
        assert!(order.transition_to(OrderStatus::Cancelled).is_ok());
        assert_eq!(order.take_events().len(), 4);
    }

    #[test]
    fn test_enum_tokens() {
        assert_eq!("envio".parse::<DeliveryMode>().unwrap(), DeliveryMode::Delivery);
        assert_eq!("PICKUP".parse::<DeliveryMode>().unwrap(), DeliveryMode::Pickup);
        assert_eq!("mercadopago".parse::<PaymentMethod>().unwrap(), PaymentMethod::OnlinePayment);
        assert_eq!("bank-transfer".parse::<PaymentMethod>().unwrap(), PaymentMethod::BankTransfer);
        assert_eq!("cancelled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert_eq!(PaymentMethod::Cash.label(), "Efectivo");
    }

    #[test]
    fn test_serialized_shape() {
        let new = NewOrder::from_cart("s1", customer(), vec![line()], Money::new(Decimal::new(5600, 0))).unwrap();
        let order = Order::created(9, new, Utc::now());
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["name"], "Ana");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["delivery"], "PICKUP");
        assert_eq!(json["items"][0]["key"], "XLS:1");
        assert!(json.get("events").is_none());
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_placed_by_matches_only_the_ordering_session() {
        let new = NewOrder::from_cart("s1", customer(), vec![line()], Money::new(Decimal::new(5600, 0))).unwrap();
        let order = Order::created(3, new, Utc::now());
        assert!(order.placed_by("s1"));
        assert!(!order.placed_by("s2"));
        assert!(!order.placed_by(""));
    }
}
