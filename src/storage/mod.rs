//! Persistence seams: products, orders and session data.
//!
//! Each store has a Postgres implementation and an in-memory one used when
//! no `DATABASE_URL` is configured and in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::aggregates::{NewOrder, Order, OrderStatus, Product};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryOrderStore, MemoryProductStore, MemorySessionStore};
pub use postgres::{PgOrderStore, PgProductStore, PgSessionStore};

/// Idle time after which session data is dropped (two weeks).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 3600);

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Active products, any stock level.
    async fn active_products(&self) -> Result<Vec<Product>>;
    async fn product(&self, id: i64) -> Result<Option<Product>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and returns it with its assigned id and a
    /// pending `Created` event.
    async fn create(&self, order: NewOrder) -> Result<Order>;
    async fn order(&self, id: i64) -> Result<Option<Order>>;
    /// Newest first.
    async fn list(&self) -> Result<Vec<Order>>;
    /// Applies a status transition; the returned order carries the event.
    /// Fails with `ConcurrentUpdate` when the stored status changed in the
    /// meantime.
    async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order>;
}

/// Session data expires once it has not been saved for the store's TTL.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `None` for unknown and expired entries alike.
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<Value>>;
    /// Stores the value and restarts its TTL.
    async fn save(&self, session_id: &str, key: &str, value: Value) -> Result<()>;
    /// Deletes expired entries, returning how many went.
    async fn purge_expired(&self) -> Result<u64>;
}
