//! In-memory stores.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{OrderStore, ProductStore, SessionStore, DEFAULT_SESSION_TTL};
use crate::domain::aggregates::{NewOrder, Order, OrderStatus, Product};
use crate::{Result, StorefrontError};

#[derive(Default)]
pub struct MemoryProductStore {
    products: RwLock<Vec<Product>>,
}

impl MemoryProductStore {
    pub fn new(products: Vec<Product>) -> Self { Self { products: RwLock::new(products) } }

    pub async fn insert(&self, product: Product) {
        let mut products = self.products.write().await;
        products.retain(|p| p.id != product.id);
        products.push(product);
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn active_products(&self) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut active: Vec<Product> = products.iter().filter(|p| p.active).cloned().collect();
        active.sort_by_key(|p| p.name.to_lowercase());
        Ok(active)
    }

    async fn product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.products.read().await.iter().find(|p| p.id == id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<Vec<Order>>,
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let id = orders.iter().map(Order::id).max().unwrap_or(0) + 1;
        let created = Order::created(id, order, Utc::now());
        let mut stored = created.clone();
        stored.take_events();
        orders.push(stored);
        Ok(created)
    }

    async fn order(&self, id: i64) -> Result<Option<Order>> {
        Ok(self.orders.read().await.iter().find(|o| o.id() == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let mut orders = self.orders.read().await.clone();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(orders)
    }

    async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders.iter_mut().find(|o| o.id() == id).ok_or(StorefrontError::OrderNotFound)?;
        order.transition_to(status)?;
        let updated = order.clone();
        order.take_events();
        Ok(updated)
    }
}

struct SessionEntry {
    value: Value,
    saved_at: Instant,
}

pub struct MemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<(String, String), SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self { Self { ttl, sessions: RwLock::new(HashMap::new()) } }
}

impl Default for MemorySessionStore {
    fn default() -> Self { Self::new(DEFAULT_SESSION_TTL) }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&(session_id.to_string(), key.to_string()));
        Ok(entry.filter(|e| e.saved_at.elapsed() <= self.ttl).map(|e| e.value.clone()))
    }

    async fn save(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        let entry = SessionEntry { value, saved_at: Instant::now() };
        self.sessions.write().await.insert((session_id.to_string(), key.to_string()), entry);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| e.saved_at.elapsed() <= self.ttl);
        Ok((before - sessions.len()) as u64)
    }
}
