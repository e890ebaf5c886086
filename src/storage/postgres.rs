//! Postgres stores (runtime-checked queries, schema in `migrations/`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

use super::{OrderStore, ProductStore, SessionStore};
use crate::domain::aggregates::{CartLineView, CustomerDetails, NewOrder, Order, OrderStatus, Product};
use crate::domain::value_objects::{Money, Phone};
use crate::{Result, StorefrontError};

const ORDER_COLUMNS: &str =
    "id, session_id, name, phone, email, delivery, address, payment, comment, total, status, items, created_at, updated_at";

#[derive(Clone)]
pub struct PgProductStore { pool: PgPool }

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn active_products(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE active ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn product(&self, id: i64) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    session_id: String,
    name: String,
    phone: String,
    email: Option<String>,
    delivery: String,
    address: Option<String>,
    payment: String,
    comment: Option<String>,
    total: Decimal,
    status: String,
    items: Json<Vec<CartLineView>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn decode<E: std::error::Error + Send + Sync + 'static>(e: E) -> StorefrontError {
    StorefrontError::Database(sqlx::Error::Decode(Box::new(e)))
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        let customer = CustomerDetails {
            name: self.name,
            phone: Phone::new(&self.phone).map_err(decode)?,
            email: self.email,
            delivery: self.delivery.parse().map_err(decode)?,
            address: self.address,
            payment: self.payment.parse().map_err(decode)?,
            comment: self.comment,
        };
        let status: OrderStatus = self.status.parse().map_err(decode)?;
        let new = NewOrder { session_id: self.session_id, customer, items: self.items.0, total: Money::new(self.total) };
        Ok(Order::from_parts(self.id, new, status, self.created_at, self.updated_at))
    }
}

#[derive(Clone)]
pub struct PgOrderStore { pool: PgPool }

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let c = &order.customer;
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO orders (session_id, name, phone, email, delivery, address, payment, comment, total, status, items) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id, created_at",
        )
        .bind(&order.session_id)
        .bind(&c.name)
        .bind(c.phone.as_str())
        .bind(&c.email)
        .bind(c.delivery.as_str())
        .bind(&c.address)
        .bind(c.payment.as_str())
        .bind(&c.comment)
        .bind(order.total.amount())
        .bind(OrderStatus::Pending.as_str())
        .bind(Json(&order.items))
        .fetch_one(&self.pool)
        .await?;
        Ok(Order::created(id, order, created_at))
    }

    async fn order(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order> {
        let mut order = self.order(id).await?.ok_or(StorefrontError::OrderNotFound)?;
        let previous = order.status();
        order.transition_to(status)?;
        if order.status() != previous {
            let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4")
                .bind(id)
                .bind(order.status().as_str())
                .bind(order.updated_at())
                .bind(previous.as_str())
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                warn!(order_id = id, from = previous.as_str(), to = status.as_str(), "order status changed concurrently");
                return Err(StorefrontError::ConcurrentUpdate);
            }
        }
        Ok(order)
    }
}

#[derive(Clone)]
pub struct PgSessionStore { pool: PgPool, ttl: Duration }

impl PgSessionStore {
    pub fn new(pool: PgPool, ttl: Duration) -> Self { Self { pool, ttl } }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let row: Option<(Json<Value>,)> = sqlx::query_as(
            "SELECT data FROM sessions \
             WHERE session_id = $1 AND key = $2 AND updated_at > NOW() - make_interval(secs => $3)",
        )
        .bind(session_id)
        .bind(key)
        .bind(self.ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(data,)| data.0))
    }

    async fn save(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, key, data, updated_at) VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (session_id, key) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(session_id)
        .bind(key)
        .bind(Json(value))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE updated_at <= NOW() - make_interval(secs => $1)")
            .bind(self.ttl.as_secs_f64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
