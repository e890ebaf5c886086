//! Storefront service
//!
//! Sells a catalog assembled from two places: products stored in Postgres
//! and a spreadsheet export that is edited by hand and dropped next to a
//! folder of product photos.
//!
//! ## Features
//! - Catalog reconciliation (spreadsheet rows, database products, images)
//! - Session-backed shopping cart for items of either origin
//! - Checkout form that records an order and hands off to WhatsApp
//! - Order status management

use std::collections::BTreeMap;

use thiserror::Error;

pub mod catalog;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod routes;
pub mod storage;

pub use catalog::{CatalogItem, ImageRef};
pub use config::Config;
pub use domain::value_objects::{ItemKey, Money, Origin};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid status transition: {0}")]
    InvalidStatusTransition(domain::aggregates::OrderError),

    #[error("Order was modified concurrently")]
    ConcurrentUpdate,

    #[error("Validation failed")]
    Validation(BTreeMap<String, Vec<String>>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorefrontError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }
}

impl From<domain::aggregates::OrderError> for StorefrontError {
    fn from(e: domain::aggregates::OrderError) -> Self {
        match e {
            domain::aggregates::OrderError::NoItems => Self::EmptyCart,
            other => Self::InvalidStatusTransition(other),
        }
    }
}

impl From<domain::aggregates::CartError> for StorefrontError {
    fn from(e: domain::aggregates::CartError) -> Self {
        use domain::aggregates::CartError;
        match e {
            CartError::QuantityTooLarge => Self::field(
                "quantity",
                format!("La cantidad por producto no puede superar {}.", domain::aggregates::cart::MAX_LINE_QUANTITY),
            ),
            CartError::NegativePrice => Self::field("price", "El precio no puede ser negativo."),
            CartError::PriceTooLarge => Self::field("price", "El precio es demasiado alto."),
        }
    }
}

impl From<domain::value_objects::MoneyError> for StorefrontError {
    fn from(_: domain::value_objects::MoneyError) -> Self {
        Self::field("total", "El importe del carrito es demasiado alto.")
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
