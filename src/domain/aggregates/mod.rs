//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::Product;
pub use order::{CustomerDetails, DeliveryMode, NewOrder, Order, OrderError, OrderStatus, PaymentMethod};
pub use cart::{Cart, CartError, CartLine, CartLineView, CartSummary, ImageContext, SpreadsheetPayload};
