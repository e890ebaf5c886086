//! Checkout: the customer form and the outbound WhatsApp message.

pub mod form;
pub mod message;

pub use form::CheckoutForm;
pub use message::{build_message, whatsapp_url};
