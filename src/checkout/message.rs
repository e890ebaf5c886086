//! Order summary text and the wa.me link carrying it.

use crate::domain::aggregates::{CartLineView, CustomerDetails, DeliveryMode};
use crate::domain::value_objects::Money;

const WHATSAPP_BASE: &str = "https://wa.me/";

/// Renders cart lines, the total and, after the checkout form, the
/// customer block. `order_id` is only known on the confirmation view.
pub fn build_message(
    lines: &[CartLineView],
    total: Money,
    customer: Option<&CustomerDetails>,
    order_id: Option<i64>,
    country_code: &str,
) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 12);
    out.push(match order_id {
        Some(id) => format!("🛒 *Nuevo pedido #{id}*"),
        None => "🛒 *Nuevo pedido*".to_string(),
    });
    out.push(String::new());
    for line in lines {
        let name = if line.name.trim().is_empty() { "Producto" } else { line.name.as_str() };
        out.push(format!(
            "- {} × {} = {} → {}",
            line.quantity,
            name,
            Money::new(line.price),
            Money::new(line.subtotal)
        ));
    }
    out.push(String::new());
    out.push(format!("Total: {total}"));

    if let Some(c) = customer {
        out.push(String::new());
        out.push("👤 *Datos del cliente*".to_string());
        if !c.name.is_empty() {
            out.push(format!("• Nombre: {}", c.name));
        }
        out.push(format!("• Teléfono: +{}", c.phone.international(country_code)));
        if let Some(email) = &c.email {
            out.push(format!("• Email: {email}"));
        }
        out.push(format!("• Modalidad: {}", c.delivery.label()));
        if c.delivery == DeliveryMode::Delivery {
            if let Some(address) = &c.address {
                out.push(format!("• Dirección: {address}"));
            }
        }
        out.push(format!("• Medio de pago: {}", c.payment.label()));
        if let Some(comment) = &c.comment {
            out.push(format!("• Comentario: {comment}"));
        }
    }

    out.push(String::new());
    out.push("¿Podemos coordinar entrega/pago? 🙌".to_string());
    out.join("\n")
}

/// Link that opens a chat with the store, or lets the customer pick a
/// contact when no store number is configured.
pub fn whatsapp_url(store_phone: &str, message: &str) -> String {
    let phone: String = store_phone.chars().filter(char::is_ascii_digit).collect();
    format!("{WHATSAPP_BASE}{phone}?text={}", urlencoding::encode(message))
}
