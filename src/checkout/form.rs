//! Checkout form validation.

use std::collections::BTreeMap;

use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::domain::aggregates::{CustomerDetails, DeliveryMode, PaymentMethod};
use crate::domain::value_objects::{Phone, PhoneError};
use crate::StorefrontError;

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CheckoutForm {
    #[validate(length(min = 1, max = 120, message = "Ingresá tu nombre completo."))]
    pub name: String,
    #[validate(length(max = 30), custom = "validate_phone")]
    pub phone: String,
    #[validate(email(message = "Ingresá un email válido."))]
    pub email: Option<String>,
    #[validate(custom = "validate_delivery")]
    pub delivery: String,
    pub address: Option<String>,
    #[validate(custom = "validate_payment")]
    #[serde(default = "default_payment")]
    pub payment: String,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

fn default_payment() -> String { PaymentMethod::OnlinePayment.as_str().to_string() }

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    Phone::new(value).map(|_| ()).map_err(|e| {
        let mut err = ValidationError::new("phone");
        err.message = Some(match e {
            PhoneError::TooShort => "El teléfono debe tener al menos 8 dígitos.".into(),
            PhoneError::TooLong => "El teléfono no puede tener más de 13 dígitos.".into(),
        });
        err
    })
}

fn validate_delivery(value: &str) -> Result<(), ValidationError> {
    value.parse::<DeliveryMode>().map(|_| ()).map_err(|_| choice_error("delivery"))
}

fn validate_payment(value: &str) -> Result<(), ValidationError> {
    value.parse::<PaymentMethod>().map(|_| ()).map_err(|_| choice_error("payment"))
}

fn choice_error(code: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some("Elegí una opción válida.".into());
    err
}

fn blank_to_none(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl CheckoutForm {
    /// Validates every field and returns the customer details, or all
    /// field errors at once.
    pub fn into_customer(mut self) -> Result<CustomerDetails, StorefrontError> {
        self.email = blank_to_none(self.email.as_deref());
        self.address = blank_to_none(self.address.as_deref());
        self.comment = blank_to_none(self.comment.as_deref());
        self.name = self.name.trim().to_string();

        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Err(e) = self.validate() {
            for (field, list) in e.field_errors() {
                let messages = list.iter().map(|err| match &err.message {
                    Some(m) => m.to_string(),
                    None => format!("Valor inválido ({}).", err.code),
                });
                errors.entry(field.to_string()).or_default().extend(messages);
            }
        }

        let delivery = self.delivery.parse::<DeliveryMode>().ok();
        if delivery == Some(DeliveryMode::Delivery) && self.address.is_none() {
            errors.entry("address".into()).or_default().push("Ingresá la dirección completa para el envío.".into());
        }
        if !errors.is_empty() {
            return Err(StorefrontError::Validation(errors));
        }

        let (Some(delivery), Ok(payment), Ok(phone)) = (delivery, self.payment.parse::<PaymentMethod>(), Phone::new(&self.phone)) else {
            return Err(StorefrontError::field("form", "Formulario inválido."));
        };
        Ok(CustomerDetails {
            name: self.name,
            phone,
            email: self.email,
            delivery,
            address: if delivery == DeliveryMode::Delivery { self.address } else { None },
            payment,
            comment: self.comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> CheckoutForm {
        CheckoutForm {
            name: " Ana Pérez ".into(),
            phone: "011 15-3456-7890".into(),
            email: Some(String::new()),
            delivery: "retiro".into(),
            address: Some("Calle 123".into()),
            payment: "efectivo".into(),
            comment: Some("  ".into()),
        }
    }

    fn errors(result: Result<CustomerDetails, StorefrontError>) -> BTreeMap<String, Vec<String>> {
        match result {
            Err(StorefrontError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_pickup() {
        let customer = form().into_customer().unwrap();
        assert_eq!(customer.name, "Ana Pérez");
        assert_eq!(customer.phone.as_str(), "0111534567890");
        assert_eq!(customer.delivery, DeliveryMode::Pickup);
        assert_eq!(customer.address, None);
        assert_eq!(customer.email, None);
        assert_eq!(customer.comment, None);
        assert_eq!(customer.payment, PaymentMethod::Cash);
    }

    #[test]
    fn test_delivery_requires_address() {
        let mut f = form();
        f.delivery = "DELIVERY".into();
        f.address = Some("   ".into());
        let errors = errors(f.into_customer());
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["address"]);

        let mut f = form();
        f.delivery = "envio".into();
        assert_eq!(f.into_customer().unwrap().address.as_deref(), Some("Calle 123"));
    }

    #[test]
    fn test_bad_phone_and_choices() {
        let mut f = form();
        f.phone = "12-34".into();
        f.payment = "bitcoin".into();
        f.delivery = "drone".into();
        f.name = String::new();
        let errors = errors(f.into_customer());
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["delivery", "name", "payment", "phone"]);
        assert_eq!(errors["phone"], vec!["El teléfono debe tener al menos 8 dígitos."]);
    }

    #[test]
    fn test_invalid_email() {
        let mut f = form();
        f.email = Some("not-an-email".into());
        assert!(errors(f.into_customer()).contains_key("email"));
    }
}
