//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which backing source an item came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "DB")]
    Database,
    #[serde(rename = "XLS", alias = "X")]
    Spreadsheet,
}

impl Origin {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Database => "DB",
            Self::Spreadsheet => "XLS",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.tag()) }
}

impl FromStr for Origin {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DB" => Ok(Self::Database),
            "XLS" | "X" => Ok(Self::Spreadsheet),
            _ => Err(KeyError::UnknownOrigin(s.to_string())),
        }
    }
}

/// Identifier of a catalog item or cart line, namespaced by origin so a
/// database id `7` and spreadsheet row `7` never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub origin: Origin,
    pub id: String,
}

impl ItemKey {
    pub fn new(origin: Origin, id: impl Into<String>) -> Self {
        Self { origin, id: id.into().trim().to_string() }
    }
    pub fn database(id: i64) -> Self { Self::new(Origin::Database, id.to_string()) }
    pub fn spreadsheet(index: usize) -> Self { Self::new(Origin::Spreadsheet, index.to_string()) }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.origin, self.id) }
}

impl FromStr for ItemKey {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (origin, id) = s.split_once(':').ok_or_else(|| KeyError::Malformed(s.to_string()))?;
        if id.trim().is_empty() { return Err(KeyError::Malformed(s.to_string())); }
        Ok(Self::new(origin.parse()?, id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum KeyError { UnknownOrigin(String), Malformed(String) }
impl std::error::Error for KeyError {}
impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOrigin(o) => write!(f, "unknown origin {o:?}"),
            Self::Malformed(k) => write!(f, "malformed item key {k:?}"),
        }
    }
}

/// Money value object. Amounts are exact decimals, never floats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).map(Money).ok_or(MoneyError::Overflow)
    }
    pub fn checked_multiply(&self, qty: u32) -> Result<Money, MoneyError> {
        self.0.checked_mul(Decimal::from(qty)).map(Money).ok_or(MoneyError::Overflow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)] pub enum MoneyError { Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "amount out of range") }
}

/// Renders the whole-peso part with `.` as thousands separator: `$ 12.345`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0.trunc().to_i128().unwrap_or(0);
        let digits = whole.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 { grouped.push('.'); }
            grouped.push(c);
        }
        let sign = if whole < 0 { "-" } else { "" };
        write!(f, "$ {sign}{grouped}")
    }
}

/// Parses a price typed by a person: `1.234,56`, `2.800`, `$ 2800`, `199.99`.
/// Blank or unparseable input is zero. A leading `-` is kept so callers can
/// reject negative amounts.
pub fn parse_price(raw: &str) -> Decimal {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() { return Decimal::ZERO; }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(&cleaned) {
        cleaned.replace('.', "")
    } else {
        cleaned
    };
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

fn is_thousands_grouped(s: &str) -> bool {
    let mut parts = s.split('.');
    let head = parts.next().unwrap_or_default();
    let tail: Vec<&str> = parts.collect();
    !tail.is_empty() && !head.is_empty() && head.len() <= 3 && tail.iter().all(|p| p.len() == 3)
}

/// Customer phone number kept as digits only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone(String);

impl Phone {
    pub const MIN_DIGITS: usize = 8;
    pub const MAX_DIGITS: usize = 13;

    pub fn new(raw: &str) -> Result<Self, PhoneError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < Self::MIN_DIGITS { return Err(PhoneError::TooShort); }
        if digits.len() > Self::MAX_DIGITS { return Err(PhoneError::TooLong); }
        Ok(Self(digits))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn international(&self, country_code: &str) -> String { international_mobile(&self.0, country_code) }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PhoneError { TooShort, TooLong }
impl std::error::Error for PhoneError {}
impl fmt::Display for PhoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "phone number needs at least {} digits", Phone::MIN_DIGITS),
            Self::TooLong => write!(f, "phone number has more than {} digits", Phone::MAX_DIGITS),
        }
    }
}

/// Canonical mobile number for messaging links, `<cc>9<area><number>`.
///
/// Accepts the usual local spellings (`011 15-3456-7890`, `11 3456-7890`,
/// `+54 9 11 3456 7890`) and maps them all to the same digits.
pub fn international_mobile(raw: &str, country_code: &str) -> String {
    let mut d: String = raw.chars().filter(char::is_ascii_digit).collect();
    if d.is_empty() { return String::new(); }
    let cc: String = country_code.chars().filter(char::is_ascii_digit).collect();

    if !cc.is_empty() && d.starts_with(&cc) && d.len() >= cc.len() + 10 {
        d.drain(..cc.len());
    }
    if d.len() == 11 && d.starts_with('9') {
        d.remove(0);
    }
    if d.starts_with('0') {
        d.remove(0);
    }
    // "15" after a 2-4 digit area code marks a mobile in local dialing.
    if d.len() == 12 {
        if let Some(area) = (2..=4).find(|&a| &d[a..a + 2] == "15") {
            d.replace_range(area..area + 2, "");
        }
    }
    format!("{cc}9{d}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_roundtrip_and_namespacing() {
        let db = ItemKey::database(7);
        let xls = ItemKey::spreadsheet(7);
        assert_ne!(db, xls);
        assert_eq!(db.to_string(), "DB:7");
        assert_eq!("XLS:7".parse::<ItemKey>().unwrap(), xls);
        assert_eq!("x:7".parse::<ItemKey>().unwrap(), xls);
        assert!("7".parse::<ItemKey>().is_err());
        assert!("FOO:7".parse::<ItemKey>().is_err());
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(Decimal::new(1234567, 2)).to_string(), "$ 12.345");
        assert_eq!(Money::new(Decimal::new(2800, 0)).to_string(), "$ 2.800");
        assert_eq!(Money::new(Decimal::new(999, 0)).to_string(), "$ 999");
        assert_eq!(Money::ZERO.to_string(), "$ 0");
        assert_eq!(Money::new(Decimal::new(1_000_000, 0)).to_string(), "$ 1.000.000");
    }

    #[test]
    fn test_money_exact_sum() {
        let line = Money::new(Decimal::new(19999, 2)).checked_multiply(3).unwrap();
        assert_eq!(line.amount(), Decimal::new(59997, 2));
        let total = line.checked_add(&Money::new(Decimal::new(1, 2))).unwrap();
        assert_eq!(total.amount(), Decimal::new(59998, 2));
    }

    #[test]
    fn test_money_overflow_is_an_error() {
        let huge = Money::new(parse_price("79228162514264337593543950335"));
        assert_eq!(huge.amount(), Decimal::MAX);
        assert_eq!(huge.checked_multiply(2), Err(MoneyError::Overflow));
        assert_eq!(huge.checked_add(&Money::new(Decimal::ONE)), Err(MoneyError::Overflow));
        assert_eq!(huge.checked_multiply(1), Ok(huge));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("1.234,56"), Decimal::new(123456, 2));
        assert_eq!(parse_price("2.800"), Decimal::new(2800, 0));
        assert_eq!(parse_price("$ 2800"), Decimal::new(2800, 0));
        assert_eq!(parse_price("199.99"), Decimal::new(19999, 2));
        assert_eq!(parse_price(""), Decimal::ZERO);
        assert_eq!(parse_price("consultar"), Decimal::ZERO);
        assert_eq!(parse_price("-5000"), Decimal::new(-5000, 0));
    }

    #[test]
    fn test_phone_bounds() {
        assert_eq!(Phone::new("11 3456-7890").unwrap().as_str(), "1134567890");
        assert_eq!(Phone::new("1234567"), Err(PhoneError::TooShort));
        assert_eq!(Phone::new("12345678901234"), Err(PhoneError::TooLong));
    }

    #[test]
    fn test_international_mobile_local_spellings_agree() {
        let expected = "5491134567890";
        assert_eq!(international_mobile("011 15-3456-7890", "54"), expected);
        assert_eq!(international_mobile("1134567890", "54"), expected);
        assert_eq!(international_mobile("+54 9 11 3456-7890", "54"), expected);
        assert_eq!(international_mobile("54 11 3456 7890", "54"), expected);
        assert_eq!(international_mobile("0351 15 512-3456", "54"), "5493515123456");
    }
}
