//! The closed set of basic item value types.
//!
//! Every item of an [`ItemCollection`](super::ItemCollection) holds a list
//! of `ItemValue`s. The enum is deliberately closed: anything an
//! application wants to store must be expressed in these variants, which is
//! what keeps documents serializable and deep-clonable by a plain
//! structural walk (`Clone` on this type owns the full graph).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single typed value stored inside an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemValue {
    Text(String),
    Integer(i64),
    Double(f64),
    Decimal(Decimal),
    Bool(bool),
    /// An absolute instant. Calendar and local date/time inputs are
    /// normalized to an instant on write, see the `From` impls below.
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    List(Vec<ItemValue>),
    /// A nested mapping following the same key → value-list shape as the
    /// surrounding document.
    Map(BTreeMap<String, Vec<ItemValue>>),
}

impl ItemValue {
    /// Renders the value as a display string. Collections render as their
    /// JSON form; this mirrors what templates and history entries expect.
    pub fn to_text(&self) -> String {
        match self {
            ItemValue::Text(s) => s.clone(),
            ItemValue::Integer(i) => i.to_string(),
            ItemValue::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() {
                    format!("{:.1}", d)
                } else {
                    d.to_string()
                }
            }
            ItemValue::Decimal(d) => d.to_string(),
            ItemValue::Bool(b) => b.to_string(),
            ItemValue::Date(d) => d.to_rfc3339(),
            ItemValue::Bytes(b) => format!("<{} bytes>", b.len()),
            ItemValue::List(_) | ItemValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Integer coercion. Conversions that would lose information return
    /// `None` (a double with a fractional part, an unparsable string).
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            ItemValue::Integer(i) => Some(*i),
            ItemValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            ItemValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            ItemValue::Bool(b) => Some(i64::from(*b)),
            ItemValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point coercion.
    pub fn to_double(&self) -> Option<f64> {
        match self {
            ItemValue::Double(d) => Some(*d),
            ItemValue::Integer(i) => Some(*i as f64),
            ItemValue::Decimal(d) => d.to_f64(),
            ItemValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Decimal coercion.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            ItemValue::Decimal(d) => Some(*d),
            ItemValue::Integer(i) => Some(Decimal::from(*i)),
            ItemValue::Double(d) => Decimal::from_f64_retain(*d),
            ItemValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean coercion: `"true"` / `"false"` strings and the numeric
    /// zero/non-zero convention are accepted.
    pub fn to_boolean(&self) -> Option<bool> {
        match self {
            ItemValue::Bool(b) => Some(*b),
            ItemValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            ItemValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Date coercion; RFC 3339 strings are accepted.
    pub fn to_date(&self) -> Option<DateTime<Utc>> {
        match self {
            ItemValue::Date(d) => Some(*d),
            ItemValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ItemValue::Integer(_) | ItemValue::Double(_) | ItemValue::Decimal(_)
        )
    }

    pub fn is_date(&self) -> bool {
        matches!(self, ItemValue::Date(_))
    }

    /// True for the empty string; used by `is_item_empty`.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, ItemValue::Text(s) if s.is_empty())
    }

    /// Converts a JSON value into an `ItemValue`. `null` is not a basic
    /// type and is rejected with `None` so callers can drop it.
    pub fn from_json(value: &serde_json::Value) -> Option<ItemValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(ItemValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ItemValue::Integer(i))
                } else {
                    n.as_f64().map(ItemValue::Double)
                }
            }
            serde_json::Value::String(s) => Some(ItemValue::Text(s.clone())),
            serde_json::Value::Array(values) => Some(ItemValue::List(
                values.iter().filter_map(ItemValue::from_json).collect(),
            )),
            serde_json::Value::Object(map) => {
                let mut result = BTreeMap::new();
                for (key, value) in map {
                    let list = match value {
                        serde_json::Value::Array(values) => {
                            values.iter().filter_map(ItemValue::from_json).collect()
                        }
                        other => ItemValue::from_json(other).into_iter().collect(),
                    };
                    result.insert(key.to_lowercase(), list);
                }
                Some(ItemValue::Map(result))
            }
        }
    }
}

impl From<&str> for ItemValue {
    fn from(value: &str) -> Self {
        ItemValue::Text(value.to_string())
    }
}

impl From<String> for ItemValue {
    fn from(value: String) -> Self {
        ItemValue::Text(value)
    }
}

impl From<i32> for ItemValue {
    fn from(value: i32) -> Self {
        ItemValue::Integer(i64::from(value))
    }
}

impl From<i64> for ItemValue {
    fn from(value: i64) -> Self {
        ItemValue::Integer(value)
    }
}

impl From<u32> for ItemValue {
    fn from(value: u32) -> Self {
        ItemValue::Integer(i64::from(value))
    }
}

impl From<f32> for ItemValue {
    fn from(value: f32) -> Self {
        ItemValue::Double(f64::from(value))
    }
}

impl From<f64> for ItemValue {
    fn from(value: f64) -> Self {
        ItemValue::Double(value)
    }
}

impl From<Decimal> for ItemValue {
    fn from(value: Decimal) -> Self {
        ItemValue::Decimal(value)
    }
}

impl From<bool> for ItemValue {
    fn from(value: bool) -> Self {
        ItemValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for ItemValue {
    fn from(value: DateTime<Utc>) -> Self {
        ItemValue::Date(value)
    }
}

/// Local dates normalize to midnight UTC.
impl From<NaiveDate> for ItemValue {
    fn from(value: NaiveDate) -> Self {
        let midnight = value.and_hms_opt(0, 0, 0).expect("midnight exists");
        ItemValue::Date(DateTime::from_naive_utc_and_offset(midnight, Utc))
    }
}

/// Local date-times are interpreted as UTC.
impl From<NaiveDateTime> for ItemValue {
    fn from(value: NaiveDateTime) -> Self {
        ItemValue::Date(DateTime::from_naive_utc_and_offset(value, Utc))
    }
}

impl From<Vec<u8>> for ItemValue {
    fn from(value: Vec<u8>) -> Self {
        ItemValue::Bytes(value)
    }
}

impl From<BTreeMap<String, Vec<ItemValue>>> for ItemValue {
    fn from(value: BTreeMap<String, Vec<ItemValue>>) -> Self {
        ItemValue::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coercion_rejects_loss() {
        assert_eq!(ItemValue::Double(42.0).to_integer(), Some(42));
        assert_eq!(ItemValue::Double(42.5).to_integer(), None);
        assert_eq!(ItemValue::Text("17".into()).to_integer(), Some(17));
        assert_eq!(ItemValue::Text("17.4".into()).to_integer(), None);
    }

    #[test]
    fn double_coercion() {
        assert_eq!(ItemValue::Integer(3).to_double(), Some(3.0));
        assert_eq!(ItemValue::Text(" 2.5 ".into()).to_double(), Some(2.5));
        assert_eq!(ItemValue::Bool(true).to_double(), None);
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(ItemValue::Text("TRUE".into()).to_boolean(), Some(true));
        assert_eq!(ItemValue::Integer(0).to_boolean(), Some(false));
        assert_eq!(ItemValue::Text("yes".into()).to_boolean(), None);
    }

    #[test]
    fn local_date_normalizes_to_instant() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let value: ItemValue = date.into();
        let instant = value.to_date().unwrap();
        assert_eq!(instant.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn json_null_is_rejected() {
        assert_eq!(ItemValue::from_json(&serde_json::Value::Null), None);
        let arr = serde_json::json!([1, null, "x"]);
        let value = ItemValue::from_json(&arr).unwrap();
        match value {
            ItemValue::List(values) => assert_eq!(values.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn clone_is_deep() {
        let mut inner = BTreeMap::new();
        inner.insert("a".to_string(), vec![ItemValue::Integer(1)]);
        let original = ItemValue::Map(inner);
        let mut copy = original.clone();
        if let ItemValue::Map(map) = &mut copy {
            map.insert("b".to_string(), vec![ItemValue::Integer(2)]);
        }
        if let ItemValue::Map(map) = &original {
            assert_eq!(map.len(), 1);
        }
    }
}
