//! Typed values shared by the CSV decoder and the Flux query builder.

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};
use ordered_float::OrderedFloat;

use crate::escape;
use crate::point::FieldValue;

/// Represents a value in an InfluxDB Flux query result or query parameter.
///
/// This enum covers all data types that can appear in InfluxDB annotated CSV responses.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// String value.
    String(String),

    /// 64-bit floating point value.
    Double(OrderedFloat<f64>),

    /// Boolean value.
    Bool(bool),

    /// Signed 64-bit integer.
    Long(i64),

    /// Unsigned 64-bit integer.
    UnsignedLong(u64),

    /// Duration value (in nanoseconds, stored as chrono::Duration).
    Duration(chrono::Duration),

    /// Base64-encoded binary data.
    Base64Binary(Vec<u8>),

    /// RFC3339 timestamp with timezone.
    TimeRFC(DateTime<FixedOffset>),

    /// Null value.
    Null,
}

impl Value {
    /// Returns the value as a string reference if it is a `String` variant.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an owned string if it is a `String` variant.
    pub fn string(&self) -> Option<String> {
        self.as_string().map(str::to_owned)
    }

    /// Returns the value as a f64 if it is a `Double` variant.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    /// Returns the value as a bool if it is a `Bool` variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it is a `Long` variant.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a u64 if it is an `UnsignedLong` variant.
    pub fn as_unsigned_long(&self) -> Option<u64> {
        match self {
            Value::UnsignedLong(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns the value as a chrono::Duration if it is a `Duration` variant.
    pub fn as_duration(&self) -> Option<&chrono::Duration> {
        match self {
            Value::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the value as a byte slice if it is a `Base64Binary` variant.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Base64Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as a DateTime if it is a `TimeRFC` variant.
    pub fn as_time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::TimeRFC(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is what a line protocol field of `field` decodes to.
    ///
    /// Integers and floats compare across their CSV column types; floats are
    /// compared exactly since both sides use shortest round-trip formatting.
    pub fn matches_field(&self, field: &FieldValue) -> bool {
        match (self, field) {
            (Value::Bool(a), FieldValue::Bool(b)) => a == b,
            (Value::Long(a), FieldValue::Integer(b)) => a == b,
            (Value::UnsignedLong(a), FieldValue::UnsignedInteger(b)) => a == b,
            (Value::Double(a), FieldValue::Float(b)) => a.into_inner() == *b,
            (Value::String(a), FieldValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Append this value as a Flux literal. `Null` writes nothing and
    /// returns `false`.
    pub fn write_flux_literal(&self, buf: &mut String) -> bool {
        match self {
            Value::String(s) => escape::write_string_value(buf, s),
            Value::Double(d) => escape::write_float(buf, d.into_inner()),
            Value::Bool(b) => escape::write_bool(buf, *b),
            Value::Long(i) => escape::write_integer(buf, *i),
            Value::UnsignedLong(u) => {
                buf.push_str("uint(v: ");
                buf.push_str(&u.to_string());
                buf.push(')');
            }
            Value::Duration(d) => {
                buf.push_str(&d.num_nanoseconds().unwrap_or(i64::MAX).to_string());
                buf.push_str("ns");
            }
            Value::Base64Binary(b) => {
                buf.push_str("bytes(v: ");
                escape::write_string_value(buf, &String::from_utf8_lossy(b));
                buf.push(')');
            }
            Value::TimeRFC(t) => buf.push_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Null => return false,
        }
        true
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Double(d) => write!(f, "{}", d),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(i) => write!(f, "{}", i),
            Value::UnsignedLong(u) => write!(f, "{}", u),
            Value::Duration(d) => write!(f, "{}ns", d.num_nanoseconds().unwrap_or(0)),
            Value::Base64Binary(b) => write!(f, "<binary {} bytes>", b.len()),
            Value::TimeRFC(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Bool(b) => Value::Bool(b),
            FieldValue::Integer(i) => Value::Long(i),
            FieldValue::UnsignedInteger(u) => Value::UnsignedLong(u),
            FieldValue::Float(f) => Value::Double(OrderedFloat(f)),
            FieldValue::String(s) => Value::String(s),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(OrderedFloat(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::TimeRFC(v.fixed_offset())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(v: &Value) -> String {
        let mut s = String::new();
        v.write_flux_literal(&mut s);
        s
    }

    #[test]
    fn test_accessors_match_variant() {
        assert_eq!(Value::String("hello".into()).as_string(), Some("hello"));
        assert_eq!(Value::Double(OrderedFloat(2.72)).as_double(), Some(2.72));
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::Long(-100).as_long(), Some(-100));
        assert_eq!(Value::UnsignedLong(u64::MAX).as_unsigned_long(), Some(u64::MAX));
        assert_eq!(Value::Base64Binary(vec![1, 2]).as_binary(), Some(&[1u8, 2][..]));
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_accessors_reject_other_variants() {
        assert_eq!(Value::Long(42).as_string(), None);
        assert_eq!(Value::String("2.72".into()).as_double(), None);
        assert_eq!(Value::Long(1).as_bool(), None);
        assert_eq!(Value::UnsignedLong(42).as_long(), None);
        assert!(Value::Long(1000).as_duration().is_none());
        assert!(Value::String("2023-11-14".into()).as_time().is_none());
        assert!(!Value::Long(0).is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Long(-100).to_string(), "-100");
        assert_eq!(
            Value::Duration(chrono::Duration::nanoseconds(1_500_000_000)).to_string(),
            "1500000000ns"
        );
        assert_eq!(Value::Base64Binary(vec![1, 2, 3]).to_string(), "<binary 3 bytes>");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_flux_literals() {
        assert_eq!(literal(&Value::from("a \"b\"")), r#""a \"b\"""#);
        assert_eq!(literal(&Value::from(2.0)), "2.0");
        assert_eq!(literal(&Value::from(7i64)), "7");
        assert_eq!(literal(&Value::UnsignedLong(7)), "uint(v: 7)");
        assert_eq!(literal(&Value::from(true)), "true");
        let t = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z").unwrap();
        assert_eq!(literal(&Value::from(t)), "2020-01-01T00:00:00Z");
        assert_eq!(
            literal(&Value::Duration(chrono::Duration::seconds(2))),
            "2000000000ns"
        );
    }

    #[test]
    fn test_null_literal_writes_nothing() {
        let mut s = String::from("x");
        assert!(!Value::Null.write_flux_literal(&mut s));
        assert_eq!(s, "x");
    }

    #[test]
    fn test_matches_field() {
        assert!(Value::Long(3).matches_field(&FieldValue::Integer(3)));
        assert!(Value::from(21.5).matches_field(&FieldValue::Float(21.5)));
        assert!(!Value::Long(3).matches_field(&FieldValue::Float(3.0)));
        assert!(!Value::Null.matches_field(&FieldValue::Bool(false)));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }
}
