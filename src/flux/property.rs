//! Operator properties and their literal forms.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::escape;
use crate::value::Value;

/// Unit of a Flux duration literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// `ns`
    Nanos,
    /// `us`
    Micros,
    /// `ms`
    Millis,
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// Twelve hours, written as hours.
    HalfDays,
    /// `d`
    Days,
    /// `w`
    Weeks,
}

/// A duration literal such as `-1h` or `30s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FluxDuration {
    /// Signed amount.
    pub amount: i64,
    /// Unit of `amount`.
    pub unit: TimeUnit,
}

impl FluxDuration {
    /// Create a duration literal.
    pub fn new(amount: i64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    /// `amount` nanoseconds.
    pub fn nanos(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Nanos)
    }

    /// `amount` milliseconds.
    pub fn millis(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Millis)
    }

    /// `amount` seconds.
    pub fn seconds(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Seconds)
    }

    /// `amount` minutes.
    pub fn minutes(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Minutes)
    }

    /// `amount` hours.
    pub fn hours(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Hours)
    }

    /// `amount` days.
    pub fn days(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Days)
    }

    /// `amount` weeks.
    pub fn weeks(amount: i64) -> Self {
        Self::new(amount, TimeUnit::Weeks)
    }

    /// Amount and unit suffix as written in Flux. Half days become hours.
    pub fn normalized(&self) -> (i64, &'static str) {
        match self.unit {
            TimeUnit::Nanos => (self.amount, "ns"),
            TimeUnit::Micros => (self.amount, "us"),
            TimeUnit::Millis => (self.amount, "ms"),
            TimeUnit::Seconds => (self.amount, "s"),
            TimeUnit::Minutes => (self.amount, "m"),
            TimeUnit::Hours => (self.amount, "h"),
            TimeUnit::HalfDays => (self.amount.saturating_mul(12), "h"),
            TimeUnit::Days => (self.amount, "d"),
            TimeUnit::Weeks => (self.amount, "w"),
        }
    }
}

impl fmt::Display for FluxDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (amount, suffix) = self.normalized();
        write!(f, "{}{}", amount, suffix)
    }
}

/// A literal property value.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// A single value. `Value::Null` suppresses the property.
    Value(Value),
    /// `[a, b]`. Empty lists suppress the property.
    List(Vec<Value>),
    /// `{"k": v}`. Empty records suppress the property.
    Record(BTreeMap<String, Value>),
}

impl Literal {
    /// Append the literal; returns `false` if nothing was written.
    pub fn write(&self, buf: &mut String) -> bool {
        match self {
            Literal::Value(v) => v.write_flux_literal(buf),
            Literal::List(items) => {
                let items: Vec<&Value> = items.iter().filter(|v| !v.is_null()).collect();
                if items.is_empty() {
                    return false;
                }
                buf.push('[');
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    item.write_flux_literal(buf);
                }
                buf.push(']');
                true
            }
            Literal::Record(entries) => {
                let entries: Vec<(&String, &Value)> =
                    entries.iter().filter(|(_, v)| !v.is_null()).collect();
                if entries.is_empty() {
                    return false;
                }
                buf.push('{');
                for (i, (key, value)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    escape::write_string_value(buf, key);
                    buf.push_str(": ");
                    value.write_flux_literal(buf);
                }
                buf.push('}');
                true
            }
        }
    }
}

impl From<Value> for Literal {
    fn from(v: Value) -> Self {
        Literal::Value(v)
    }
}

impl From<Vec<Value>> for Literal {
    fn from(v: Vec<Value>) -> Self {
        Literal::List(v)
    }
}

impl From<Vec<String>> for Literal {
    fn from(v: Vec<String>) -> Self {
        Literal::List(v.into_iter().map(Value::String).collect())
    }
}

impl From<&[&str]> for Literal {
    fn from(v: &[&str]) -> Self {
        Literal::List(v.iter().map(|s| Value::from(*s)).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Literal {
    fn from(v: [&str; N]) -> Self {
        Literal::List(v.iter().map(|s| Value::from(*s)).collect())
    }
}

impl From<BTreeMap<String, Value>> for Literal {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Literal::Record(v)
    }
}

macro_rules! literal_from_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Literal {
                fn from(v: $t) -> Self {
                    Literal::Value(Value::from(v))
                }
            }

            impl From<$t> for Property {
                fn from(v: $t) -> Self {
                    Property::Literal(Literal::from(v))
                }
            }
        )*
    };
}

literal_from_scalar!(&str, String, i64, f64, bool);

impl<Tz: TimeZone> From<DateTime<Tz>> for Literal {
    fn from(v: DateTime<Tz>) -> Self {
        Literal::Value(Value::from(v))
    }
}

/// Where a property's value comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    /// Fixed value.
    Literal(Literal),
    /// Named parameter, looked up when the query is printed.
    Parameter(String),
    /// Duration literal.
    Duration(FluxDuration),
    /// Flux expression written verbatim, e.g. a function.
    Expression(String),
}

impl Property {
    /// Reference to a named parameter.
    pub fn parameter(name: impl Into<String>) -> Self {
        Property::Parameter(name.into())
    }

    /// Verbatim Flux expression.
    pub fn expression(expr: impl Into<String>) -> Self {
        Property::Expression(expr.into())
    }

    /// Append the resolved property; returns `Ok(false)` when it resolves to
    /// nothing and must be omitted.
    pub fn write(&self, buf: &mut String, params: &Parameters) -> Result<bool> {
        match self {
            Property::Literal(literal) => Ok(literal.write(buf)),
            Property::Parameter(name) => match params.get(name) {
                Some(literal) => Ok(literal.write(buf)),
                None => Err(Error::UnboundParameter(name.clone())),
            },
            Property::Duration(d) => {
                let (amount, suffix) = d.normalized();
                escape::write_integer(buf, amount);
                buf.push_str(suffix);
                Ok(true)
            }
            Property::Expression(expr) => {
                if expr.is_empty() {
                    return Ok(false);
                }
                buf.push_str(expr);
                Ok(true)
            }
        }
    }
}

impl From<Literal> for Property {
    fn from(v: Literal) -> Self {
        Property::Literal(v)
    }
}

impl From<Value> for Property {
    fn from(v: Value) -> Self {
        Property::Literal(Literal::Value(v))
    }
}

impl From<FluxDuration> for Property {
    fn from(v: FluxDuration) -> Self {
        Property::Duration(v)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Property {
    fn from(v: DateTime<Tz>) -> Self {
        Property::Literal(Literal::from(v))
    }
}

/// Named parameter values bound at print time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters {
    values: BTreeMap<String, Literal>,
}

impl Parameters {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous binding.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Bound value of `name`.
    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.values.get(name)
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(p: &Property, params: &Parameters) -> Result<Option<String>> {
        let mut s = String::new();
        Ok(p.write(&mut s, params)?.then_some(s))
    }

    #[test]
    fn test_duration_suffixes() {
        assert_eq!(FluxDuration::hours(-1).to_string(), "-1h");
        assert_eq!(FluxDuration::new(5, TimeUnit::Micros).to_string(), "5us");
        assert_eq!(FluxDuration::weeks(2).to_string(), "2w");
        assert_eq!(FluxDuration::new(3, TimeUnit::HalfDays).to_string(), "36h");
    }

    #[test]
    fn test_list_quotes_strings_only() {
        let p = Property::from(Literal::List(vec![Value::from("a"), Value::from(2i64)]));
        assert_eq!(render(&p, &Parameters::new()).unwrap().unwrap(), "[\"a\", 2]");
    }

    #[test]
    fn test_empty_collections_are_omitted() {
        let empty: Vec<String> = Vec::new();
        let p = Property::from(Literal::from(empty));
        assert_eq!(render(&p, &Parameters::new()).unwrap(), None);

        let p = Property::from(Literal::Record(BTreeMap::new()));
        assert_eq!(render(&p, &Parameters::new()).unwrap(), None);

        let mut nulls = BTreeMap::new();
        nulls.insert("host".to_string(), Value::Null);
        let p = Property::from(Literal::Record(nulls));
        assert_eq!(render(&p, &Parameters::new()).unwrap(), None);

        let p = Property::from(Value::Null);
        assert_eq!(render(&p, &Parameters::new()).unwrap(), None);
    }

    #[test]
    fn test_record_literal() {
        let mut columns = BTreeMap::new();
        columns.insert("host".to_string(), Value::from("server"));
        let p = Property::from(Literal::Record(columns));
        assert_eq!(
            render(&p, &Parameters::new()).unwrap().unwrap(),
            "{\"host\": \"server\"}"
        );
    }

    #[test]
    fn test_parameter_resolution() {
        let p = Property::parameter("bucket");
        let params = Parameters::new().bind("bucket", "my-bucket");
        assert_eq!(render(&p, &params).unwrap().unwrap(), "\"my-bucket\"");

        let err = render(&p, &Parameters::new()).unwrap_err();
        assert!(matches!(err, Error::UnboundParameter(name) if name == "bucket"));
    }
}
