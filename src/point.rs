//! Data points for the line protocol write path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Time unit of a timestamp and of a write request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    /// Nanoseconds.
    #[default]
    #[serde(rename = "ns", alias = "n")]
    Nanoseconds,
    /// Microseconds.
    #[serde(rename = "us", alias = "u")]
    Microseconds,
    /// Milliseconds.
    #[serde(rename = "ms")]
    Milliseconds,
    /// Seconds.
    #[serde(rename = "s")]
    Seconds,
    /// Minutes.
    #[serde(rename = "m")]
    Minutes,
    /// Hours.
    #[serde(rename = "h")]
    Hours,
}

impl Precision {
    /// Number of nanoseconds in one unit.
    pub fn nanos(self) -> i128 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60_000_000_000,
            Precision::Hours => 3_600_000_000_000,
        }
    }

    /// Value of the `precision` query parameter of the `/write` endpoint.
    pub fn as_query_param(self) -> &'static str {
        match self {
            Precision::Nanoseconds => "n",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    /// Converts `value` expressed in `self` into `target` units.
    ///
    /// Conversion to a coarser unit truncates toward zero. Results outside the
    /// `i64` range saturate.
    pub fn convert(self, value: i64, target: Precision) -> i64 {
        let converted = i128::from(value) * self.nanos() / target.nanos();
        converted.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "ns" | "n" => Ok(Self::Nanoseconds),
            "us" | "u" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            "m" => Ok(Self::Minutes),
            "h" => Ok(Self::Hours),
            _ => Err(Error::Config(format!("unknown precision '{}'", input))),
        }
    }
}

/// Timestamp attached to a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp {
    /// Time since the Unix epoch, in `precision` units.
    pub value: i64,
    /// Unit of `value`.
    pub precision: Precision,
}

impl Timestamp {
    /// Create a timestamp.
    pub fn new(value: i64, precision: Precision) -> Self {
        Self { value, precision }
    }

    /// Timestamp in the requested precision, truncated.
    pub fn to_precision(self, precision: Precision) -> i64 {
        self.precision.convert(self.value, precision)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(t: DateTime<Tz>) -> Self {
        match t.timestamp_nanos_opt() {
            Some(nanos) => Self::new(nanos, Precision::Nanoseconds),
            None => Self::new(t.timestamp_micros(), Precision::Microseconds),
        }
    }
}

/// Value of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Boolean field.
    Bool(bool),
    /// Signed 64-bit integer field.
    Integer(i64),
    /// Unsigned 64-bit integer field.
    UnsignedInteger(u64),
    /// Floating point field.
    Float(f64),
    /// String field.
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::UnsignedInteger(u) => write!(f, "{}", u),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
        }
    }
}

macro_rules! field_value_from {
    ($($t:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::$variant(<$conv>::from(v))
                }
            }
        )*
    };
}

field_value_from!(
    bool => Bool as bool,
    i64 => Integer as i64,
    i32 => Integer as i64,
    i16 => Integer as i64,
    u64 => UnsignedInteger as u64,
    u32 => UnsignedInteger as u64,
    f64 => Float as f64,
    f32 => Float as f64,
    String => String as String,
    &str => String as String,
);

/// A single data point: measurement, tags, fields and an optional timestamp.
///
/// Tags and fields are kept in `BTreeMap`s so iteration is already in the
/// byte-wise key order the line protocol expects.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<Timestamp>,
}

impl Point {
    /// Start building a point for `measurement`.
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tag set, sorted by key.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Field set, sorted by key.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Timestamp, `None` when the server assigns one.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Encode this point as one line protocol line.
    pub fn to_line_protocol(&self, precision: Precision) -> Result<String> {
        crate::line_protocol::encode(self, precision)
    }
}

/// Builder for [`Point`]. Validation happens in [`PointBuilder::build`].
#[derive(Clone, Debug)]
pub struct PointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<Timestamp>,
}

impl PointBuilder {
    /// Add a tag. A repeated key replaces the previous value.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add several tags at once.
    pub fn tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a field. A repeated key replaces the previous value.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the timestamp in the given precision.
    pub fn timestamp(mut self, value: i64, precision: Precision) -> Self {
        self.timestamp = Some(Timestamp::new(value, precision));
        self
    }

    /// Set the timestamp from a date time.
    pub fn time<Tz: TimeZone>(mut self, time: DateTime<Tz>) -> Self {
        self.timestamp = Some(Timestamp::from(time));
        self
    }

    /// Validate and build the point.
    pub fn build(self) -> Result<Point> {
        if self.measurement.is_empty() {
            return Err(Error::InvalidPoint("measurement must not be empty".into()));
        }
        if self.fields.is_empty() {
            return Err(Error::InvalidPoint(format!(
                "point '{}' has no fields",
                self.measurement
            )));
        }
        if self.tags.keys().any(|k| k.is_empty()) {
            return Err(Error::InvalidPoint(format!(
                "point '{}' has an empty tag key",
                self.measurement
            )));
        }
        if self.fields.keys().any(|k| k.is_empty()) {
            return Err(Error::InvalidPoint(format!(
                "point '{}' has an empty field key",
                self.measurement
            )));
        }
        Ok(Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp,
        })
    }
}

/// Conversion of a caller's own type into a [`Point`].
///
/// ```
/// use influxdb_lineflux::{Point, Precision, Result, ToPoint};
///
/// struct Reading {
///     sensor: String,
///     celsius: f64,
///     at_ms: i64,
/// }
///
/// impl ToPoint for Reading {
///     fn to_point(&self) -> Result<Point> {
///         Point::builder("temperature")
///             .tag("sensor", self.sensor.as_str())
///             .field("celsius", self.celsius)
///             .timestamp(self.at_ms, Precision::Milliseconds)
///             .build()
///     }
/// }
/// ```
pub trait ToPoint {
    /// Build the point for this value.
    fn to_point(&self) -> Result<Point>;
}

impl ToPoint for Point {
    fn to_point(&self) -> Result<Point> {
        Ok(self.clone())
    }
}
