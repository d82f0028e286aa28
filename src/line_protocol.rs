//! Line protocol encoder.
//!
//! A line has the shape
//! `measurement[,tag=value]* field=value[,field=value]*[ timestamp]`. Tags and
//! fields are written in byte-wise key order, which the `BTreeMap`s in
//! [`Point`] already provide.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::escape;
use crate::point::{FieldValue, Point, Precision, Timestamp};

/// Encode one point as a single line, without a trailing newline.
pub fn encode(point: &Point, precision: Precision) -> Result<String> {
    let mut buf = String::with_capacity(64);
    write_point(&mut buf, point, precision)?;
    Ok(buf)
}

/// Append one encoded point to `buf`.
///
/// On error `buf` is restored to its previous length.
pub fn write_point(buf: &mut String, point: &Point, precision: Precision) -> Result<()> {
    let start = buf.len();
    write_series_key(buf, point.measurement(), point.tags());
    let result = write_fields_and_time(buf, point.fields(), point.timestamp(), precision);
    if result.is_err() {
        buf.truncate(start);
    }
    result.map_err(|e| match e {
        Error::InvalidPoint(msg) => {
            Error::InvalidPoint(format!("{} (measurement '{}')", msg, point.measurement()))
        }
        other => other,
    })
}

/// Measurement plus `,key=value` tag pairs. Tags with empty values are skipped.
fn write_series_key(buf: &mut String, measurement: &str, tags: &BTreeMap<String, String>) {
    escape::write_key(buf, measurement);
    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }
        buf.push(',');
        escape::write_key(buf, key);
        buf.push('=');
        escape::write_key(buf, value);
    }
}

fn write_fields_and_time(
    buf: &mut String,
    fields: &BTreeMap<String, FieldValue>,
    timestamp: Option<Timestamp>,
    precision: Precision,
) -> Result<()> {
    buf.push(' ');
    let mut written = 0usize;
    for (key, value) in fields {
        if key.is_empty() {
            return Err(Error::InvalidPoint("empty field key".into()));
        }
        if matches!(value, FieldValue::Float(v) if !v.is_finite()) {
            trace!(field = %key, "skipping non-finite float field");
            continue;
        }
        if written > 0 {
            buf.push(',');
        }
        escape::write_key(buf, key);
        buf.push('=');
        write_field_value(buf, value);
        written += 1;
    }
    if written == 0 {
        return Err(Error::InvalidPoint("no writable fields".into()));
    }
    if let Some(ts) = timestamp {
        buf.push(' ');
        escape::write_integer(buf, ts.to_precision(precision));
    }
    Ok(())
}

fn write_field_value(buf: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Bool(b) => escape::write_bool(buf, *b),
        FieldValue::Integer(i) => escape::write_integer_field(buf, *i),
        FieldValue::UnsignedInteger(u) => escape::write_unsigned_field(buf, *u),
        FieldValue::Float(f) => escape::write_float(buf, *f),
        FieldValue::String(s) => escape::write_string_value(buf, s),
    }
}

/// Encoder that owns a reusable output buffer.
///
/// Each call clears and refills the buffer, so encoding many points does not
/// allocate once the buffer has grown. Encoding needs `&mut self`; give each
/// task its own encoder.
#[derive(Debug, Default)]
pub struct LineEncoder {
    buf: String,
}

impl LineEncoder {
    /// Create an encoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `point`, returning a view into the internal buffer.
    pub fn encode(&mut self, point: &Point, precision: Precision) -> Result<&str> {
        self.buf.clear();
        write_point(&mut self.buf, point, precision)?;
        Ok(&self.buf)
    }
}

/// A measurement and tag set bound once and reused for many points.
///
/// The escaped `measurement,tags` prefix is computed at construction. Encoding
/// through a series only formats fields and the timestamp.
///
/// ```
/// use influxdb_lineflux::{FieldValue, Precision, Series};
///
/// let mut series = Series::new("weather", [("city", "A")]).unwrap();
/// let line = series
///     .encode([("temp", FieldValue::Float(21.5))], Some(1_500_000_000), Precision::Milliseconds)
///     .unwrap();
/// assert_eq!(line, "weather,city=A temp=21.5 1500000000");
/// ```
#[derive(Debug, Clone)]
pub struct Series {
    measurement: String,
    tags: BTreeMap<String, String>,
    prefix: String,
    buf: String,
}

impl Series {
    /// Bind a measurement and tag set.
    pub fn new<K, V>(
        measurement: impl Into<String>,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(Error::InvalidPoint("measurement must not be empty".into()));
        }
        let tags: BTreeMap<String, String> = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if tags.keys().any(|k| k.is_empty()) {
            return Err(Error::InvalidPoint(format!(
                "series '{}' has an empty tag key",
                measurement
            )));
        }
        let mut prefix = String::with_capacity(measurement.len() + tags.len() * 16);
        write_series_key(&mut prefix, &measurement, &tags);
        Ok(Self {
            measurement,
            tags,
            prefix,
            buf: String::new(),
        })
    }

    /// Measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Bound tag set.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Escaped `measurement[,tag=value]*` prefix shared by every line.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Start a point that carries this series' identity.
    pub fn point(&self) -> crate::point::PointBuilder {
        Point::builder(self.measurement.clone()).tags(self.tags.clone())
    }

    /// Encode a field set with this series' prefix. `timestamp` is in
    /// `precision` units.
    pub fn encode<K>(
        &mut self,
        fields: impl IntoIterator<Item = (K, FieldValue)>,
        timestamp: Option<i64>,
        precision: Precision,
    ) -> Result<&str>
    where
        K: Into<String>,
    {
        let fields: BTreeMap<String, FieldValue> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.buf.clear();
        self.buf.push_str(&self.prefix);
        let ts = timestamp.map(|v| Timestamp::new(v, precision));
        if let Err(e) = write_fields_and_time(&mut self.buf, &fields, ts, precision) {
            self.buf.clear();
            return Err(e);
        }
        Ok(&self.buf)
    }
}
