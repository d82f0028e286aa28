//! Flux query builder.
//!
//! A [`Flux`] is an ordered chain of operators plus optional `option`
//! declarations. Printing joins operators with `\n\t|> ` and places options
//! first, each separated by a blank line:
//!
//! ```
//! use influxdb_lineflux::flux::{Flux, FluxDuration, Restriction};
//!
//! let query = Flux::from_bucket("telegraf")
//!     .range(FluxDuration::hours(-1))
//!     .filter(Restriction::measurement().equal("cpu"))
//!     .mean()
//!     .print()
//!     .unwrap();
//!
//! assert_eq!(
//!     query,
//!     "from(bucket: \"telegraf\")\n\t|> range(start: -1h)\n\t|> filter(fn: (r) => r[\"_measurement\"] == \"cpu\")\n\t|> mean()"
//! );
//! ```
//!
//! Properties may reference named parameters, which are resolved by
//! [`Flux::print_with`]. Printing never mutates the query, so the same query
//! prints the same text for the same parameters.

mod options;
mod property;
mod restriction;

use std::collections::BTreeMap;

pub use options::{FluxOption, NowOption, TaskOption};
pub use property::{FluxDuration, Literal, Parameters, Property, TimeUnit};
pub use restriction::{ColumnRestriction, Comparison, Restriction};

use crate::error::Result;
use crate::value::Value;

/// Separator between piped operators.
pub const PIPE: &str = "\n\t|> ";

/// One operator call, `name(prop: value, ...)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Operator {
    name: String,
    properties: Vec<(String, Property)>,
}

impl Operator {
    /// Operator with no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Set a property. Setting an existing name replaces it in place.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Property>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
        self
    }

    /// Operator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append `name(...)`, skipping properties that resolve to nothing.
    pub fn write(&self, buf: &mut String, params: &Parameters) -> Result<()> {
        buf.push_str(&self.name);
        buf.push('(');
        let mut written = 0usize;
        for (name, property) in &self.properties {
            let mark = buf.len();
            if written > 0 {
                buf.push_str(", ");
            }
            buf.push_str(name);
            buf.push_str(": ");
            if property.write(buf, params)? {
                written += 1;
            } else {
                buf.truncate(mark);
            }
        }
        buf.push(')');
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Call(Operator),
    Raw(String),
}

/// A Flux query under construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Flux {
    options: Vec<FluxOption>,
    segments: Vec<Segment>,
}

impl Flux {
    /// Empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// `from(bucket: "...")`
    pub fn from_bucket(bucket: impl Into<Property>) -> Self {
        Self::new().pipe(Operator::new("from").property("bucket", bucket))
    }

    /// Add an `option` declaration.
    pub fn option(mut self, option: impl Into<FluxOption>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Append an operator.
    pub fn pipe(mut self, operator: Operator) -> Self {
        self.segments.push(Segment::Call(operator));
        self
    }

    /// Append a custom operator with the given properties.
    pub fn operator<K, V>(self, name: &str, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Property>,
    {
        let operator = properties
            .into_iter()
            .fold(Operator::new(name), |op, (k, v)| op.property(k, v));
        self.pipe(operator)
    }

    /// Append a raw Flux segment verbatim.
    pub fn expression(mut self, raw: impl Into<String>) -> Self {
        self.segments.push(Segment::Raw(raw.into()));
        self
    }

    /// `range(start: ...)`
    pub fn range(self, start: impl Into<Property>) -> Self {
        self.pipe(Operator::new("range").property("start", start))
    }

    /// `range(start: ..., stop: ...)`
    pub fn range_between(self, start: impl Into<Property>, stop: impl Into<Property>) -> Self {
        self.pipe(
            Operator::new("range")
                .property("start", start)
                .property("stop", stop),
        )
    }

    /// `filter(fn: (r) => ...)`
    pub fn filter(self, restriction: Restriction) -> Self {
        self.pipe(Operator::new("filter").property("fn", restriction))
    }

    /// `limit(n: ...)`
    pub fn limit(self, n: impl Into<Property>) -> Self {
        self.pipe(Operator::new("limit").property("n", n))
    }

    /// `limit(n: ..., offset: ...)`
    pub fn limit_offset(self, n: impl Into<Property>, offset: impl Into<Property>) -> Self {
        self.pipe(
            Operator::new("limit")
                .property("n", n)
                .property("offset", offset),
        )
    }

    /// `sort(columns: [...], desc: ...)`
    pub fn sort(self, columns: &[&str], desc: bool) -> Self {
        self.pipe(
            Operator::new("sort")
                .property("columns", Literal::from(columns))
                .property("desc", desc),
        )
    }

    /// `group(columns: [...])`
    pub fn group(self, columns: &[&str]) -> Self {
        self.pipe(Operator::new("group").property("columns", Literal::from(columns)))
    }

    /// `group(columns: [...], mode: "...")`
    pub fn group_mode(self, columns: &[&str], mode: &str) -> Self {
        self.pipe(
            Operator::new("group")
                .property("columns", Literal::from(columns))
                .property("mode", mode),
        )
    }

    /// `window(every: ...)`
    pub fn window(self, every: impl Into<Property>) -> Self {
        self.pipe(Operator::new("window").property("every", every))
    }

    /// `aggregateWindow(every: ..., fn: ...)`
    pub fn aggregate_window(self, every: impl Into<Property>, function: &str) -> Self {
        self.pipe(
            Operator::new("aggregateWindow")
                .property("every", every)
                .property("fn", Property::expression(function)),
        )
    }

    /// `mean()`
    pub fn mean(self) -> Self {
        self.pipe(Operator::new("mean"))
    }

    /// `sum()`
    pub fn sum(self) -> Self {
        self.pipe(Operator::new("sum"))
    }

    /// `count()`
    pub fn count(self) -> Self {
        self.pipe(Operator::new("count"))
    }

    /// `min()`
    pub fn min(self) -> Self {
        self.pipe(Operator::new("min"))
    }

    /// `max()`
    pub fn max(self) -> Self {
        self.pipe(Operator::new("max"))
    }

    /// `first()`
    pub fn first(self) -> Self {
        self.pipe(Operator::new("first"))
    }

    /// `last()`
    pub fn last(self) -> Self {
        self.pipe(Operator::new("last"))
    }

    /// `drop(columns: [...])`
    pub fn drop_columns(self, columns: &[&str]) -> Self {
        self.pipe(Operator::new("drop").property("columns", Literal::from(columns)))
    }

    /// `keep(columns: [...])`
    pub fn keep(self, columns: &[&str]) -> Self {
        self.pipe(Operator::new("keep").property("columns", Literal::from(columns)))
    }

    /// `rename(columns: {"old": "new"})`
    pub fn rename<K, V>(self, columns: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let columns: BTreeMap<String, Value> = columns
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        self.pipe(Operator::new("rename").property("columns", Literal::Record(columns)))
    }

    /// `pivot(rowKey: [...], columnKey: [...], valueColumn: "...")`
    pub fn pivot(self, row_key: &[&str], column_key: &[&str], value_column: &str) -> Self {
        self.pipe(
            Operator::new("pivot")
                .property("rowKey", Literal::from(row_key))
                .property("columnKey", Literal::from(column_key))
                .property("valueColumn", value_column),
        )
    }

    /// `distinct(column: "...")`
    pub fn distinct(self, column: &str) -> Self {
        self.pipe(Operator::new("distinct").property("column", column))
    }

    /// `toFloat()`
    pub fn to_float(self) -> Self {
        self.pipe(Operator::new("toFloat"))
    }

    /// `yield(name: "...")`
    pub fn yield_as(self, name: impl Into<Property>) -> Self {
        self.pipe(Operator::new("yield").property("name", name))
    }

    /// Print with no parameters bound.
    pub fn print(&self) -> Result<String> {
        self.print_with(&Parameters::new())
    }

    /// Print, resolving parameter references against `params`.
    pub fn print_with(&self, params: &Parameters) -> Result<String> {
        let mut buf = String::with_capacity(64 * (self.segments.len() + self.options.len()));
        for (i, option) in self.options.iter().enumerate() {
            if i > 0 {
                buf.push_str("\n\n");
            }
            option.write(&mut buf, params)?;
        }
        if !self.options.is_empty() && !self.segments.is_empty() {
            buf.push_str("\n\n");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                buf.push_str(PIPE);
            }
            match segment {
                Segment::Call(op) => op.write(&mut buf, params)?,
                Segment::Raw(raw) => buf.push_str(raw),
            }
        }
        Ok(buf)
    }
}
