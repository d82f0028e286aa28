//! Row predicates for `filter(fn: (r) => ...)`.

use crate::escape;
use crate::flux::property::Property;
use crate::value::Value;

/// Comparison operator of a column restriction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl Comparison {
    fn as_str(self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
        }
    }
}

/// A predicate over a row `r`.
#[derive(Clone, Debug, PartialEq)]
pub enum Restriction {
    /// `r["column"] <op> value`
    Compare {
        /// Column name.
        column: String,
        /// Operator.
        op: Comparison,
        /// Right-hand side.
        value: Value,
    },
    /// `exists r["column"]`
    Exists(String),
    /// `not <restriction>`
    Not(Box<Restriction>),
    /// All restrictions hold.
    And(Vec<Restriction>),
    /// At least one restriction holds.
    Or(Vec<Restriction>),
}

impl Restriction {
    /// Restriction on an arbitrary column.
    pub fn column(name: impl Into<String>) -> ColumnRestriction {
        ColumnRestriction { column: name.into() }
    }

    /// Restriction on `_measurement`.
    pub fn measurement() -> ColumnRestriction {
        Self::column("_measurement")
    }

    /// Restriction on `_field`.
    pub fn field() -> ColumnRestriction {
        Self::column("_field")
    }

    /// Restriction on `_value`.
    pub fn value() -> ColumnRestriction {
        Self::column("_value")
    }

    /// Restriction on a tag column.
    pub fn tag(name: impl Into<String>) -> ColumnRestriction {
        Self::column(name)
    }

    /// Conjunction.
    pub fn and(restrictions: impl IntoIterator<Item = Restriction>) -> Self {
        Restriction::And(restrictions.into_iter().collect())
    }

    /// Disjunction.
    pub fn or(restrictions: impl IntoIterator<Item = Restriction>) -> Self {
        Restriction::Or(restrictions.into_iter().collect())
    }

    /// Negation.
    pub fn not(restriction: Restriction) -> Self {
        Restriction::Not(Box::new(restriction))
    }

    /// Append the predicate body, without the `(r) =>` prefix.
    pub fn write(&self, buf: &mut String) {
        match self {
            Restriction::Compare { column, op, value } => {
                write_column(buf, column);
                buf.push(' ');
                buf.push_str(op.as_str());
                buf.push(' ');
                if !value.write_flux_literal(buf) {
                    buf.push_str("null");
                }
            }
            Restriction::Exists(column) => {
                buf.push_str("exists ");
                write_column(buf, column);
            }
            Restriction::Not(inner) => {
                buf.push_str("not ");
                inner.write(buf);
            }
            // Empty groups print their identity element
            Restriction::And(items) => write_group(buf, items, " and ", "true"),
            Restriction::Or(items) => write_group(buf, items, " or ", "false"),
        }
    }

    /// The full `(r) => ...` function text.
    pub fn to_function(&self) -> String {
        let mut buf = String::from("(r) => ");
        self.write(&mut buf);
        buf
    }
}

fn write_column(buf: &mut String, column: &str) {
    buf.push_str("r[");
    escape::write_string_value(buf, column);
    buf.push(']');
}

fn write_group(buf: &mut String, items: &[Restriction], joiner: &str, identity: &str) {
    match items {
        [] => {
            buf.push_str(identity);
            return;
        }
        [only] => {
            only.write(buf);
            return;
        }
        _ => {}
    }
    buf.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push_str(joiner);
        }
        item.write(buf);
    }
    buf.push(')');
}

impl From<Restriction> for Property {
    fn from(r: Restriction) -> Self {
        Property::Expression(r.to_function())
    }
}

/// A column awaiting its comparison.
#[derive(Clone, Debug)]
pub struct ColumnRestriction {
    column: String,
}

impl ColumnRestriction {
    fn compare(self, op: Comparison, value: impl Into<Value>) -> Restriction {
        Restriction::Compare {
            column: self.column,
            op,
            value: value.into(),
        }
    }

    /// `==`
    pub fn equal(self, value: impl Into<Value>) -> Restriction {
        self.compare(Comparison::Equal, value)
    }

    /// `!=`
    pub fn not_equal(self, value: impl Into<Value>) -> Restriction {
        self.compare(Comparison::NotEqual, value)
    }

    /// `<`
    pub fn less(self, value: impl Into<Value>) -> Restriction {
        self.compare(Comparison::Less, value)
    }

    /// `<=`
    pub fn less_or_equal(self, value: impl Into<Value>) -> Restriction {
        self.compare(Comparison::LessOrEqual, value)
    }

    /// `>`
    pub fn greater(self, value: impl Into<Value>) -> Restriction {
        self.compare(Comparison::Greater, value)
    }

    /// `>=`
    pub fn greater_or_equal(self, value: impl Into<Value>) -> Restriction {
        self.compare(Comparison::GreaterOrEqual, value)
    }

    /// `exists r["column"]`
    pub fn exists(self) -> Restriction {
        Restriction::Exists(self.column)
    }
}
