//! Escaping and number formatting shared by the line protocol encoder and the
//! Flux query builder.
//!
//! Every routine appends to a caller-owned `String` so callers can reuse one
//! buffer across many lines. The `Cow` returning helpers only allocate when
//! the input actually needs escaping.

use std::borrow::Cow;
use std::fmt::Write;

/// Characters that must be backslash-escaped in measurement names, tag keys,
/// tag values and field keys.
const KEY_SPECIALS: [char; 3] = [' ', ',', '='];

/// Escapes spaces, commas and equals signs with a backslash.
///
/// ```
/// use influxdb_lineflux::escape::escape_key;
///
/// assert_eq!(escape_key("host name"), "host\\ name");
/// assert_eq!(escape_key("plain"), "plain");
/// ```
pub fn escape_key(s: &str) -> Cow<'_, str> {
    if !s.contains(KEY_SPECIALS) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 4);
    write_key(&mut out, s);
    Cow::Owned(out)
}

/// Appends `s` to `buf` with key escaping applied.
pub fn write_key(buf: &mut String, s: &str) {
    for c in s.chars() {
        if KEY_SPECIALS.contains(&c) {
            buf.push('\\');
        }
        buf.push(c);
    }
}

/// Escapes `"` and `\` and wraps the result in double quotes.
///
/// ```
/// use influxdb_lineflux::escape::escape_string_value;
///
/// assert_eq!(escape_string_value(r#"say "hi""#), r#""say \"hi\"""#);
/// ```
pub fn escape_string_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    write_string_value(&mut out, s);
    out
}

/// Appends `s` to `buf` as a quoted, escaped string literal.
pub fn write_string_value(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}

/// Appends a float in its shortest round-trippable decimal form.
///
/// Rust's `Display` for `f64` never switches to exponent notation, so the
/// output always matches the numeric grammar of both wire formats. Integral
/// values keep a `.0` so the text stays a float literal in Flux.
pub fn write_float(buf: &mut String, v: f64) {
    let start = buf.len();
    let _ = write!(buf, "{}", v);
    if v.is_finite() && !buf[start..].contains('.') {
        buf.push_str(".0");
    }
}

/// Appends a signed integer without any suffix.
pub fn write_integer(buf: &mut String, v: i64) {
    let _ = write!(buf, "{}", v);
}

/// Appends a signed integer with the line protocol `i` suffix.
pub fn write_integer_field(buf: &mut String, v: i64) {
    write_integer(buf, v);
    buf.push('i');
}

/// Appends an unsigned integer with the line protocol `u` suffix.
pub fn write_unsigned_field(buf: &mut String, v: u64) {
    let _ = write!(buf, "{}u", v);
}

/// Appends `true` or `false`.
pub fn write_bool(buf: &mut String, v: bool) {
    buf.push_str(if v { "true" } else { "false" });
}
