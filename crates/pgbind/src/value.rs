//! Parameter values and their SQL literal encoding.
//!
//! Every value bound into a template is rendered as literal SQL text before the
//! statement is sent. Encoding follows PostgreSQL's literal rules: strings are
//! single-quoted with `'` doubled, and strings containing a backslash use the
//! `E'...'` escape-string form with backslashes doubled.

use crate::error::{OrmError, OrmResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Format used when binding `chrono::NaiveDateTime` values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used when binding `chrono::NaiveDate` values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Named parameter set consumed by [`populate`](crate::template::populate).
pub type Params = BTreeMap<String, Value>;

/// A value that can be substituted for a `:name:` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Trusted SQL fragment, inserted verbatim.
    Raw(String),
    /// Homogeneous list, rendered as `(a,b,c)`.
    Array(Vec<Value>),
}

/// Classification of an encoded value. Array elements must share one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Null,
    Bool,
    Number,
    Raw,
    String,
    Array,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Null => "null",
            ParamKind::Bool => "bool",
            ParamKind::Number => "number",
            ParamKind::Raw => "raw",
            ParamKind::String => "string",
            ParamKind::Array => "array",
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion hook for application types (enums, newtypes) that know how to
/// present themselves as a query parameter.
pub trait ToParam {
    fn to_param(&self) -> Value;
}

impl Value {
    /// Wrap a trusted SQL fragment. The text is inserted without escaping.
    pub fn raw(sql: impl Into<String>) -> Self {
        Value::Raw(sql.into())
    }

    /// Serialize `value` to JSON text.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> OrmResult<Self> {
        Ok(Value::Text(serde_json::to_string(value)?))
    }

    /// Convert an application type through its [`ToParam`] impl.
    pub fn from_param<T: ToParam + ?Sized>(value: &T) -> Self {
        value.to_param()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render this value as SQL literal text.
    pub fn encode(&self) -> OrmResult<(String, ParamKind)> {
        match self {
            Value::Null => Ok(("NULL".to_string(), ParamKind::Null)),
            Value::Bool(b) => Ok((
                if *b { "TRUE" } else { "FALSE" }.to_string(),
                ParamKind::Bool,
            )),
            Value::Int(i) => Ok((i.to_string(), ParamKind::Number)),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(OrmError::invalid_parameter(format!(
                        "{f} cannot be used as a parameter in a query"
                    )));
                }
                Ok((f.to_string(), ParamKind::Number))
            }
            Value::Raw(sql) => Ok((sql.clone(), ParamKind::Raw)),
            Value::Text(s) => Ok((quote_literal(s)?, ParamKind::String)),
            Value::Array(items) => encode_array(items),
        }
    }
}

fn encode_array(items: &[Value]) -> OrmResult<(String, ParamKind)> {
    let mut out = String::from("(");
    let mut kind: Option<ParamKind> = None;

    for item in items {
        let (text, item_kind) = item.encode()?;
        match item_kind {
            ParamKind::Null => continue,
            ParamKind::Array => {
                return Err(OrmError::invalid_parameter(
                    "Array params must not contain other arrays",
                ));
            }
            _ => {}
        }

        match kind {
            None => kind = Some(item_kind),
            Some(k) if k != item_kind => {
                return Err(OrmError::invalid_parameter(format!(
                    "Array params must contain like-typed entries (found {k} and {item_kind})"
                )));
            }
            Some(_) => out.push(','),
        }
        out.push_str(&text);
    }

    // `IN ()` is a syntax error in PostgreSQL; `IN (NULL)` matches nothing.
    if kind.is_none() {
        out.push_str("NULL");
    }
    out.push(')');
    Ok((out, ParamKind::Array))
}

/// Quote a string as a PostgreSQL literal.
pub fn quote_literal(s: &str) -> OrmResult<String> {
    if s.contains('\0') {
        return Err(OrmError::invalid_parameter(
            "string parameters must not contain NUL bytes",
        ));
    }

    let escape_form = s.contains('\\');
    let mut out = String::with_capacity(s.len() + 3);
    if escape_form {
        out.push('E');
    }
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    Ok(out)
}

/// Quote an identifier (table, column, alias) with double quotes.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Shorthand for [`Value::raw`].
pub fn raw(sql: impl Into<String>) -> Value {
    Value::raw(sql)
}

/// Build a [`Params`] map from `name => value` pairs.
///
/// ```ignore
/// let params = pgbind::params! { "id" => 5, "email" => "a@b.c" };
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $(
            params.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        params
    }};
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

// Wider unsigned integers only convert when they fit in a BIGINT.
macro_rules! impl_try_from_unsigned {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for Value {
                type Error = OrmError;

                fn try_from(v: $t) -> OrmResult<Self> {
                    i64::try_from(v).map(Value::Int).map_err(|_| {
                        OrmError::invalid_parameter(format!("integer {v} does not fit in i64"))
                    })
                }
            }
        )*
    };
}

impl_try_from_unsigned!(u64, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Value::Array(v.iter().cloned().map(Into::into).collect())
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Value::Text(v.format(DATE_FORMAT).to_string())
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Value::Text(v.format(DATETIME_FORMAT).to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Text(v.hyphenated().to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Text(v.to_string())
    }
}
