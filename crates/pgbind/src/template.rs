//! Named-placeholder substitution for SQL templates.
//!
//! Templates carry placeholders of the form `:name:`, optionally preceded by a
//! comparison operator (`=`, `!=`, `<>`) and optionally wrapped in matching
//! quotes (`':name:'`, `":name:"`). Population replaces each placeholder with
//! the encoded literal of the matching parameter.
//!
//! Placeholders whose parameter is missing (or null) degrade to null-aware SQL:
//!
//! | context | template     | result        |
//! |---------|--------------|---------------|
//! | `SET`   | `a = :a:`    | `a = NULL`    |
//! | `WHERE` | `a = :a:`    | `a IS NULL`   |
//! | `WHERE` | `a != :a:`   | `a IS NOT NULL` |
//! | `WHERE` | `:a:`        | `NULL`        |
//!
//! Quoted literals are copied verbatim and never searched for keywords or
//! placeholders, except when their whole content is a single placeholder.
//! A `:` directly after another `:` never opens a placeholder, so PostgreSQL
//! casts such as `x::text` pass through untouched.

use crate::error::{OrmError, OrmResult};
use crate::value::Params;
use std::collections::HashMap;

/// Comparison operator captured in front of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    NotEq,
    LtGt,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::LtGt => "<>",
        }
    }
}

/// Substitute every placeholder in `template` with its parameter value.
///
/// All parameters are encoded up front, so an unencodable value fails the call
/// even when the template never references it.
pub fn populate(template: &str, params: &Params) -> OrmResult<String> {
    let mut encoded = HashMap::with_capacity(params.len());
    for (name, value) in params {
        if value.is_null() {
            continue;
        }
        let (text, _) = value.encode()?;
        encoded.insert(name.as_str(), text);
    }

    Substituter::new(template.trim(), &encoded).run()
}

/// Rewrite `:from:` placeholders to `:to:`.
///
/// Follows the same spans as [`populate`]: a quoted span is only touched when
/// its whole content is `:from:`, and `::from:` is a cast, not a placeholder.
/// An unterminated quote is copied as is and left for `populate` to reject.
pub(crate) fn rename_placeholder(sql: &str, from: &str, to: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + to.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'\'' || b == b'"' {
            let end = quoted_span_end(bytes, pos).unwrap_or(bytes.len());
            let span = &sql[pos..end];
            if end - pos >= 2 && quoted_placeholder(&span[1..span.len() - 1]) == Some(from) {
                out.push(b as char);
                out.push(':');
                out.push_str(to);
                out.push(':');
                out.push(b as char);
            } else {
                out.push_str(span);
            }
            pos = end;
        } else if b == b':' && (pos == 0 || bytes[pos - 1] != b':') {
            let mut i = pos + 1;
            while i < bytes.len() && is_placeholder_char(bytes[i]) {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b':' && &sql[pos + 1..i] == from {
                out.push(':');
                out.push_str(to);
                out.push(':');
                pos = i + 1;
            } else {
                out.push_str(&sql[pos..i]);
                pos = i;
            }
        } else {
            let len = sql[pos..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&sql[pos..pos + len]);
            pos += len;
        }
    }

    out
}

/// Index just past the quote closing the span opened at `start`.
fn quoted_span_end(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut escaping = false;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if escaping {
            escaping = false;
        } else if b == b'\\' {
            escaping = true;
        } else if b == quote {
            return Some(i + 1);
        }
    }
    None
}

pub(crate) fn is_placeholder_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

struct Substituter<'a> {
    sql: &'a str,
    bytes: &'a [u8],
    values: &'a HashMap<&'a str, String>,
    out: String,
    token: Vec<u8>,
    in_set: bool,
}

impl<'a> Substituter<'a> {
    fn new(sql: &'a str, values: &'a HashMap<&'a str, String>) -> Self {
        Self {
            sql,
            bytes: sql.as_bytes(),
            values,
            out: String::with_capacity(sql.len() + 16),
            token: Vec::new(),
            in_set: false,
        }
    }

    fn run(mut self) -> OrmResult<String> {
        let (sql, bytes) = (self.sql, self.bytes);
        let mut pos = 0;
        while pos < bytes.len() {
            let b = bytes[pos];

            if b.is_ascii_whitespace() {
                self.finish_token();
                self.out.push(b as char);
                pos += 1;
            } else if b == b'\'' || b == b'"' {
                let end = self.quoted_end(pos)?;
                match quoted_placeholder(&sql[pos + 1..end - 1]) {
                    Some(name) => self.substitute(name),
                    None => self.out.push_str(&sql[pos..end]),
                }
                pos = end;
            } else if let Some(end) = self.bare_placeholder_end(pos) {
                self.token.extend_from_slice(&bytes[pos..end]);
                self.substitute(&sql[pos + 1..end - 1]);
                pos = end;
            } else {
                let ch = sql[pos..].chars().next().unwrap_or_default();
                let len = ch.len_utf8();
                self.token.extend_from_slice(&bytes[pos..pos + len]);
                self.out.push(ch);
                pos += len;
            }
        }
        Ok(self.out)
    }

    /// A bare word just ended; `SET` enters assignment context, `WHERE` leaves it.
    fn finish_token(&mut self) {
        if self.token.eq_ignore_ascii_case(b"SET") {
            self.in_set = true;
        } else if self.token.eq_ignore_ascii_case(b"WHERE") {
            self.in_set = false;
        }
        self.token.clear();
    }

    fn quoted_end(&self, start: usize) -> OrmResult<usize> {
        quoted_span_end(self.bytes, start).ok_or_else(|| {
            OrmError::MalformedQuery(format!(
                "unterminated {} literal starting at byte {start}",
                self.bytes[start] as char
            ))
        })
    }

    fn bare_placeholder_end(&self, start: usize) -> Option<usize> {
        if self.bytes[start] != b':' || (start > 0 && self.bytes[start - 1] == b':') {
            return None;
        }
        let mut i = start + 1;
        while i < self.bytes.len() && is_placeholder_char(self.bytes[i]) {
            i += 1;
        }
        (i > start + 1 && i < self.bytes.len() && self.bytes[i] == b':').then_some(i + 1)
    }

    /// Pop a trailing comparison operator (and the whitespace after it) off the output.
    fn take_operator(&mut self) -> Option<CompareOp> {
        let head = self.out.trim_end();
        let (op, len) = if head.ends_with("!=") {
            (CompareOp::NotEq, 2)
        } else if head.ends_with("<>") {
            (CompareOp::LtGt, 2)
        } else if head.ends_with('=') && !head.ends_with("<=") && !head.ends_with(">=") {
            (CompareOp::Eq, 1)
        } else {
            return None;
        };
        let keep = head.len() - len;
        self.out.truncate(keep);
        Some(op)
    }

    fn substitute(&mut self, name: &str) {
        let op = self.take_operator();
        let values = self.values;

        if let Some(value) = values.get(name) {
            if let Some(op) = op {
                self.out.push_str(op.as_str());
                self.out.push(' ');
            }
            self.out.push_str(value);
            return;
        }

        if self.in_set {
            if let Some(op) = op {
                self.out.push_str(op.as_str());
                self.out.push(' ');
            }
            self.out.push_str("NULL");
            return;
        }

        self.out.push_str(match op {
            None => "NULL",
            Some(CompareOp::Eq) => "IS NULL",
            Some(CompareOp::NotEq | CompareOp::LtGt) => "IS NOT NULL",
        });
    }
}

/// `:name:` as the entire content of a quoted span.
fn quoted_placeholder(inner: &str) -> Option<&str> {
    let name = inner.strip_prefix(':')?.strip_suffix(':')?;
    (!name.is_empty() && name.bytes().all(is_placeholder_char)).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use crate::value::{Value, raw};

    fn fill(sql: &str, params: &Params) -> String {
        populate(sql, params).unwrap()
    }

    #[test]
    fn update_with_missing_where_param() {
        let out = fill("UPDATE t SET a = :a: WHERE b = :b:", &params! { "a" => 5 });
        assert_eq!(out, "UPDATE t SET a = 5 WHERE b IS NULL");
    }

    #[test]
    fn array_parameter_in_list() {
        let out = fill("SELECT * FROM t WHERE id IN :ids:", &params! { "ids" => vec![1, 2, 3] });
        assert_eq!(out, "SELECT * FROM t WHERE id IN (1,2,3)");
    }

    #[test]
    fn where_context_null_forms() {
        let p = Params::new();
        assert_eq!(fill("SELECT 1 WHERE :x:", &p), "SELECT 1 WHERE NULL");
        assert_eq!(fill("SELECT 1 WHERE a = :x:", &p), "SELECT 1 WHERE a IS NULL");
        assert_eq!(fill("SELECT 1 WHERE a != :x:", &p), "SELECT 1 WHERE a IS NOT NULL");
        assert_eq!(fill("SELECT 1 WHERE a <> :x:", &p), "SELECT 1 WHERE a IS NOT NULL");
    }

    #[test]
    fn set_context_null_forms() {
        let p = Params::new();
        assert_eq!(fill("UPDATE t SET a = :x:", &p), "UPDATE t SET a = NULL");
        assert_eq!(fill("UPDATE t SET a = :x:, b = :y:", &p), "UPDATE t SET a = NULL, b = NULL");
        assert_eq!(fill("UPDATE t SET a = 1 WHERE b != :x:", &p), "UPDATE t SET a = 1 WHERE b IS NOT NULL");
    }

    #[test]
    fn null_value_is_treated_as_missing() {
        let p = params! { "x" => None::<i32> };
        assert_eq!(fill("SELECT 1 WHERE a = :x:", &p), "SELECT 1 WHERE a IS NULL");
    }

    #[test]
    fn operator_spacing_is_normalized() {
        let p = params! { "x" => 3 };
        assert_eq!(fill("SELECT 1 WHERE a=:x:", &p), "SELECT 1 WHERE a= 3");
        assert_eq!(fill("SELECT 1 WHERE a =   :x:", &p), "SELECT 1 WHERE a = 3");
        assert_eq!(fill("SELECT 1 WHERE a != :x:", &p), "SELECT 1 WHERE a != 3");
    }

    #[test]
    fn quoted_placeholders_are_replaced() {
        let p = params! { "name" => "bob", "n" => 4 };
        assert_eq!(
            fill("SELECT 1 WHERE name = ':name:' AND n = \":n:\"", &p),
            "SELECT 1 WHERE name = 'bob' AND n = 4"
        );
        assert_eq!(fill("SELECT 1 WHERE name = ':missing:'", &p), "SELECT 1 WHERE name IS NULL");
    }

    #[test]
    fn quoted_literals_are_untouched() {
        let p = params! { "b" => 1 };
        let sql = "SELECT 'a :b: c', 'SET x = :b:', \"WHERE\" FROM t WHERE c = :b:";
        assert_eq!(
            fill(sql, &p),
            "SELECT 'a :b: c', 'SET x = :b:', \"WHERE\" FROM t WHERE c = 1"
        );
    }

    #[test]
    fn quoted_keywords_do_not_switch_context() {
        let p = Params::new();
        let out = fill("UPDATE t SET a = 'WHERE ' , b = :b:", &p);
        assert_eq!(out, "UPDATE t SET a = 'WHERE ' , b = NULL");
    }

    #[test]
    fn escaped_quotes_inside_literals() {
        let p = params! { "x" => 1 };
        assert_eq!(
            fill(r"SELECT 'it\'s :x:' WHERE a = :x:", &p),
            r"SELECT 'it\'s :x:' WHERE a = 1"
        );
        assert_eq!(fill("SELECT 'it''s' WHERE a = :x:", &p), "SELECT 'it''s' WHERE a = 1");
    }

    #[test]
    fn unterminated_literal_is_malformed() {
        let err = populate("SELECT 'oops WHERE a = :x:", &Params::new()).unwrap_err();
        assert!(matches!(err, OrmError::MalformedQuery(_)));
        assert!(populate("SELECT \"", &Params::new()).is_err());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let p = Params::new();
        assert_eq!(
            fill("update t set a = :a: where b = :b:", &p),
            "update t set a = NULL where b IS NULL"
        );
    }

    #[test]
    fn casts_survive() {
        let p = params! { "id" => 7 };
        assert_eq!(
            fill("SELECT a::text FROM t WHERE id = :id:::bigint", &p),
            "SELECT a::text FROM t WHERE id = 7::bigint"
        );
        assert_eq!(fill("SELECT a::text::varchar", &p), "SELECT a::text::varchar");
    }

    #[test]
    fn range_comparisons_keep_their_operator() {
        let p = Params::new();
        assert_eq!(fill("SELECT 1 WHERE a >= :x:", &p), "SELECT 1 WHERE a >= NULL");
        let p = params! { "x" => 2 };
        assert_eq!(fill("SELECT 1 WHERE a <= :x:", &p), "SELECT 1 WHERE a <= 2");
    }

    #[test]
    fn names_allow_digits_underscores_and_hyphens() {
        let p = params! { "0" => 1, "expr3_user-id" => 2 };
        assert_eq!(
            fill("SELECT 1 WHERE a = :0: AND b = :expr3_user-id:", &p),
            "SELECT 1 WHERE a = 1 AND b = 2"
        );
    }

    #[test]
    fn string_values_are_escaped() {
        let p = params! { "s" => "O'Brien" };
        assert_eq!(
            fill("SELECT 1 WHERE last = :s:", &p),
            "SELECT 1 WHERE last = 'O''Brien'"
        );
    }

    #[test]
    fn raw_values_are_inserted_verbatim() {
        let p = params! { "now" => raw("NOW()") };
        assert_eq!(fill("UPDATE t SET at = :now:", &p), "UPDATE t SET at = NOW()");
    }

    #[test]
    fn unused_bad_params_still_fail() {
        let p = params! { "bad" => Value::Array(vec![Value::from(vec![1])]) };
        assert!(populate("SELECT 1", &p).is_err());
    }

    #[test]
    fn template_is_trimmed_and_unicode_is_preserved() {
        let p = params! { "x" => "é" };
        assert_eq!(fill("  SELECT 'ü' WHERE n = :x:  ", &p), "SELECT 'ü' WHERE n = 'é'");
    }

    #[test]
    fn lone_colons_are_plain_text() {
        let p = Params::new();
        assert_eq!(fill("SELECT arr[1:2] FROM t", &p), "SELECT arr[1:2] FROM t");
        assert_eq!(fill("SELECT ':' FROM t", &p), "SELECT ':' FROM t");
    }

    #[test]
    fn rename_rewrites_bare_placeholders() {
        assert_eq!(
            rename_placeholder("a = :id: OR b = :id:", "id", "expr1_id"),
            "a = :expr1_id: OR b = :expr1_id:"
        );
    }

    #[test]
    fn rename_leaves_literals_and_casts_alone() {
        assert_eq!(
            rename_placeholder(
                "note = 'ref :id: here' AND id = ':id:' AND x = y::id: AND k = :idx:",
                "id",
                "expr1_id"
            ),
            "note = 'ref :id: here' AND id = ':expr1_id:' AND x = y::id: AND k = :idx:"
        );
        assert_eq!(rename_placeholder("a = 'open :id:", "id", "e"), "a = 'open :id:");
    }
}
