//! # Placeholder Dialect Rewriting
//!
//! All gateway SQL is written in the canonical `$N` syntax. Postgres
//! takes it verbatim; for SQLite every `$N` becomes a bare `?` and the
//! referenced parameter is re-emitted in occurrence order.
//!
//! ```text
//! canonical:  UPDATE t SET a = $2 WHERE id = $1 OR id = $1
//! sqlite:     UPDATE t SET a = ?  WHERE id = ?  OR id = ?
//! params:     [p2, p1, p1]            (duplicates are re-pushed)
//! ```
//!
//! A `$N` with no matching parameter is an error rather than a silent
//! NULL bind.

use crate::error::{GatewayError, GatewayResult};
use crate::value::SqlValue;

/// Rewrites canonical SQL for SQLite, reordering parameters to match.
///
/// Single-quoted string literals are skipped, so a `$` inside one is
/// left alone.
pub(crate) fn sqlite_sql(sql: &str, params: &[SqlValue]) -> GatewayResult<(String, Vec<SqlValue>)> {
    let mut out = String::with_capacity(sql.len());
    let mut reordered = Vec::with_capacity(params.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_string = false;

    while let Some((_, c)) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                out.push(c);
            }
            '$' if chars.peek().is_some_and(|(_, n)| n.is_ascii_digit()) => {
                let mut index = 0usize;
                while let Some((_, d)) = chars.peek() {
                    if let Some(digit) = d.to_digit(10) {
                        index = index * 10 + digit as usize;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let param = params
                    .get(index.wrapping_sub(1))
                    .ok_or(GatewayError::Placeholder(index))?;
                reordered.push(param.clone());
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    Ok((out, reordered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(values: &[i64]) -> Vec<SqlValue> {
        values.iter().map(|v| SqlValue::from(*v)).collect()
    }

    #[test]
    fn rewrites_in_occurrence_order() {
        let (sql, params) =
            sqlite_sql("UPDATE t SET a = $2 WHERE id = $1", &p(&[10, 20])).unwrap();
        assert_eq!(sql, "UPDATE t SET a = ? WHERE id = ?");
        assert_eq!(params, p(&[20, 10]));
    }

    #[test]
    fn duplicate_reference_is_repushed() {
        let (sql, params) = sqlite_sql(
            "SELECT * FROM t WHERE origen = $1 OR destino = $1",
            &p(&[7]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE origen = ? OR destino = ?");
        assert_eq!(params, p(&[7, 7]));
    }

    #[test]
    fn multi_digit_placeholders() {
        let refs: Vec<i64> = (1..=12).collect();
        let (sql, params) = sqlite_sql("INSERT INTO t VALUES ($11, $12)", &p(&refs)).unwrap();
        assert_eq!(sql, "INSERT INTO t VALUES (?, ?)");
        assert_eq!(params, p(&[11, 12]));
    }

    #[test]
    fn out_of_range_is_an_error() {
        let err = sqlite_sql("SELECT $3", &p(&[1])).unwrap_err();
        assert!(matches!(err, GatewayError::Placeholder(3)));
    }

    #[test]
    fn dollar_inside_string_literal_is_untouched() {
        let (sql, params) = sqlite_sql("SELECT '$1 off' WHERE id = $1", &p(&[5])).unwrap();
        assert_eq!(sql, "SELECT '$1 off' WHERE id = ?");
        assert_eq!(params, p(&[5]));
    }

    #[test]
    fn no_placeholders_passes_through() {
        let (sql, params) = sqlite_sql("SELECT 1", &[]).unwrap();
        assert_eq!(sql, "SELECT 1");
        assert!(params.is_empty());
    }
}
