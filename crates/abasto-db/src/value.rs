//! # Values Crossing the Gateway Boundary
//!
//! Business code never sees a backend row type. Parameters go in as
//! [`SqlValue`]s, rows come back as [`SqlRow`]s with typed accessors
//! tolerant of the two backends' storage classes.
//!
//! ## Typed Nulls
//! Each variant carries an `Option` so a NULL parameter still knows its
//! SQL type. Postgres is strict about parameter type OIDs (an untyped
//! NULL bound into a BIGINT column would be rejected), so `None` travels
//! inside the variant that matches the column.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::{GatewayError, GatewayResult};

// =============================================================================
// SqlValue
// =============================================================================

/// A parameter or cell value, dialect-neutral.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Real(Option<f64>),
    Text(Option<String>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
}

impl SqlValue {
    /// True when the value is a SQL NULL of any type.
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SqlValue::Int(None)
                | SqlValue::Real(None)
                | SqlValue::Text(None)
                | SqlValue::Bool(None)
                | SqlValue::Timestamp(None)
        )
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(Some(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(Some(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(Some(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(Some(v))
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(Some(v))
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        SqlValue::Int(v)
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        SqlValue::Real(v)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Option<&str>> for SqlValue {
    fn from(v: Option<&str>) -> Self {
        SqlValue::Text(v.map(|s| s.to_string()))
    }
}

impl From<Option<bool>> for SqlValue {
    fn from(v: Option<bool>) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Option<DateTime<Utc>>> for SqlValue {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        SqlValue::Timestamp(v)
    }
}

// =============================================================================
// ExecResult
// =============================================================================

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows touched by the statement.
    pub rows_affected: u64,

    /// Rowid of the last insert. SQLite only.
    ///
    /// Portable code uses `INSERT … RETURNING id` instead, which both
    /// backends support; this field exists to honor the embedded
    /// backend's native semantics.
    pub last_insert_id: Option<i64>,
}

// =============================================================================
// SqlRow
// =============================================================================

/// One decoded result row.
///
/// Accessors are storage-class tolerant: SQLite hands back INTEGER where
/// Postgres says BOOL, and TEXT where Postgres says TIMESTAMPTZ; callers
/// ask for the domain type and the row bridges the gap.
#[derive(Debug, Clone)]
pub struct SqlRow {
    cols: Vec<(String, SqlValue)>,
}

impl SqlRow {
    fn find(&self, name: &str) -> GatewayResult<&SqlValue> {
        self.cols
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| GatewayError::Decode(format!("missing column '{name}'")))
    }

    pub fn get_opt_i64(&self, name: &str) -> GatewayResult<Option<i64>> {
        match self.find(name)? {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Bool(Some(b)) => Ok(Some(*b as i64)),
            v if v.is_null() => Ok(None),
            other => Err(type_mismatch(name, "integer", other)),
        }
    }

    pub fn get_i64(&self, name: &str) -> GatewayResult<i64> {
        self.get_opt_i64(name)?
            .ok_or_else(|| null_column(name))
    }

    pub fn get_opt_f64(&self, name: &str) -> GatewayResult<Option<f64>> {
        match self.find(name)? {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Int(Some(v)) => Ok(Some(*v as f64)),
            v if v.is_null() => Ok(None),
            other => Err(type_mismatch(name, "real", other)),
        }
    }

    pub fn get_f64(&self, name: &str) -> GatewayResult<f64> {
        self.get_opt_f64(name)?
            .ok_or_else(|| null_column(name))
    }

    pub fn get_opt_str(&self, name: &str) -> GatewayResult<Option<&str>> {
        match self.find(name)? {
            SqlValue::Text(v) => Ok(v.as_deref()),
            v if v.is_null() => Ok(None),
            other => Err(type_mismatch(name, "text", other)),
        }
    }

    pub fn get_str(&self, name: &str) -> GatewayResult<&str> {
        self.get_opt_str(name)?
            .ok_or_else(|| null_column(name))
    }

    pub fn get_bool(&self, name: &str) -> GatewayResult<bool> {
        match self.find(name)? {
            SqlValue::Bool(Some(b)) => Ok(*b),
            // SQLite stores booleans as 0/1 integers
            SqlValue::Int(Some(v)) => Ok(*v != 0),
            other => Err(type_mismatch(name, "bool", other)),
        }
    }

    pub fn get_opt_datetime(&self, name: &str) -> GatewayResult<Option<DateTime<Utc>>> {
        match self.find(name)? {
            SqlValue::Timestamp(v) => Ok(*v),
            SqlValue::Text(Some(s)) => parse_datetime(s)
                .map(Some)
                .ok_or_else(|| GatewayError::Decode(format!("column '{name}': unparseable timestamp '{s}'"))),
            v if v.is_null() => Ok(None),
            other => Err(type_mismatch(name, "timestamp", other)),
        }
    }

    pub fn get_datetime(&self, name: &str) -> GatewayResult<DateTime<Utc>> {
        self.get_opt_datetime(name)?
            .ok_or_else(|| null_column(name))
    }
}

fn type_mismatch(name: &str, wanted: &str, got: &SqlValue) -> GatewayError {
    GatewayError::Decode(format!("column '{name}': expected {wanted}, got {got:?}"))
}

fn null_column(name: &str) -> GatewayError {
    GatewayError::Decode(format!("column '{name}' is NULL"))
}

/// SQLite timestamps come back as the text sqlx wrote; accept the RFC
/// 3339 form plus the space-separated form `CURRENT_TIMESTAMP` would
/// have used.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Binding (parameters in)
// =============================================================================

pub(crate) fn bind_sqlite<'q>(
    q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    params.iter().fold(q, |q, p| match p {
        SqlValue::Int(v) => q.bind(*v),
        SqlValue::Real(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.clone()),
        SqlValue::Bool(v) => q.bind(*v),
        SqlValue::Timestamp(v) => q.bind(*v),
    })
}

pub(crate) fn bind_pg<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    params.iter().fold(q, |q, p| match p {
        SqlValue::Int(v) => q.bind(*v),
        SqlValue::Real(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.clone()),
        SqlValue::Bool(v) => q.bind(*v),
        SqlValue::Timestamp(v) => q.bind(*v),
    })
}

// =============================================================================
// Decoding (rows out)
// =============================================================================

pub(crate) fn decode_sqlite_row(row: &SqliteRow) -> GatewayResult<SqlRow> {
    let mut cols = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(GatewayError::from)?;
        let value = if raw.is_null() {
            SqlValue::Text(None)
        } else {
            // Storage classes, not declared types: INTEGER/REAL/TEXT/BLOB
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => SqlValue::Int(Some(row.try_get::<i64, _>(i)?)),
                "REAL" => SqlValue::Real(Some(row.try_get::<f64, _>(i)?)),
                _ => SqlValue::Text(Some(row.try_get::<String, _>(i)?)),
            }
        };
        cols.push((col.name().to_string(), value));
    }
    Ok(SqlRow { cols })
}

pub(crate) fn decode_pg_row(row: &PgRow) -> GatewayResult<SqlRow> {
    let mut cols = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(GatewayError::from)?;
        let type_name = raw.type_info().name().to_string();
        let is_null = raw.is_null();
        let value = match type_name.as_str() {
            "INT2" => SqlValue::Int(row.try_get::<Option<i16>, _>(i)?.map(i64::from)),
            "INT4" => SqlValue::Int(row.try_get::<Option<i32>, _>(i)?.map(i64::from)),
            "INT8" => SqlValue::Int(row.try_get::<Option<i64>, _>(i)?),
            "FLOAT4" => SqlValue::Real(row.try_get::<Option<f32>, _>(i)?.map(f64::from)),
            "FLOAT8" => SqlValue::Real(row.try_get::<Option<f64>, _>(i)?),
            "BOOL" => SqlValue::Bool(row.try_get::<Option<bool>, _>(i)?),
            "TIMESTAMPTZ" => SqlValue::Timestamp(row.try_get::<Option<DateTime<Utc>>, _>(i)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                SqlValue::Text(row.try_get::<Option<String>, _>(i)?)
            }
            other if is_null => {
                // Unknown type but NULL; a typed None is all anyone needs
                let _ = other;
                SqlValue::Text(None)
            }
            other => {
                return Err(GatewayError::Decode(format!(
                    "column '{}': unsupported Postgres type {other}",
                    col.name()
                )))
            }
        };
        cols.push((col.name().to_string(), value));
    }
    Ok(SqlRow { cols })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cols: Vec<(&str, SqlValue)>) -> SqlRow {
        SqlRow {
            cols: cols
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn accessors_bridge_storage_classes() {
        let r = row(vec![
            ("stock", SqlValue::Int(Some(40))),
            ("activo", SqlValue::Int(Some(1))),       // SQLite bool
            ("precio", SqlValue::Int(Some(10))),      // integer-affinity real
            ("nombre", SqlValue::Text(Some("Cafe".into()))),
            ("cliente_id", SqlValue::Text(None)),     // NULL of unknown type
        ]);

        assert_eq!(r.get_i64("stock").unwrap(), 40);
        assert!(r.get_bool("activo").unwrap());
        assert_eq!(r.get_f64("precio").unwrap(), 10.0);
        assert_eq!(r.get_str("nombre").unwrap(), "Cafe");
        assert_eq!(r.get_opt_i64("cliente_id").unwrap(), None);
        assert!(r.get_i64("missing").is_err());
        assert!(r.get_str("stock").is_err());
    }

    #[test]
    fn datetime_accepts_both_text_forms() {
        let r = row(vec![
            ("a", SqlValue::Text(Some("2026-08-01T10:00:00+00:00".into()))),
            ("b", SqlValue::Text(Some("2026-08-01 10:00:00".into()))),
        ]);
        assert_eq!(r.get_datetime("a").unwrap(), r.get_datetime("b").unwrap());
    }

    #[test]
    fn typed_nulls_stay_typed() {
        let v: SqlValue = Option::<i64>::None.into();
        assert!(v.is_null());
        assert!(matches!(v, SqlValue::Int(None)));
    }
}
