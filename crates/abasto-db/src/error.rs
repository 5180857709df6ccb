//! # Gateway Error Types
//!
//! Error types for the transactional data gateway.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  Backend error (sqlx::Error, either dialect)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  GatewayError (this module) ← categorized; Connectivity is retryable   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError / SyncError ← caller decides the user-visible outcome     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gateway never swallows errors: `transaction()` rolls back and
//! rethrows, so the invoking component always sees the original failure.

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway operation errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The active backend is unreachable.
    ///
    /// ## When This Occurs
    /// - Pool exhausted or closed
    /// - TCP/TLS failure towards Postgres
    /// - SQLite file unreadable
    ///
    /// Callers must treat this as a retryable infrastructure failure,
    /// never as a business error.
    #[error("backend unavailable: {0}")]
    Connectivity(String),

    /// `fetch_one` matched no row.
    #[error("no row matched the query")]
    NotFound,

    /// Unique constraint violation (both dialects).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation (both dialects).
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// A `$N` placeholder referenced a parameter that was not supplied.
    #[error("placeholder ${0} out of range for parameter list")]
    Placeholder(usize),

    /// A row value could not be decoded into a `SqlValue`.
    #[error("column decode failed: {0}")]
    Decode(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Any other query execution failure.
    #[error("query failed: {0}")]
    Query(String),
}

/// Convert sqlx errors to GatewayError.
///
/// ## Error Mapping
/// ```text
/// Io / Tls / PoolTimedOut / PoolClosed → Connectivity (retryable)
/// Database + SQLSTATE 23505 / "UNIQUE constraint failed"      → UniqueViolation
/// Database + SQLSTATE 23503 / "FOREIGN KEY constraint failed" → ForeignKeyViolation
/// RowNotFound                  → NotFound
/// ColumnDecode / ColumnNotFound → Decode
/// Other                        → Query
/// ```
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => GatewayError::Connectivity(e.to_string()),
            sqlx::Error::Tls(e) => GatewayError::Connectivity(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                GatewayError::Connectivity("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                GatewayError::Connectivity("connection pool is closed".to_string())
            }

            sqlx::Error::RowNotFound => GatewayError::NotFound,

            sqlx::Error::ColumnDecode { index, source } => {
                GatewayError::Decode(format!("column {index}: {source}"))
            }
            sqlx::Error::ColumnNotFound(name) => {
                GatewayError::Decode(format!("column not found: {name}"))
            }

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();

                // Postgres reports SQLSTATE codes; SQLite only a message.
                // 23505 = unique_violation, 23503 = foreign_key_violation
                let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                if code == "23505" || msg.contains("UNIQUE constraint failed") {
                    GatewayError::UniqueViolation(msg)
                } else if code == "23503" || msg.contains("FOREIGN KEY constraint failed") {
                    GatewayError::ForeignKeyViolation(msg)
                } else {
                    GatewayError::Query(msg)
                }
            }

            other => GatewayError::Query(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for GatewayError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        GatewayError::Migration(err.to_string())
    }
}

impl GatewayError {
    /// Whether the caller may retry the operation as-is.
    ///
    /// Only infrastructure failures qualify; everything else is either a
    /// caller bug or a constraint the retry would hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Connectivity(_))
    }
}
