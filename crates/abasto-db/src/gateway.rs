//! # The Gateway
//!
//! Connection pool creation plus the uniform transactional contract.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Gateway Lifecycle                                  │
//! │                                                                         │
//! │  GatewayConfig::sqlite(path) | ::postgres(url) | ::in_memory()         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Gateway::connect(config).await ← create pool + run migrations         │
//! │       │                                                                 │
//! │       ├── fetch / fetch_optional / fetch_one   (reads)                 │
//! │       ├── execute                              (writes)                │
//! │       ├── transaction(|client| …)              (all-or-nothing)        │
//! │       └── client()                             (manual commit/rollback)│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode (SQLite backend)
//! WAL is enabled so readers don't block the single writer: the sale
//! consumer and the transfer engine routinely read while the other
//! writes.
//!
//! ## Transaction Semantics
//! Identical on both backends: `transaction()` commits on `Ok`, rolls
//! back and rethrows on `Err`; each invocation owns its connection, so
//! concurrent transactions never share cursor state. Dropping an
//! uncommitted [`GatewayClient`] rolls back.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Postgres, Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::dialect;
use crate::error::{GatewayError, GatewayResult};
use crate::migrations;
use crate::value::{
    bind_pg, bind_sqlite, decode_pg_row, decode_sqlite_row, ExecResult, SqlRow, SqlValue,
};

// =============================================================================
// Configuration
// =============================================================================

/// Which relational backend the gateway runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded file-based store (small/offline deployments).
    Sqlite,
    /// Client-server store (production).
    Postgres,
}

/// Gateway configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = GatewayConfig::sqlite("./data/abasto.db")
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub backend: Backend,

    /// SQLite file path, or Postgres connection URL.
    pub target: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on connect.
    pub run_migrations: bool,
}

impl GatewayConfig {
    /// Configuration for the embedded SQLite backend.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        GatewayConfig {
            backend: Backend::Sqlite,
            target: path.into().display().to_string(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// Configuration for the PostgreSQL backend.
    pub fn postgres(url: impl Into<String>) -> Self {
        GatewayConfig {
            backend: Backend::Postgres,
            target: url.into(),
            max_connections: 20,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// In-memory SQLite configuration (for testing).
    ///
    /// A single connection with no idle timeout; an in-memory database
    /// lives exactly as long as its one connection.
    pub fn in_memory() -> Self {
        GatewayConfig {
            backend: Backend::Sqlite,
            target: ":memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) enum Pool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// The transactional data gateway.
///
/// Cheap to clone (the pool is internally reference-counted); every
/// component that needs SQL access holds one.
#[derive(Debug, Clone)]
pub struct Gateway {
    pool: Pool,
    backend: Backend,
}

impl Gateway {
    /// Connects to the configured backend and runs migrations.
    pub async fn connect(config: GatewayConfig) -> GatewayResult<Self> {
        let pool = match config.backend {
            Backend::Sqlite => {
                info!(path = %config.target, "connecting embedded sqlite backend");

                let base = if config.target == ":memory:" {
                    SqliteConnectOptions::from_str("sqlite::memory:")
                        .map_err(|e| GatewayError::Connectivity(e.to_string()))?
                } else {
                    SqliteConnectOptions::from_str(&format!("sqlite://{}", config.target))
                        .map_err(|e| GatewayError::Connectivity(e.to_string()))?
                        .create_if_missing(true)
                };
                // WAL: readers don't block the writer
                let options = base
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(config.connect_timeout)
                    .idle_timeout(config.idle_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| GatewayError::Connectivity(e.to_string()))?;

                Pool::Sqlite(pool)
            }
            Backend::Postgres => {
                info!("connecting postgres backend");

                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(config.connect_timeout)
                    .idle_timeout(config.idle_timeout)
                    .connect(&config.target)
                    .await
                    .map_err(|e| GatewayError::Connectivity(e.to_string()))?;

                Pool::Postgres(pool)
            }
        };

        let gateway = Gateway {
            pool,
            backend: config.backend,
        };

        if config.run_migrations {
            gateway.run_migrations().await?;
        }

        Ok(gateway)
    }

    /// The active backend.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Applies all pending migrations for the active dialect.
    pub async fn run_migrations(&self) -> GatewayResult<()> {
        info!("running migrations");
        migrations::run(&self.pool).await?;
        Ok(())
    }

    /// Executes a read statement; returns decoded rows.
    pub async fn fetch(&self, sql: &str, params: &[SqlValue]) -> GatewayResult<Vec<SqlRow>> {
        debug!(sql, "gateway fetch");
        match &self.pool {
            Pool::Sqlite(pool) => {
                let (sql, params) = dialect::sqlite_sql(sql, params)?;
                let rows = bind_sqlite(sqlx::query(&sql), &params)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(decode_sqlite_row).collect()
            }
            Pool::Postgres(pool) => {
                let rows = bind_pg(sqlx::query(sql), params).fetch_all(pool).await?;
                rows.iter().map(decode_pg_row).collect()
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but expects zero or one row.
    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> GatewayResult<Option<SqlRow>> {
        Ok(self.fetch(sql, params).await?.into_iter().next())
    }

    /// Like [`fetch`](Self::fetch) but requires exactly one row.
    pub async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> GatewayResult<SqlRow> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or(GatewayError::NotFound)
    }

    /// Executes a write statement; returns affected-row count and, on
    /// SQLite, the generated rowid.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> GatewayResult<ExecResult> {
        debug!(sql, "gateway execute");
        match &self.pool {
            Pool::Sqlite(pool) => {
                let (sql, params) = dialect::sqlite_sql(sql, params)?;
                let result = bind_sqlite(sqlx::query(&sql), &params)
                    .execute(pool)
                    .await?;
                Ok(ExecResult {
                    rows_affected: result.rows_affected(),
                    last_insert_id: Some(result.last_insert_rowid()),
                })
            }
            Pool::Postgres(pool) => {
                let result = bind_pg(sqlx::query(sql), params).execute(pool).await?;
                Ok(ExecResult {
                    rows_affected: result.rows_affected(),
                    last_insert_id: None,
                })
            }
        }
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits on `Ok`, rolls back and rethrows on `Err`. The closure
    /// receives a [`GatewayClient`] exposing the same fetch/execute
    /// surface as the gateway itself.
    ///
    /// ## Example
    /// ```rust,ignore
    /// gateway.transaction(|client| Box::pin(async move {
    ///     client.execute("UPDATE inventario_sucursal …", &params).await?;
    ///     client.execute("INSERT INTO movimientos_inventario …", &params).await?;
    ///     Ok::<_, GatewayError>(())
    /// })).await?;
    /// ```
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<GatewayError>,
        F: for<'c> FnOnce(&'c mut GatewayClient) -> BoxFuture<'c, Result<T, E>>,
    {
        let mut client = self.client().await?;
        match f(&mut client).await {
            Ok(value) => {
                client.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = client.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after transaction error");
                }
                Err(err)
            }
        }
    }

    /// Returns a manually-released transactional handle.
    ///
    /// The caller owns commit/rollback; dropping the client without
    /// committing rolls the transaction back.
    pub async fn client(&self) -> GatewayResult<GatewayClient> {
        let tx = match &self.pool {
            Pool::Sqlite(pool) => ClientTx::Sqlite(pool.begin().await?),
            Pool::Postgres(pool) => ClientTx::Postgres(pool.begin().await?),
        };
        Ok(GatewayClient { tx })
    }

    /// Checks whether the backend answers a trivial query.
    pub async fn health_check(&self) -> bool {
        self.fetch("SELECT 1", &[]).await.is_ok()
    }

    /// Closes the pool. All subsequent operations fail.
    pub async fn close(&self) {
        info!("closing gateway pool");
        match &self.pool {
            Pool::Sqlite(pool) => pool.close().await,
            Pool::Postgres(pool) => pool.close().await,
        }
    }
}

// =============================================================================
// GatewayClient
// =============================================================================

enum ClientTx {
    Sqlite(Transaction<'static, Sqlite>),
    Postgres(Transaction<'static, Postgres>),
}

/// A scoped transactional client.
///
/// Same query contract as [`Gateway`], but every statement runs on one
/// transaction. Obtained from [`Gateway::transaction`] or
/// [`Gateway::client`].
pub struct GatewayClient {
    tx: ClientTx,
}

impl GatewayClient {
    /// Executes a read statement inside the transaction.
    pub async fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> GatewayResult<Vec<SqlRow>> {
        debug!(sql, "client fetch");
        match &mut self.tx {
            ClientTx::Sqlite(tx) => {
                let (sql, params) = dialect::sqlite_sql(sql, params)?;
                let rows = bind_sqlite(sqlx::query(&sql), &params)
                    .fetch_all(&mut **tx)
                    .await?;
                rows.iter().map(decode_sqlite_row).collect()
            }
            ClientTx::Postgres(tx) => {
                let rows = bind_pg(sqlx::query(sql), params)
                    .fetch_all(&mut **tx)
                    .await?;
                rows.iter().map(decode_pg_row).collect()
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but expects zero or one row.
    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> GatewayResult<Option<SqlRow>> {
        Ok(self.fetch(sql, params).await?.into_iter().next())
    }

    /// Like [`fetch`](Self::fetch) but requires exactly one row.
    pub async fn fetch_one(&mut self, sql: &str, params: &[SqlValue]) -> GatewayResult<SqlRow> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or(GatewayError::NotFound)
    }

    /// Executes a write statement inside the transaction.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> GatewayResult<ExecResult> {
        debug!(sql, "client execute");
        match &mut self.tx {
            ClientTx::Sqlite(tx) => {
                let (sql, params) = dialect::sqlite_sql(sql, params)?;
                let result = bind_sqlite(sqlx::query(&sql), &params)
                    .execute(&mut **tx)
                    .await?;
                Ok(ExecResult {
                    rows_affected: result.rows_affected(),
                    last_insert_id: Some(result.last_insert_rowid()),
                })
            }
            ClientTx::Postgres(tx) => {
                let result = bind_pg(sqlx::query(sql), params).execute(&mut **tx).await?;
                Ok(ExecResult {
                    rows_affected: result.rows_affected(),
                    last_insert_id: None,
                })
            }
        }
    }

    /// Commits the transaction, consuming the client.
    pub async fn commit(self) -> GatewayResult<()> {
        match self.tx {
            ClientTx::Sqlite(tx) => tx.commit().await?,
            ClientTx::Postgres(tx) => tx.commit().await?,
        }
        Ok(())
    }

    /// Rolls the transaction back, consuming the client.
    ///
    /// Dropping the client has the same effect; calling this makes the
    /// intent (and any error) visible.
    pub async fn rollback(self) -> GatewayResult<()> {
        match self.tx {
            ClientTx::Sqlite(tx) => tx.rollback().await?,
            ClientTx::Postgres(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn scratch_gateway() -> Gateway {
        let gateway = Gateway::connect(GatewayConfig::in_memory()).await.unwrap();
        gateway
            .execute(
                "CREATE TABLE scratch (id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 nombre TEXT NOT NULL UNIQUE, cantidad INTEGER NOT NULL)",
                &[],
            )
            .await
            .unwrap();
        gateway
    }

    #[tokio::test]
    async fn connect_and_health_check() {
        let gateway = Gateway::connect(GatewayConfig::in_memory()).await.unwrap();
        assert!(gateway.health_check().await);
        assert_eq!(gateway.backend(), Backend::Sqlite);
    }

    #[tokio::test]
    async fn canonical_placeholders_against_sqlite() {
        let gateway = scratch_gateway().await;

        let result = gateway
            .execute(
                "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)",
                &["cafe".into(), 3i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, Some(1));

        // out-of-order and duplicate references
        let row = gateway
            .fetch_one(
                "SELECT nombre, cantidad FROM scratch WHERE cantidad = $2 AND nombre = $1 AND cantidad = $2",
                &["cafe".into(), 3i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(row.get_str("nombre").unwrap(), "cafe");
        assert_eq!(row.get_i64("cantidad").unwrap(), 3);
    }

    #[tokio::test]
    async fn insert_returning_id_is_portable() {
        let gateway = scratch_gateway().await;
        let row = gateway
            .fetch_one(
                "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2) RETURNING id",
                &["te".into(), 1i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(row.get_i64("id").unwrap(), 1);
    }

    #[tokio::test]
    async fn transaction_commits_on_ok() {
        let gateway = scratch_gateway().await;
        gateway
            .transaction(|client| {
                Box::pin(async move {
                    client
                        .execute(
                            "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)",
                            &["a".into(), 1i64.into()],
                        )
                        .await?;
                    client
                        .execute(
                            "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)",
                            &["b".into(), 2i64.into()],
                        )
                        .await?;
                    Ok::<_, GatewayError>(())
                })
            })
            .await
            .unwrap();

        let rows = gateway.fetch("SELECT id FROM scratch", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn transaction_rolls_back_and_rethrows_on_err() {
        let gateway = scratch_gateway().await;
        let result: Result<(), GatewayError> = gateway
            .transaction(|client| {
                Box::pin(async move {
                    client
                        .execute(
                            "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)",
                            &["a".into(), 1i64.into()],
                        )
                        .await?;
                    Err(GatewayError::Query("forced failure".to_string()))
                })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Query(_))));
        let rows = gateway.fetch("SELECT id FROM scratch", &[]).await.unwrap();
        assert!(rows.is_empty(), "first insert must be rolled back");
    }

    #[tokio::test]
    async fn manual_client_rolls_back_on_drop() {
        let gateway = scratch_gateway().await;
        {
            let mut client = gateway.client().await.unwrap();
            client
                .execute(
                    "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)",
                    &["x".into(), 9i64.into()],
                )
                .await
                .unwrap();
            // dropped without commit
        }
        let rows = gateway.fetch("SELECT id FROM scratch", &[]).await.unwrap();
        assert!(rows.is_empty());

        let mut client = gateway.client().await.unwrap();
        client
            .execute(
                "INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)",
                &["y".into(), 8i64.into()],
            )
            .await
            .unwrap();
        client.commit().await.unwrap();
        let rows = gateway.fetch("SELECT id FROM scratch", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn unique_violation_is_categorized() {
        let gateway = scratch_gateway().await;
        let params: Vec<SqlValue> = vec!["dup".into(), 1i64.into()];
        gateway
            .execute("INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)", &params)
            .await
            .unwrap();
        let err = gateway
            .execute("INSERT INTO scratch (nombre, cantidad) VALUES ($1, $2)", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UniqueViolation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn fetch_one_on_empty_is_not_found() {
        let gateway = scratch_gateway().await;
        let err = gateway
            .fetch_one("SELECT id FROM scratch WHERE id = $1", &[42i64.into()])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound));
    }
}
