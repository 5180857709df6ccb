//! # Schema Migrations
//!
//! One migration set per dialect, embedded at compile time. The two
//! `0001_init` files describe the same ten tables; they differ only in
//! storage classes (AUTOINCREMENT vs BIGSERIAL, TEXT timestamps vs
//! TIMESTAMPTZ) and are kept in lockstep by hand.

use sqlx::migrate::Migrator;

use crate::error::GatewayResult;
use crate::gateway::Pool;

static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("migrations/sqlite");
static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("migrations/postgres");

/// Runs all pending migrations for the pool's dialect.
pub(crate) async fn run(pool: &Pool) -> GatewayResult<()> {
    match pool {
        Pool::Sqlite(pool) => SQLITE_MIGRATOR.run(pool).await?,
        Pool::Postgres(pool) => POSTGRES_MIGRATOR.run(pool).await?,
    }
    Ok(())
}
