//! # abasto-db: Transactional Data Gateway
//!
//! A single entry point for SQL access over two interchangeable
//! relational backends: an embedded file-based SQLite store for
//! small/offline deployments, and PostgreSQL in production.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Abasto Data Flow                                  │
//! │                                                                         │
//! │  abasto-inventory (transfer engine)    abasto-sync (sale consumer)     │
//! │       │                                     │                           │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   abasto-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   │   │
//! │  │   │   Gateway    │   │   dialect    │   │    Migrations    │   │   │
//! │  │   │ (gateway.rs) │   │ (dialect.rs) │   │ (per dialect,    │   │   │
//! │  │   │              │   │              │   │  embedded)       │   │   │
//! │  │   │ fetch        │◄──│ $N → ?       │   │ migrations/      │   │   │
//! │  │   │ execute      │   │ rewriting    │   │   sqlite/*.sql   │   │   │
//! │  │   │ transaction  │   │ for SQLite   │   │   postgres/*.sql │   │   │
//! │  │   │ client       │   └──────────────┘   └──────────────────┘   │   │
//! │  │   └──────────────┘                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                      │                                                  │
//! │            ┌─────────┴──────────┐                                       │
//! │            ▼                    ▼                                       │
//! │      SQLite file          PostgreSQL server                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Contract
//!
//! All SQL is written once, in the canonical Postgres `$N` placeholder
//! syntax. Against SQLite the gateway silently rewrites placeholders and
//! reorders parameters; callers never branch on backend. Generated
//! identities come back uniformly via `INSERT … RETURNING id`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use abasto_db::{Gateway, GatewayConfig, SqlValue};
//!
//! let gateway = Gateway::connect(GatewayConfig::sqlite("abasto.db")).await?;
//!
//! let rows = gateway
//!     .fetch("SELECT nombre FROM sucursales WHERE id = $1", &[1i64.into()])
//!     .await?;
//!
//! gateway
//!     .transaction(|client| Box::pin(async move {
//!         client.execute("UPDATE …", &[…]).await?;
//!         client.execute("INSERT …", &[…]).await?;
//!         Ok::<_, abasto_db::GatewayError>(())
//!     }))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod dialect;
pub mod error;
pub mod gateway;
pub mod migrations;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{GatewayError, GatewayResult};
pub use gateway::{Backend, Gateway, GatewayClient, GatewayConfig};
pub use value::{ExecResult, SqlRow, SqlValue};
