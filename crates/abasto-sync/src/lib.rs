//! # Abasto Sync - Sale Ingestion Pipeline
//!
//! Branch POS stations sell offline and publish completed sales in
//! batches. This crate is the central end of that pipe.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sale Ingestion Flow                                  │
//! │                                                                         │
//! │  branch POS ──publish──► sync_ventas (topic)                       │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  consumer.rs   SyncConsumer: one batch = one DB transaction            │
//! │                              │                                          │
//! │                ┌─────────────┼──────────────────┐                       │
//! │                ▼             ▼                  ▼                       │
//! │          applied OK    infra error        poison batch                 │
//! │          commit offset no commit, 5s      → dead-letter topic          │
//! │                        pause, redeliver   → then commit offset         │
//! │                              │                                          │
//! │  apply.rs      per-sale idempotency (venta id), ledger debit per item  │
//! │                                                                         │
//! │  service.rs    delta feed: products / price overrides / stock          │
//! │                changed since a branch's last pull                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Offsets are committed only after the database transaction commits;
//! at-least-once delivery plus per-sale idempotency gives effective
//! exactly-once application.

pub mod apply;
pub mod broker;
pub mod consumer;
pub mod error;
pub mod service;

pub use apply::{apply_batch, BatchOutcome};
pub use broker::BrokerConfig;
pub use consumer::SyncConsumer;
pub use error::{SyncError, SyncResult};
pub use service::{ProductoDelta, SyncService};
