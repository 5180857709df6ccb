//! # abasto-core: Pure Domain Types
//!
//! Domain model shared by every other Abasto crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Abasto Domain Model                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │ TransferState   │   │ MovementKind    │   │  SaleBatchMessage   │   │
//! │  │ ─────────────── │   │ ─────────────── │   │  ─────────────────  │   │
//! │  │ Pendiente       │   │ Venta           │   │  sucursal_id        │   │
//! │  │ Solicitada      │   │ TransferSalida  │   │  ventas[]           │   │
//! │  │ EnTransito      │   │ TransferEntrada │   │  timestamp          │   │
//! │  │ RecibidaParcial │   │ Entrada/Salida  │   └─────────────────────┘   │
//! │  │ Completada      │   │ Ajuste ...      │                             │
//! │  │ Cancelada       │   └─────────────────┘                             │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! │  DomainError: business-rule violations (never retried automatically)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate performs no I/O. Persistence lives in `abasto-db`, stock
//! mutation in `abasto-inventory`, queue plumbing in `abasto-sync`.

pub mod error;
pub mod transfer;
pub mod venta;

pub use error::{DomainError, DomainResult};
pub use transfer::{MovementKind, TransferKind, TransferState};
pub use venta::{SaleBatchMessage, Venta, VentaItem, VentaPago};
