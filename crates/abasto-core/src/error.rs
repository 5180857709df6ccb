//! # Domain Error Types
//!
//! Business-rule violations raised by the transfer engine and the sale
//! ingestion pipeline.
//!
//! ## Taxonomy Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Error Taxonomy (system-wide)                        │
//! │                                                                         │
//! │  Connectivity failure   → GatewayError / SyncError (retryable infra)   │
//! │  Business-rule violation→ DomainError (THIS MODULE, never retried)     │
//! │  Idempotency skip       → not an error at all (logged, batch goes on)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `DomainError` means the request itself is wrong for the current
//! state of the world. Callers surface these to a human operator; they
//! must never be retried automatically.

use thiserror::Error;

/// Result type alias for domain-rule checks.
pub type DomainResult<T> = Result<T, DomainError>;

/// Business-rule violations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A debit would cross zero, or exceed what was sent.
    ///
    /// Physically impossible inventory is rejected up front rather than
    /// silently stored as a negative counter.
    #[error("insufficient stock for producto {producto_id} in sucursal {sucursal_id}: requested {solicitado}, available {disponible}")]
    InsufficientStock {
        sucursal_id: i64,
        producto_id: i64,
        solicitado: i64,
        disponible: i64,
    },

    /// No inventory record exists for this (branch, product) pair.
    ///
    /// Raised on the debit path only; the credit path creates the record
    /// lazily via upsert.
    #[error("no inventory record for producto {producto_id} in sucursal {sucursal_id}")]
    MissingInventoryRecord { sucursal_id: i64, producto_id: i64 },

    /// Transfer is not in a state that admits the requested transition.
    #[error("transferencia {id} is '{estado}', cannot {accion}")]
    InvalidTransferState {
        id: i64,
        estado: String,
        accion: &'static str,
    },

    /// Transfer header does not exist.
    #[error("transferencia {0} not found")]
    TransferNotFound(i64),

    /// A receipt referenced a product that is not a line of the transfer.
    #[error("producto {producto_id} is not part of transferencia {transfer_id}")]
    LineNotInTransfer { transfer_id: i64, producto_id: i64 },

    /// Received quantity would exceed the sent quantity for a line.
    #[error("transferencia {transfer_id}, producto {producto_id}: receiving {recibida} exceeds sent {enviada}")]
    ReceiptExceedsSent {
        transfer_id: i64,
        producto_id: i64,
        recibida: i64,
        enviada: i64,
    },

    /// A quantity that must be positive was zero or negative.
    #[error("cantidad must be positive, got {0}")]
    NonPositiveQuantity(i64),

    /// A transfer needs at least one line item.
    #[error("transferencia has no items")]
    EmptyTransfer,

    /// Origin and destination must differ.
    #[error("sucursal {0} cannot transfer to itself")]
    SameBranch(i64),

    /// Unknown `estado` string read back from storage.
    #[error("unknown transfer state '{0}'")]
    UnknownTransferState(String),

    /// Unknown `tipo` string read back from storage.
    #[error("unknown transfer kind '{0}'")]
    UnknownTransferKind(String),
}
