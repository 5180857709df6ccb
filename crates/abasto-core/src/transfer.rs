//! # Transfer State Machine & Movement Kinds
//!
//! The inter-branch transfer lifecycle and the movement-ledger vocabulary.
//!
//! ## Transfer Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Transfer State Machine                              │
//! │                                                                         │
//! │  PUSH ("envio"): origin already holds the goods                        │
//! │     created ──────────────────────────────► en_transito                │
//! │     (origin stock debited at creation)                                  │
//! │                                                                         │
//! │  PULL ("solicitud"): destination requests goods                        │
//! │     created ──► solicitada ──(aprobar)──► en_transito                  │
//! │     (origin stock debited at approval)                                  │
//! │                                                                         │
//! │  RECEIPT:                                                              │
//! │     en_transito ──(all lines full)──────► completada                   │
//! │     en_transito ──(any line short)──────► recibida_parcial             │
//! │     recibida_parcial ──(more receipt / cerrar)──► completada           │
//! │                                                                         │
//! │  CANCEL: pendiente | solicitada ─────────► cancelada                   │
//! │          (once stock left origin, cancel is refused)                   │
//! │                                                                         │
//! │  Terminal states: completada, cancelada (no regression, ever)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

// =============================================================================
// Transfer Kind
// =============================================================================

/// How a transfer was initiated.
///
/// Determines the initial state and *when* origin stock is debited:
/// a push debits at creation, a pull only at approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Push: the holder of the stock ships proactively.
    Envio,
    /// Pull: the destination requests goods it does not yet hold.
    Solicitud,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Envio => "envio",
            TransferKind::Solicitud => "solicitud",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "envio" => Ok(TransferKind::Envio),
            "solicitud" => Ok(TransferKind::Solicitud),
            other => Err(DomainError::UnknownTransferKind(other.to_string())),
        }
    }

    /// State a freshly created transfer of this kind starts in.
    pub fn initial_state(&self) -> TransferState {
        match self {
            TransferKind::Envio => TransferState::EnTransito,
            TransferKind::Solicitud => TransferState::Solicitada,
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transfer State
// =============================================================================

/// Workflow state of a transfer header.
///
/// States progress monotonically; `Completada` and `Cancelada` are
/// terminal. Short-received transfers sit in `RecibidaParcial` until
/// either the remainder arrives or the caller force-closes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pendiente,
    Solicitada,
    EnTransito,
    RecibidaParcial,
    Completada,
    Cancelada,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pendiente => "pendiente",
            TransferState::Solicitada => "solicitada",
            TransferState::EnTransito => "en_transito",
            TransferState::RecibidaParcial => "recibida_parcial",
            TransferState::Completada => "completada",
            TransferState::Cancelada => "cancelada",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pendiente" => Ok(TransferState::Pendiente),
            "solicitada" => Ok(TransferState::Solicitada),
            "en_transito" => Ok(TransferState::EnTransito),
            "recibida_parcial" => Ok(TransferState::RecibidaParcial),
            "completada" => Ok(TransferState::Completada),
            "cancelada" => Ok(TransferState::Cancelada),
            other => Err(DomainError::UnknownTransferState(other.to_string())),
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completada | TransferState::Cancelada)
    }

    /// States from which receipt may be confirmed.
    pub fn accepts_receipt(&self) -> bool {
        matches!(
            self,
            TransferState::EnTransito | TransferState::RecibidaParcial
        )
    }

    /// States from which cancellation is allowed.
    ///
    /// Once stock has left the origin (`en_transito` and later) a cancel
    /// would strand the debited quantity, so it is refused.
    pub fn accepts_cancel(&self) -> bool {
        matches!(self, TransferState::Pendiente | TransferState::Solicitada)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Movement Kind
// =============================================================================

/// Vocabulary of the append-only movement ledger.
///
/// Every stock mutation writes exactly one movement row tagged with one
/// of these kinds; the ledger can then reconstruct `stock_actual`
/// independently of the mutable counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Entrada,
    Salida,
    Ajuste,
    Venta,
    Devolucion,
    TransferenciaSalida,
    TransferenciaEntrada,
    EntradaCompra,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entrada => "entrada",
            MovementKind::Salida => "salida",
            MovementKind::Ajuste => "ajuste",
            MovementKind::Venta => "venta",
            MovementKind::Devolucion => "devolucion",
            MovementKind::TransferenciaSalida => "transferencia_salida",
            MovementKind::TransferenciaEntrada => "transferencia_entrada",
            MovementKind::EntradaCompra => "entrada_compra",
        }
    }

    /// Whether this kind debits (`true`) or credits (`false`) stock.
    pub fn is_salida(&self) -> bool {
        matches!(
            self,
            MovementKind::Salida | MovementKind::Venta | MovementKind::TransferenciaSalida
        )
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrip() {
        for s in [
            TransferState::Pendiente,
            TransferState::Solicitada,
            TransferState::EnTransito,
            TransferState::RecibidaParcial,
            TransferState::Completada,
            TransferState::Cancelada,
        ] {
            assert_eq!(TransferState::parse(s.as_str()).unwrap(), s);
        }
        assert!(TransferState::parse("en_camino").is_err());
    }

    #[test]
    fn terminal_states_refuse_everything() {
        for s in [TransferState::Completada, TransferState::Cancelada] {
            assert!(s.is_terminal());
            assert!(!s.accepts_receipt());
            assert!(!s.accepts_cancel());
        }
    }

    #[test]
    fn push_starts_in_transit_pull_starts_requested() {
        assert_eq!(TransferKind::Envio.initial_state(), TransferState::EnTransito);
        assert_eq!(
            TransferKind::Solicitud.initial_state(),
            TransferState::Solicitada
        );
    }

    #[test]
    fn partial_receipt_accepts_more_receipt_but_not_cancel() {
        let s = TransferState::RecibidaParcial;
        assert!(s.accepts_receipt());
        assert!(!s.accepts_cancel());
    }
}
