//! # Abasto Inventory - Stock Ledger & Transfer Engine
//!
//! The single write path for branch stock. Two layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Inventory Crate Layout                               │
//! │                                                                         │
//! │  transfer.rs   TransferEngine, the inter-branch transfer state machine │
//! │       │        (crear / aprobar / recibir / cerrar / cancelar)         │
//! │       ▼                                                                 │
//! │  ledger.rs     debit_stock / credit_stock, the paired writers:         │
//! │                guarded balance UPDATE + movement row, same tx          │
//! │       │        (also used directly by the sale consumer)               │
//! │       ▼                                                                 │
//! │  abasto-db     Gateway / GatewayClient                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Ledger Invariant
//! No code path updates `inventario_sucursal` without writing a
//! `movimientos_inventario` row in the same transaction. The pair
//! writers in [`ledger`] are the only functions that touch the balance
//! column.

pub mod error;
pub mod ledger;
pub mod transfer;

pub use error::{InventoryError, InventoryResult};
pub use ledger::{
    credit_stock, debit_stock, Inventory, MovementContext, MovimientoRow, StockConsolidado,
    StockPorSucursal, StockRow,
};
pub use transfer::{
    NewTransfer, ReceiptLine, TransferDetail, TransferEngine, TransferLine, TransferSummary,
    Transferencia,
};
