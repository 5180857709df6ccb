//! # Inventory Error Types
//!
//! One enum spanning the two failure families the callers care about:
//! business-rule violations ([`DomainError`], never retryable) and
//! storage failures ([`GatewayError`], retryable when connectivity).

use thiserror::Error;

use abasto_core::DomainError;
use abasto_db::GatewayError;

/// Errors from ledger and transfer operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A business rule was violated. Retrying cannot help.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The storage layer failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl InventoryError {
    /// Whether retrying the operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            InventoryError::Domain(_) => false,
            InventoryError::Gateway(e) => e.is_retryable(),
        }
    }
}

/// Result alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;
