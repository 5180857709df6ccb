//! # Sync Error Types
//!
//! The consumer's dispatch decision hangs on one question per error:
//! retryable (don't commit the offset, let the broker redeliver) or
//! poison (dead-letter the batch, then commit).

use thiserror::Error;

use abasto_db::GatewayError;
use abasto_inventory::InventoryError;

/// Errors from the ingestion pipeline and delta feed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Broker-level failure (connection, delivery, subscription).
    #[error("broker error: {0}")]
    Broker(#[from] rdkafka::error::KafkaError),

    /// Batch payload is not valid JSON for the expected shape.
    #[error("malformed batch payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Storage failure outside the ledger.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Ledger or transfer failure while applying a batch.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl SyncError {
    /// Whether the batch should be redelivered rather than dead-lettered.
    ///
    /// Only transient infrastructure failures qualify; malformed
    /// payloads and business-rule violations will fail identically on
    /// every redelivery.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Broker(_) => true,
            SyncError::Payload(_) => false,
            SyncError::Gateway(e) => e.is_retryable(),
            SyncError::Inventory(e) => e.is_retryable(),
        }
    }
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use abasto_core::DomainError;

    #[test]
    fn domain_failures_are_poison() {
        let err = SyncError::Inventory(InventoryError::Domain(
            DomainError::MissingInventoryRecord {
                sucursal_id: 1,
                producto_id: 2,
            },
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn connectivity_failures_are_retryable() {
        let err = SyncError::Gateway(GatewayError::Connectivity("pool timed out".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_payloads_are_poison() {
        let parse_err = serde_json::from_str::<abasto_core::SaleBatchMessage>("{").unwrap_err();
        assert!(!SyncError::Payload(parse_err).is_retryable());
    }
}
