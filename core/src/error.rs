//! Error types for allocation, ledger and migration operations.

use crate::types::{OrderId, OrderStatus, ProductId, SkuId};
use thiserror::Error;

/// Result type alias for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Error taxonomy of the fulfillment engine.
///
/// Variants fall into three groups: client input that must not be retried, business
/// conditions a caller can recover from, and invariant or infrastructure failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    // ═══════════════════════════════════════════════════════════
    // Recoverable business conditions
    // ═══════════════════════════════════════════════════════════

    /// Reserving would drive the SKU's available stock negative.
    #[error("Insufficient stock for SKU {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// SKU that ran short
        sku_id: SkuId,
        /// Units requested
        requested: u32,
        /// Units that were available
        available: u32,
    },

    /// No `available` secret exists for this exact product/SKU pair.
    #[error("Secret pool exhausted for product {product_id} SKU {sku_id}")]
    PoolExhausted {
        /// Product requested
        product_id: ProductId,
        /// SKU requested
        sku_id: SkuId,
    },

    /// Every optimistic allocation attempt lost its race.
    #[error("Allocation for product {product_id} SKU {sku_id} conflicted {attempts} times")]
    AllocationConflict {
        /// Product requested
        product_id: ProductId,
        /// SKU requested
        sku_id: SkuId,
        /// Attempts made
        attempts: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Client input
    // ═══════════════════════════════════════════════════════════

    /// The SKU does not exist, belongs to another product, or is inactive.
    #[error("SKU {sku_id} is not valid for product {product_id}")]
    SkuInvalid {
        /// Product the SKU was requested for
        product_id: ProductId,
        /// SKU requested (`0` when none was given)
        sku_id: SkuId,
    },

    /// The product has several active SKUs and none was specified.
    #[error("Product {product_id} has {active_skus} active SKUs, an explicit SKU is required")]
    SkuRequired {
        /// Product requested
        product_id: ProductId,
        /// Number of active SKUs found
        active_skus: usize,
    },

    /// Quantity must be at least one.
    #[error("Quantity must be positive")]
    InvalidQuantity,

    /// The product does not exist or is not on sale.
    #[error("Product {0} is not available")]
    ProductUnavailable(ProductId),

    /// One or more payloads already exist in the pool.
    #[error("Duplicate secrets: {}", .payloads.join(", "))]
    DuplicateSecret {
        /// Payloads that collided
        payloads: Vec<String>,
    },

    /// A payload spans several lines and would not survive delivery intact.
    #[error("Secret payload contains a line break: {0:?}")]
    MultilineSecret(String),

    /// The order does not exist.
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    /// The order is not in a state that allows the requested operation.
    #[error("Order {order_id} is {status}")]
    OrderNotPayable {
        /// Order requested
        order_id: OrderId,
        /// Status it was found in
        status: OrderStatus,
    },

    // ═══════════════════════════════════════════════════════════
    // Invariant and infrastructure failures
    // ═══════════════════════════════════════════════════════════

    /// A counter invariant would have been violated. Indicates an upstream bug.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller's deadline expired; the enclosing transaction was rolled back.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The legacy migration could not complete. Fatal to startup.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Storage failure.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl FulfillmentError {
    /// Returns `true` if the caller supplied unusable input and should not retry.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SkuInvalid { .. }
                | Self::SkuRequired { .. }
                | Self::InvalidQuantity
                | Self::ProductUnavailable(_)
                | Self::DuplicateSecret { .. }
                | Self::MultilineSecret(_)
                | Self::OrderNotFound(_)
                | Self::OrderNotPayable { .. }
        )
    }

    /// Returns `true` if the business layer can recover, e.g. by lowering the quantity
    /// or parking the order item for manual intervention.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. }
                | Self::PoolExhausted { .. }
                | Self::AllocationConflict { .. }
                | Self::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let errors = [
            FulfillmentError::InsufficientStock {
                sku_id: SkuId::new(1),
                requested: 2,
                available: 1,
            },
            FulfillmentError::PoolExhausted {
                product_id: ProductId::new(1),
                sku_id: SkuId::new(1),
            },
            FulfillmentError::SkuRequired {
                product_id: ProductId::new(1),
                active_skus: 2,
            },
            FulfillmentError::InvalidState("locked < qty".to_string()),
            FulfillmentError::MigrationFailed("boom".to_string()),
        ];
        for error in &errors {
            assert!(!(error.is_client_error() && error.is_recoverable()), "{error}");
        }
        assert!(errors[0].is_recoverable());
        assert!(errors[2].is_client_error());
        assert!(!errors[3].is_recoverable() && !errors[3].is_client_error());
    }

    #[test]
    fn duplicate_secret_lists_payloads() {
        let error = FulfillmentError::DuplicateSecret {
            payloads: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(error.to_string(), "Duplicate secrets: A, B");
    }
}
