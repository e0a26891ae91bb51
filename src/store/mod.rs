//! Persistence layer: the payment store (C2), the outbox store (C3), and
//! the shared transaction capability the lifecycle engine threads through
//! both (spec §9 "Transaction context threading").

#[cfg(test)]
pub mod fakes;
pub mod outbox_store;
pub mod payment_store;
pub mod postgres;
pub mod transaction;

pub use outbox_store::OutboxStore;
pub use payment_store::PaymentStore;
pub use transaction::TransactionManager;

/// Errors shared across the payment and outbox stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Violates invariant I1: `idempotencyKey` must be globally unique.
    #[error("duplicate idempotency key")]
    DuplicateIdempotencyKey,
    /// Violates invariant I2: `orderCode` must be globally unique.
    #[error("duplicate order code")]
    DuplicateOrderCode,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
