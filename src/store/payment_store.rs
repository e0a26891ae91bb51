//! Payment Store (C2): persists payment records, enforces uniqueness on
//! idempotency key and order code (spec §4.2).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewPayment, Payment, PaymentStatus};

use super::StoreError;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// The transaction handle produced by [`crate::store::TransactionManager::begin`].
    type Tx: Send;

    /// Inserts a new `Pending` payment. Fails with
    /// [`StoreError::DuplicateIdempotencyKey`] or
    /// [`StoreError::DuplicateOrderCode`] if either uniqueness constraint
    /// (invariants I1/I2) is violated.
    async fn insert_pending(&self, new: NewPayment) -> Result<Payment, StoreError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, StoreError>;

    async fn find_by_order_code(&self, code: &str) -> Result<Option<Payment>, StoreError>;

    async fn find_by_provider_transaction_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// Locks the payment row for update within `tx` (`SELECT ... FOR
    /// UPDATE`), serializing concurrent webhooks for the same payment.
    async fn lock_for_update(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// Moves the payment to `to_status`, stamping the matching timestamp
    /// column (invariant I4). Guards against a lost update with a
    /// conditional `WHERE status = 'PENDING'`; returns whether the row was
    /// actually updated.
    async fn update_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        to_status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
