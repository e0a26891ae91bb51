//! The transaction capability (spec §9): the lifecycle engine opens exactly
//! one transaction per mutating operation and threads it into both the
//! payment store and the outbox store, so the status change and the event
//! append land atomically (spec invariant O1).

use async_trait::async_trait;

use super::StoreError;

#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// The transaction handle this store hands to its own mutating methods.
    type Tx: Send;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Commits a transaction opened with [`TransactionManager::begin`].
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
}
