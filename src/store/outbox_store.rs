//! Outbox Store (C3): appends event records transactionally, queries
//! unpublished rows, marks them published, and cleans up old ones (spec
//! §4.3).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{EventType, OutboxRecord};

use super::StoreError;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// The transaction handle produced by [`crate::store::TransactionManager::begin`].
    type Tx: Send;

    /// Writes one outbox row inside the supplied transaction (invariant
    /// O1: never called outside the transaction that also mutates the
    /// payment row).
    async fn append(
        &self,
        tx: &mut Self::Tx,
        aggregate_id: Uuid,
        aggregate_type: &str,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<OutboxRecord, StoreError>;

    /// Returns up to `limit` unpublished rows with `retryCount < maxRetries`,
    /// ordered by `createdAt` ascending (approximates global FIFO; ties
    /// broken by row id).
    async fn fetch_unpublished(
        &self,
        limit: u32,
        max_retries: u32,
    ) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Marks a row published (invariant O2: only after the bus has
    /// durably accepted the message).
    async fn mark_published(&self, id: Uuid) -> Result<(), StoreError>;

    /// Increments `retryCount` and stores a truncated error message
    /// (invariant O3: retryCount is monotonic non-decreasing).
    async fn increment_retry(&self, id: Uuid, error_message: &str) -> Result<(), StoreError>;

    /// Deletes published rows older than `days` (invariant O4). Returns the
    /// number of rows deleted.
    async fn delete_published_older_than(&self, days: i64) -> Result<u64, StoreError>;

    /// Returns unpublished rows that have reached `retryCount >=
    /// maxRetries`, for the exhausted-row alerting scan.
    async fn fetch_exhausted(&self, max_retries: u32) -> Result<Vec<OutboxRecord>, StoreError>;
}
