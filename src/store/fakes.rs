//! In-memory [`PaymentStore`]/[`OutboxStore`]/[`TransactionManager`] used by
//! the lifecycle engine's unit tests, so the state machine and idempotency
//! scenarios (spec §8 S1-S6) run without a live Postgres.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{EventType, NewPayment, OutboxRecord, Payment, PaymentStatus};

use super::{OutboxStore, PaymentStore, StoreError, TransactionManager};

/// A no-op transaction handle: the in-memory store already serializes all
/// access through its own mutex, so there is nothing to thread.
pub struct NoopTx;

#[derive(Default)]
struct Inner {
    payments: HashMap<Uuid, Payment>,
    outbox: HashMap<Uuid, OutboxRecord>,
}

/// Fake store backing both [`PaymentStore`] and [`OutboxStore`] with the
/// same [`Inner`] state, mirroring how [`super::postgres::PostgresStore`]
/// backs both with the same pool.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.inner.lock().unwrap().outbox.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionManager for FakeStore {
    type Tx = NoopTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(NoopTx)
    }

    async fn commit(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for FakeStore {
    type Tx = NoopTx;

    async fn insert_pending(&self, new: NewPayment) -> Result<Payment, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .payments
            .values()
            .any(|p| p.idempotency_key == new.idempotency_key)
        {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        if inner.payments.values().any(|p| p.order_code == new.order_code) {
            return Err(StoreError::DuplicateOrderCode);
        }
        let now = Utc::now();
        let payment = Payment {
            id: new.id,
            order_code: new.order_code,
            idempotency_key: new.idempotency_key,
            amount_cents: new.amount_cents,
            currency: new.currency,
            provider: new.provider,
            provider_transaction_id: new.provider_transaction_id,
            redirect_url: new.redirect_url,
            payment_url: new.payment_url,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            metadata: new.metadata,
        };
        inner.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.idempotency_key == key)
            .cloned())
    }

    async fn find_by_order_code(&self, code: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.order_code == code)
            .cloned())
    }

    async fn find_by_provider_transaction_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.provider_transaction_id == provider_transaction_id)
            .cloned())
    }

    async fn lock_for_update(
        &self,
        _tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.lock().unwrap().payments.get(&id).cloned())
    }

    async fn update_status(
        &self,
        _tx: &mut Self::Tx,
        id: Uuid,
        to_status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(payment) = inner.payments.get_mut(&id) else {
            return Ok(false);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(false);
        }
        payment.status = to_status;
        payment.updated_at = at;
        match to_status {
            PaymentStatus::Completed => payment.completed_at = Some(at),
            PaymentStatus::Failed => payment.failed_at = Some(at),
            PaymentStatus::Cancelled => payment.cancelled_at = Some(at),
            PaymentStatus::Pending => {}
        }
        Ok(true)
    }
}

#[async_trait]
impl OutboxStore for FakeStore {
    type Tx = NoopTx;

    async fn append(
        &self,
        _tx: &mut Self::Tx,
        aggregate_id: Uuid,
        aggregate_type: &str,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<OutboxRecord, StoreError> {
        let record = OutboxRecord {
            id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type,
            payload,
            published: false,
            published_at: None,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .outbox
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn fetch_unpublished(
        &self,
        limit: u32,
        max_retries: u32,
    ) -> Result<Vec<OutboxRecord>, StoreError> {
        let mut rows: Vec<OutboxRecord> = self
            .inner
            .lock()
            .unwrap()
            .outbox
            .values()
            .filter(|r| !r.published && (r.retry_count as u32) < max_retries)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.outbox.get_mut(&id) {
            record.published = true;
            record.published_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn increment_retry(&self, id: Uuid, error_message: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.outbox.get_mut(&id) {
            record.retry_count += 1;
            record.last_error = Some(crate::domain::outbox::truncate_error(error_message));
        }
        Ok(())
    }

    async fn delete_published_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut inner = self.inner.lock().unwrap();
        let before = inner.outbox.len();
        inner
            .outbox
            .retain(|_, r| !(r.published && r.published_at.map(|at| at < cutoff).unwrap_or(false)));
        Ok((before - inner.outbox.len()) as u64)
    }

    async fn fetch_exhausted(&self, max_retries: u32) -> Result<Vec<OutboxRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .outbox
            .values()
            .filter(|r| !r.published && (r.retry_count as u32) >= max_retries)
            .cloned()
            .collect())
    }
}
