//! Lifecycle Engine (C4): the single writer of payment status. Owns the
//! transactional envelope that writes the payment row and the outbox row
//! together (spec §4.4, invariant O1).

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::adapters::{
    AdapterError, AdapterRegistry, CreatePaymentLinkInput, PaymentLink, ProviderAdapter,
};
use crate::domain::{EventPayload, EventType, NewPayment, Payment, PaymentStatus, Provider};
use crate::store::{OutboxStore, PaymentStore, StoreError, TransactionManager};

/// Bound satisfied by any store that implements all three storage traits
/// with the same transaction handle, so the engine can open one
/// transaction and pass it to both stores (spec §9 "transaction context
/// threading").
pub trait Store:
    PaymentStore<Tx = <Self as PaymentStore>::Tx>
    + OutboxStore<Tx = <Self as PaymentStore>::Tx>
    + TransactionManager<Tx = <Self as PaymentStore>::Tx>
{
}

impl<T> Store for T where
    T: PaymentStore
        + OutboxStore<Tx = <T as PaymentStore>::Tx>
        + TransactionManager<Tx = <T as PaymentStore>::Tx>
{
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("payment not found")]
    PaymentNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Input to [`LifecycleEngine::create_intent`] (spec §4.4 `createIntent`).
#[derive(Debug, Clone)]
pub struct CreateIntentInput {
    pub amount_cents: i64,
    pub order_code: String,
    pub currency: crate::domain::Currency,
    pub provider: Provider,
    pub idempotency_key: String,
    pub redirect_url: String,
    pub timeout_seconds: i32,
    pub metadata: serde_json::Value,
}

pub struct LifecycleEngine<S: Store> {
    store: Arc<S>,
    adapters: Arc<AdapterRegistry>,
}

impl<S: Store> LifecycleEngine<S> {
    pub fn new(store: Arc<S>, adapters: Arc<AdapterRegistry>) -> Self {
        Self { store, adapters }
    }

    /// Creates a payment intent, or returns the already-persisted URL on a
    /// replayed idempotency key (spec §4.4 step 1; invariant: at most one
    /// row per `idempotencyKey`).
    #[tracing::instrument(skip(self, input), fields(idempotency_key = %input.idempotency_key))]
    pub async fn create_intent(&self, input: CreateIntentInput) -> Result<String, LifecycleError> {
        if let Some(existing) = self
            .store
            .find_by_idempotency_key(&input.idempotency_key)
            .await?
        {
            return Ok(existing.payment_url);
        }

        let adapter = self.adapters.get(input.provider);
        let link = adapter
            .create_payment_link(CreatePaymentLinkInput {
                amount_cents: input.amount_cents,
                order_code: input.order_code.clone(),
                currency: input.currency,
                idempotency_key: input.idempotency_key.clone(),
                redirect_url: input.redirect_url.clone(),
                timeout_seconds: input.timeout_seconds,
            })
            .await?;

        match self.insert_pending(&input, &link).await {
            Ok(payment) => Ok(payment.payment_url),
            // A provider link now exists with no local row. The caller
            // retries with the same idempotency key and the next attempt
            // short-circuits above; the orphan expires at the provider on
            // its own `timeoutSeconds` (spec §4.4 step 3 note).
            Err(StoreError::DuplicateIdempotencyKey) => {
                let existing = self
                    .store
                    .find_by_idempotency_key(&input.idempotency_key)
                    .await?
                    .ok_or(LifecycleError::PaymentNotFound)?;
                Ok(existing.payment_url)
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn insert_pending(
        &self,
        input: &CreateIntentInput,
        link: &PaymentLink,
    ) -> Result<Payment, StoreError> {
        self.store
            .insert_pending(NewPayment {
                id: Uuid::new_v4(),
                order_code: input.order_code.clone(),
                idempotency_key: input.idempotency_key.clone(),
                amount_cents: input.amount_cents,
                currency: input.currency,
                provider: input.provider,
                provider_transaction_id: link.provider_transaction_id.clone(),
                redirect_url: input.redirect_url.clone(),
                payment_url: link.payment_url.clone(),
                metadata: input.metadata.clone(),
            })
            .await
    }

    /// Returns the persisted URL and status for a previously created
    /// intent (spec §4.7 `GetPaymentUrlByIdempotencyKey`).
    pub async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, LifecycleError> {
        Ok(self.store.find_by_idempotency_key(idempotency_key).await?)
    }

    /// Moves a payment to `COMPLETED` on a successful webhook (spec §4.4
    /// `completeByProviderTxId`).
    pub async fn complete_by_provider_tx_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<(), LifecycleError> {
        self.transition(
            provider_transaction_id,
            PaymentStatus::Completed,
            EventType::PaymentCompleted,
        )
        .await
    }

    /// Moves a payment to `FAILED` (spec §4.4 `failByProviderTxId`).
    pub async fn fail_by_provider_tx_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<(), LifecycleError> {
        self.transition(
            provider_transaction_id,
            PaymentStatus::Failed,
            EventType::PaymentFailed,
        )
        .await
    }

    /// Moves a payment to `CANCELLED` by order code (spec §4.4
    /// `cancelByOrderCode`; engine-level only, no RPC surface — spec §9
    /// open question).
    pub async fn cancel_by_order_code(&self, order_code: &str) -> Result<(), LifecycleError> {
        let payment = self
            .store
            .find_by_order_code(order_code)
            .await?
            .ok_or(LifecycleError::PaymentNotFound)?;
        self.transition(
            &payment.provider_transaction_id,
            PaymentStatus::Cancelled,
            EventType::PaymentCancelled,
        )
        .await
    }

    /// Shared implementation of the three terminal transitions: resolve,
    /// lock the row inside the transaction, check the DAG edge, mutate, and
    /// append the matching outbox event, all inside one transaction (spec
    /// §4.4 state machine, §5 "the Lifecycle Engine locks the payment row
    /// inside the mutating transaction").
    #[tracing::instrument(skip(self))]
    async fn transition(
        &self,
        provider_transaction_id: &str,
        to_status: PaymentStatus,
        event_type: EventType,
    ) -> Result<(), LifecycleError> {
        let payment_id = self
            .store
            .find_by_provider_transaction_id(provider_transaction_id)
            .await?
            .ok_or(LifecycleError::PaymentNotFound)?
            .id;

        let mut tx = self.store.begin().await?;

        let Some(payment) = self.store.lock_for_update(&mut tx, payment_id).await? else {
            self.store.commit(tx).await?;
            return Err(LifecycleError::PaymentNotFound);
        };

        if payment.status == to_status {
            // Duplicate matching webhook: idempotent no-op (spec §4.4).
            self.store.commit(tx).await?;
            return Ok(());
        }
        if payment.status.is_terminal() {
            // Non-matching terminal clash: a conflict, logged but still
            // acknowledged to the provider (spec §4.4, §7).
            tracing::warn!(
                payment_id = %payment.id,
                current_status = ?payment.status,
                attempted_status = ?to_status,
                "state transition conflict"
            );
            self.store.commit(tx).await?;
            return Ok(());
        }

        let at = Utc::now();
        let updated = self
            .store
            .update_status(&mut tx, payment.id, to_status, at)
            .await?;
        if !updated {
            // Lost the race to a concurrent webhook; the winner already
            // appended the event. Nothing further to do.
            self.store.commit(tx).await?;
            return Ok(());
        }

        let payload = build_event_payload(&payment, to_status, at);
        self.store
            .append(
                &mut tx,
                payment.id,
                "Payment",
                event_type,
                serde_json::to_value(payload).expect("EventPayload always serializes"),
            )
            .await?;

        self.store.commit(tx).await?;
        Ok(())
    }
}

fn build_event_payload(payment: &Payment, to_status: PaymentStatus, at: chrono::DateTime<Utc>) -> EventPayload {
    let mut payload = EventPayload {
        payment_id: payment.id,
        order_code: payment.order_code.clone(),
        amount_cents: payment.amount_cents,
        currency: payment.currency,
        provider: payment.provider,
        transaction_id: payment.provider_transaction_id.clone(),
        completed_at: None,
        failed_at: None,
        cancelled_at: None,
    };
    match to_status {
        PaymentStatus::Completed => payload.completed_at = Some(at),
        PaymentStatus::Failed => payload.failed_at = Some(at),
        PaymentStatus::Cancelled => payload.cancelled_at = Some(at),
        PaymentStatus::Pending => {}
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PayOsConfig, ProvidersConfig, ZaloPayConfig};
    use crate::domain::Currency;
    use crate::store::fakes::FakeStore;

    fn test_engine() -> LifecycleEngine<FakeStore> {
        let providers = ProvidersConfig {
            zalopay: ZaloPayConfig {
                app_id: "2554".into(),
                key1: "key1".into(),
                key2: "key2".into(),
            },
            payos: PayOsConfig {
                client_id: "client".into(),
                api_key: "key".into(),
                checksum_key: "checksum".into(),
            },
        };
        let webhook_base_url = "https://example.com".parse().unwrap();
        LifecycleEngine::new(
            Arc::new(FakeStore::new()),
            Arc::new(AdapterRegistry::new(&providers, &webhook_base_url)),
        )
    }

    fn base_input(idempotency_key: &str, order_code: &str) -> CreateIntentInput {
        CreateIntentInput {
            amount_cents: 100_000,
            order_code: order_code.into(),
            currency: Currency::Vnd,
            provider: Provider::Payos,
            idempotency_key: idempotency_key.into(),
            redirect_url: "https://example.com/return".into(),
            timeout_seconds: 900,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn duplicate_create_intent_returns_same_url() {
        let engine = test_engine();
        let url1 = engine.create_intent(base_input("k1", "o1")).await.unwrap();
        let url2 = engine.create_intent(base_input("k1", "o1")).await.unwrap();
        assert_eq!(url1, url2);
    }

    #[tokio::test]
    async fn complete_then_fail_is_a_conflict_not_an_error() {
        let engine = test_engine();
        engine.create_intent(base_input("k2", "o2")).await.unwrap();
        let payment = engine
            .find_by_idempotency_key("k2")
            .await
            .unwrap()
            .unwrap();

        engine
            .complete_by_provider_tx_id(&payment.provider_transaction_id)
            .await
            .unwrap();
        engine
            .fail_by_provider_tx_id(&payment.provider_transaction_id)
            .await
            .unwrap();

        let after = engine
            .find_by_idempotency_key("k2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn duplicate_completion_webhook_is_a_noop() {
        let engine = test_engine();
        engine.create_intent(base_input("k3", "o3")).await.unwrap();
        let payment = engine
            .find_by_idempotency_key("k3")
            .await
            .unwrap()
            .unwrap();

        engine
            .complete_by_provider_tx_id(&payment.provider_transaction_id)
            .await
            .unwrap();
        engine
            .complete_by_provider_tx_id(&payment.provider_transaction_id)
            .await
            .unwrap();

        let records = engine.store.outbox_records();
        let matching = records
            .iter()
            .filter(|r| r.aggregate_id == payment.id && r.event_type == EventType::PaymentCompleted)
            .count();
        assert_eq!(matching, 1);
    }

    #[tokio::test]
    async fn completion_appends_exactly_one_outbox_row() {
        let engine = test_engine();
        engine.create_intent(base_input("k4", "o4")).await.unwrap();
        let payment = engine
            .find_by_idempotency_key("k4")
            .await
            .unwrap()
            .unwrap();

        engine
            .complete_by_provider_tx_id(&payment.provider_transaction_id)
            .await
            .unwrap();

        let records = engine.store.outbox_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, EventType::PaymentCompleted);
    }

    #[tokio::test]
    async fn unknown_provider_transaction_id_is_not_found() {
        let engine = test_engine();
        let result = engine.complete_by_provider_tx_id("missing").await;
        assert!(matches!(result, Err(LifecycleError::PaymentNotFound)));
    }
}
