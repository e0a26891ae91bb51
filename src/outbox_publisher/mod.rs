//! Outbox Publisher (C5): polls the outbox, routes events to bus topics,
//! retries with backoff, cleans up old rows, and surfaces permanent
//! failures (spec §4.5).
//!
//! The tick, cleanup, and exhausted-scan bodies are free functions so a
//! conforming deployment can run them either as the in-process loop below
//! or as a separately scheduled task (spec §9 "single vs dual deployment").

pub mod bus;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::OutboxConfig;
use crate::domain::{EventType, OutboxRecord};
use crate::store::OutboxStore;

use bus::{EventBus, OutboundMessage};

const EXHAUSTED_SCAN_INTERVAL: Duration = Duration::from_secs(3600);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(86_400);

/// Runs one publisher tick: fetch unpublished rows, publish each to its
/// routed topic, mark published or increment retry (spec §4.5 steps 2-5).
///
/// The routing table ([`crate::domain::EventType::topic`]) is exhaustive
/// over the enum, so an "unknown event type" row (spec §4.5 step 3) is
/// unrepresentable here rather than handled at runtime.
#[tracing::instrument(skip(store, bus))]
pub async fn run_tick<S: OutboxStore>(
    store: &S,
    bus: &dyn EventBus,
    batch_size: u32,
    max_retries: u32,
) -> Result<usize, crate::store::StoreError> {
    let rows = store.fetch_unpublished(batch_size, max_retries).await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut published = 0;
    for row in rows {
        if let Err(error) = publish_row(store, bus, &row).await {
            tracing::warn!(outbox_id = %row.id, error = %error, "outbox publish failed");
        } else {
            published += 1;
        }
    }
    Ok(published)
}

async fn publish_row<S: OutboxStore>(
    store: &S,
    bus: &dyn EventBus,
    row: &OutboxRecord,
) -> Result<(), crate::store::StoreError> {
    let payload = match serde_json::to_vec(&row.payload) {
        Ok(payload) => payload,
        Err(error) => {
            store.increment_retry(row.id, &error.to_string()).await?;
            return Ok(());
        }
    };

    let message = OutboundMessage::for_event(row.event_type, row.aggregate_id, payload);

    match bus.publish(message).await {
        Ok(()) => store.mark_published(row.id).await,
        Err(error) => store.increment_retry(row.id, &error.to_string()).await,
    }
}

/// Deletes published rows older than the retention horizon (spec §4.5
/// cleanup task, invariant O4).
#[tracing::instrument(skip(store))]
pub async fn run_cleanup<S: OutboxStore>(
    store: &S,
    retention_days: i64,
) -> Result<u64, crate::store::StoreError> {
    let deleted = store.delete_published_older_than(retention_days).await?;
    if deleted > 0 {
        tracing::info!(deleted, "outbox cleanup removed published rows");
    }
    Ok(deleted)
}

/// Logs rows that exhausted their retry budget (spec §4.5 monitoring
/// task). Detection and logging only — wiring this to an alerting sink is
/// left to the deployment.
#[tracing::instrument(skip(store))]
pub async fn run_exhausted_scan<S: OutboxStore>(
    store: &S,
    max_retries: u32,
) -> Result<Vec<OutboxRecord>, crate::store::StoreError> {
    let exhausted = store.fetch_exhausted(max_retries).await?;
    if !exhausted.is_empty() {
        let ids: Vec<String> = exhausted.iter().map(|r| r.id.to_string()).collect();
        tracing::warn!(count = exhausted.len(), ids = ?ids, "outbox rows exhausted retry budget");
    }
    Ok(exhausted)
}

/// Drives [`run_tick`], [`run_cleanup`], and [`run_exhausted_scan`] as one
/// long-running, single-logical-producer task (spec §5 "scheduling
/// model"). Serializes ticks with a re-entrancy guard rather than a mutex,
/// so a slow tick causes the next tick to be skipped instead of queued.
pub struct OutboxPublisher<S: OutboxStore> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
    is_processing: AtomicBool,
}

impl<S: OutboxStore + 'static> OutboxPublisher<S> {
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>, config: OutboxConfig) -> Self {
        Self {
            store,
            bus,
            config,
            is_processing: AtomicBool::new(false),
        }
    }

    /// Runs until `shutdown` is cancelled, then drains the in-flight tick
    /// and returns (spec §5 "shutdown is cooperative").
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut tick_interval = tokio::time::interval(self.config.tick_interval);
        let mut cleanup_interval = tokio::time::interval(CLEANUP_INTERVAL);
        let mut exhausted_interval = tokio::time::interval(EXHAUSTED_SCAN_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("outbox publisher shutting down");
                    break;
                }
                _ = tick_interval.tick() => self.tick().await,
                _ = cleanup_interval.tick() => {
                    if let Err(error) = run_cleanup(&*self.store, self.config.retention_days).await {
                        tracing::error!(error = %error, "outbox cleanup failed");
                    }
                }
                _ = exhausted_interval.tick() => {
                    if let Err(error) = run_exhausted_scan(&*self.store, self.config.max_retries).await {
                        tracing::error!(error = %error, "outbox exhausted scan failed");
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        if self.is_processing.swap(true, Ordering::SeqCst) {
            // A previous tick is still running; skip this one (spec §4.5
            // step 1 "serial execution guarantee").
            return;
        }
        let result = run_tick(
            &*self.store,
            &*self.bus,
            self.config.batch_size,
            self.config.max_retries,
        )
        .await;
        self.is_processing.store(false, Ordering::SeqCst);

        if let Err(error) = result {
            tracing::error!(error = %error, "outbox tick failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::store::TransactionManager;
    use crate::store::fakes::FakeStore;

    struct RecordingBus {
        published: Mutex<Vec<OutboundMessage>>,
        fail_next: AtomicBool,
    }

    impl RecordingBus {
        fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail_next: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, message: OutboundMessage) -> Result<(), bus::BusError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(bus::BusError::Publish("simulated outage".into()));
            }
            self.published.lock().unwrap().push(message);
            Ok(())
        }
    }

    async fn seed_one_record(store: &FakeStore) -> Uuid {
        let mut tx = store.begin().await.unwrap();
        let record = store
            .append(
                &mut tx,
                Uuid::new_v4(),
                "Payment",
                EventType::PaymentCompleted,
                serde_json::json!({"payment_id": "p1"}),
            )
            .await
            .unwrap();
        store.commit(tx).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn successful_tick_marks_row_published() {
        let store = FakeStore::new();
        seed_one_record(&store).await;
        let bus = RecordingBus::new();

        let published = run_tick(&store, &bus, 100, 5).await.unwrap();

        assert_eq!(published, 1);
        let records = store.outbox_records();
        assert!(records[0].published);
        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_publish_increments_retry_and_leaves_row_unpublished() {
        let store = FakeStore::new();
        seed_one_record(&store).await;
        let bus = RecordingBus::new();
        bus.fail_next.store(true, Ordering::SeqCst);

        let published = run_tick(&store, &bus, 100, 5).await.unwrap();

        assert_eq!(published, 0);
        let records = store.outbox_records();
        assert!(!records[0].published);
        assert_eq!(records[0].retry_count, 1);
    }

    #[tokio::test]
    async fn exhausted_scan_finds_rows_past_max_retries() {
        let store = FakeStore::new();
        let id = seed_one_record(&store).await;
        for _ in 0..5 {
            store.increment_retry(id, "boom").await.unwrap();
        }

        let exhausted = run_exhausted_scan(&store, 5).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].id, id);
    }

    #[tokio::test]
    async fn empty_outbox_publishes_nothing() {
        let store = FakeStore::new();
        let bus = RecordingBus::new();
        let published = run_tick(&store, &bus, 100, 5).await.unwrap();
        assert_eq!(published, 0);
    }
}
