//! The message bus abstraction the publisher writes to (spec §4.5, §6 "Bus
//! topics"). One trait, one real `rdkafka`-backed implementation, mirroring
//! the `Arc<dyn EventBus>` shape used elsewhere in the ecosystem for
//! decoupling publishers from a concrete broker client.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use uuid::Uuid;

use crate::config::KafkaConfig;
use crate::domain::EventType;

pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_VERSION: &str = "1.0";
const SOURCE: &str = "payment-service";

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus publish failed: {0}")]
    Publish(String),
    #[error("bus connect failed: {0}")]
    Connect(String),
}

/// One message handed to [`EventBus::publish`]: the partition key (=
/// `aggregateId`, spec §4.5 step 4) and the JSON-encoded payload.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub event_type: EventType,
    pub correlation_id: String,
}

impl OutboundMessage {
    pub fn for_event(event_type: EventType, aggregate_id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            topic: event_type.topic().to_string(),
            key: aggregate_id.to_string(),
            payload,
            event_type,
            correlation_id: aggregate_id.to_string(),
        }
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), BusError>;
}

/// `rdkafka`-backed producer, acks on all in-sync replicas, 30s publish
/// deadline (spec §4.5 step 4).
pub struct KafkaEventBus {
    producer: FutureProducer,
}

impl KafkaEventBus {
    /// Connects with bounded retry: 30s deadline, 750ms fixed interval
    /// (spec §5 "startup/teardown"), to tolerate broker boot races.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, BusError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", "30000")
            .set("acks", "all")
            .set("enable.idempotence", "true");

        if config.ssl {
            client_config.set("security.protocol", "SASL_SSL");
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                client_config
                    .set("sasl.mechanisms", "PLAIN")
                    .set("sasl.username", username)
                    .set("sasl.password", password);
            }
        }

        let deadline = Duration::from_secs(30);
        let interval = Duration::from_millis(750);
        let started = tokio::time::Instant::now();
        loop {
            match client_config.create::<FutureProducer>() {
                Ok(producer) => return Ok(Self { producer }),
                Err(err) => {
                    if started.elapsed() >= deadline {
                        return Err(BusError::Connect(err.to_string()));
                    }
                    tracing::warn!(error = %err, "kafka producer connect failed, retrying");
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    #[tracing::instrument(skip(self, message), fields(topic = %message.topic, key = %message.key))]
    async fn publish(&self, message: OutboundMessage) -> Result<(), BusError> {
        let message_id = Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();
        let headers = rdkafka::message::OwnedHeaders::new()
            .insert(rdkafka::message::Header {
                key: "messageId",
                value: Some(message_id.as_str()),
            })
            .insert(rdkafka::message::Header {
                key: "timestamp",
                value: Some(timestamp.as_str()),
            })
            .insert(rdkafka::message::Header {
                key: "source",
                value: Some(SOURCE),
            })
            .insert(rdkafka::message::Header {
                key: "eventVersion",
                value: Some(EVENT_VERSION),
            })
            .insert(rdkafka::message::Header {
                key: "eventType",
                value: Some(message.event_type.header_name()),
            })
            .insert(rdkafka::message::Header {
                key: "correlationId",
                value: Some(message.correlation_id.as_str()),
            });

        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        self.producer
            .send(record, PUBLISH_TIMEOUT)
            .await
            .map_err(|(err, _)| BusError::Publish(err.to_string()))?;
        Ok(())
    }
}
