//! The `OutboxRecord` entity: a durable, pending business event (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::{Currency, Provider};

/// Maximum length, in bytes, of a stored `lastError` message (spec O1).
pub const LAST_ERROR_MAX_BYTES: usize = 500;

/// Truncates an error message to [`LAST_ERROR_MAX_BYTES`] bytes at a char
/// boundary, so it never splits a multi-byte UTF-8 sequence.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= LAST_ERROR_MAX_BYTES {
        return message.to_string();
    }
    let mut end = LAST_ERROR_MAX_BYTES;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Business event types emitted by the lifecycle engine into the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_event_type", rename_all = "PascalCase")]
#[serde(rename_all = "PascalCase")]
pub enum EventType {
    PaymentCompleted,
    PaymentFailed,
    PaymentCancelled,
}

impl EventType {
    /// The bus topic this event type routes to (spec §4.5 routing table).
    pub fn topic(self) -> &'static str {
        match self {
            EventType::PaymentCompleted => "payment.completed",
            EventType::PaymentFailed => "payment.failed",
            EventType::PaymentCancelled => "payment.cancelled",
        }
    }

    /// The `eventType` header value on a published message (spec §4.5 step 4).
    pub fn header_name(self) -> &'static str {
        match self {
            EventType::PaymentCompleted => "PaymentCompleted",
            EventType::PaymentFailed => "PaymentFailed",
            EventType::PaymentCancelled => "PaymentCancelled",
        }
    }
}

/// The stable, snake_case wire shape of an outbox event's payload (spec
/// §3 "Event Payload"). Exactly one of `completed_at` / `failed_at` /
/// `cancelled_at` is set, matching the event type that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub payment_id: Uuid,
    pub order_code: String,
    pub amount_cents: i64,
    pub currency: Currency,
    pub provider: Provider,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// A durable, pending business event staged for bus delivery.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_error_is_noop_under_limit() {
        let message = "connection refused";
        assert_eq!(truncate_error(message), message);
    }

    #[test]
    fn truncate_error_caps_at_byte_limit() {
        let message = "x".repeat(1000);
        let truncated = truncate_error(&message);
        assert_eq!(truncated.len(), LAST_ERROR_MAX_BYTES);
    }

    #[test]
    fn truncate_error_respects_char_boundaries() {
        // Each "é" is 2 bytes; 500 is even, so this would land mid-char if we
        // didn't walk back to a boundary.
        let message = "é".repeat(300);
        let truncated = truncate_error(&message);
        assert!(truncated.len() <= LAST_ERROR_MAX_BYTES);
        assert!(String::from_utf8(truncated.into_bytes()).is_ok());
    }

    #[test]
    fn event_type_routes_to_expected_topic() {
        assert_eq!(EventType::PaymentCompleted.topic(), "payment.completed");
        assert_eq!(EventType::PaymentFailed.topic(), "payment.failed");
        assert_eq!(EventType::PaymentCancelled.topic(), "payment.cancelled");
    }
}
