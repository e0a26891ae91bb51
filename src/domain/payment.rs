//! The `Payment` entity: identity of one payment attempt (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of supported settlement currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "currency", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Vnd,
}

/// Closed set of payment providers this service can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "provider", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Zalopay,
    Payos,
    Vnpay,
}

/// Payment status. Transitions form a DAG: `Pending -> {Completed, Failed,
/// Cancelled}`; all three targets are terminal (spec invariant I3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Whether this status is terminal (immutable once reached).
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Whether transitioning from `self` to `target` is a legal edge in the
    /// status DAG (spec invariant I3: only `Pending -> {Completed, Failed,
    /// Cancelled}`).
    pub fn can_transition_to(self, target: PaymentStatus) -> bool {
        self == PaymentStatus::Pending && target != PaymentStatus::Pending
    }
}

/// One payment attempt, identified by a caller-supplied idempotency key and
/// order code (both globally unique — invariants I1, I2).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_code: String,
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub currency: Currency,
    pub provider: Provider,
    pub provider_transaction_id: String,
    pub redirect_url: String,
    pub payment_url: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// Fields required to persist a new `Pending` payment (spec §4.2
/// `insertPending`). Everything else is assigned by the store or defaulted.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub order_code: String,
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub currency: Currency,
    pub provider: Provider,
    pub provider_transaction_id: String,
    pub redirect_url: String,
    pub payment_url: String,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_only_move_to_terminal_states() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Cancelled));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn terminal_states_never_transition() {
        for terminal in [
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for target in [
                PaymentStatus::Pending,
                PaymentStatus::Completed,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn pending_is_not_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
    }
}
