//! Core domain types: the payment entity and its durable outbox events.
//!
//! These types are persistence-agnostic value objects; [`crate::store`]
//! owns how they round-trip through Postgres.

pub mod outbox;
pub mod payment;

pub use outbox::{EventPayload, EventType, OutboxRecord};
pub use payment::{Currency, NewPayment, Payment, PaymentStatus, Provider};
