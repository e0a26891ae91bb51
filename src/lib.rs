//! Payment orchestration service: mediates between a ticketing back-office
//! caller and external payment providers (ZaloPay, PayOS, and a reserved
//! VNPay stub).
//!
//! The core of this crate is the payment lifecycle engine and
//! transactional outbox: together they guarantee at-most-one payment
//! record per idempotency key, atomically couple a status change to the
//! emission of a business event, and deliver those events to the message
//! bus with bounded retries and cleanup.
//!
//! # Modules
//!
//! - [`adapters`] — Provider Adapters (C1): ZaloPay, PayOS, and a VNPay stub.
//! - [`store`] — Payment Store (C2) and Outbox Store (C3), plus the shared transaction capability.
//! - [`lifecycle`] — Lifecycle Engine (C4): the single writer of payment status.
//! - [`outbox_publisher`] — Outbox Publisher (C5): polls and delivers outbox rows to the bus.
//! - [`webhook`] — Webhook Ingress (C6).
//! - [`rpc`] — RPC Surface (C7).
//! - [`domain`] — The `Payment` and `OutboxRecord` entities.
//! - [`config`] — Environment-driven configuration.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod outbox_publisher;
pub mod rpc;
pub mod sig_down;
pub mod store;
pub mod telemetry;
pub mod webhook;
