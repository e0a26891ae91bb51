//! Payment orchestrator HTTP entrypoint.
//!
//! Endpoints:
//! - `POST /payments` – `CreatePaymentIntent`
//! - `GET /payments` – `GetPaymentUrlByIdempotencyKey`
//! - `POST /webhook/{provider}` – provider callback ingress
//!
//! This server includes:
//! - Structured tracing via `TraceLayer`
//! - CORS support for the back-office caller
//! - An in-process outbox publisher task alongside the HTTP listener

mod adapters;
mod config;
mod domain;
mod lifecycle;
mod outbox_publisher;
mod rpc;
mod sig_down;
mod store;
mod telemetry;
mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::post;
use dotenvy::dotenv;
use tower_http::cors;

use crate::adapters::AdapterRegistry;
use crate::config::Config;
use crate::lifecycle::LifecycleEngine;
use crate::outbox_publisher::OutboxPublisher;
use crate::outbox_publisher::bus::KafkaEventBus;
use crate::rpc::AppState;
use crate::sig_down::SigDown;
use crate::store::postgres::PostgresStore;
use crate::telemetry::Telemetry;

/// Initializes the payment orchestrator.
///
/// - Loads `.env` variables.
/// - Initializes structured tracing.
/// - Connects to Postgres (fails loudly if unreachable) and runs migrations.
/// - Connects to Kafka with bounded retry to tolerate broker boot races.
/// - Starts the in-process outbox publisher and the Axum HTTP server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let store = PostgresStore::connect(config.database_url())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        });
    store.migrate().await?;
    let store = Arc::new(store);

    let bus = KafkaEventBus::connect(config.kafka())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to connect to Kafka: {}", e);
            std::process::exit(1);
        });
    let bus: Arc<dyn outbox_publisher::bus::EventBus> = Arc::new(bus);

    let adapters = Arc::new(AdapterRegistry::new(
        config.providers(),
        config.webhook_base_url(),
    ));
    let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), adapters.clone()));

    let sig_down = SigDown::try_new()?;
    let shutdown_token = sig_down.cancellation_token();

    let publisher = Arc::new(OutboxPublisher::new(
        store.clone(),
        bus,
        config.outbox().clone(),
    ));
    let publisher_shutdown = shutdown_token.clone();
    tokio::spawn(async move { publisher.run(publisher_shutdown).await });

    let app_state = AppState { lifecycle, adapters };

    let http_endpoints = Router::new()
        .route(
            "/payments",
            post(rpc::create_payment_intent::<PostgresStore>)
                .get(rpc::get_payment_url_by_idempotency_key::<PostgresStore>),
        )
        .route(
            "/webhook/{provider}",
            post(webhook::handle_webhook::<PostgresStore>),
        )
        .with_state(app_state)
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let axum_cancellation_token = shutdown_token.clone();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
