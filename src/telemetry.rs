//! Structured logging setup for the payment orchestrator.
//!
//! The host this service is styled after wires OpenTelemetry tracing and
//! metrics exporters behind this same builder shape
//! (`Telemetry::new().with_name(..).with_version(..).register()`). This
//! service has no external trace backend in scope, so the builder here
//! only configures `tracing-subscriber`'s environment-filtered formatter,
//! but keeps the same call shape so wiring an exporter later is a
//! same-shaped change in `main.rs`.

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Builds and registers the process-wide `tracing` subscriber.
#[derive(Debug, Default)]
pub struct Telemetry {
    name: Option<&'static str>,
    version: Option<&'static str>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }

    /// Initializes the global `tracing` subscriber.
    ///
    /// Verbosity is controlled by `RUST_LOG` (defaults to `info` for this
    /// crate and `warn` for dependencies).
    pub fn register(self) -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,rdkafka=info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();

        tracing::info!(
            name = self.name.unwrap_or("payment-orchestrator"),
            version = self.version.unwrap_or("unknown"),
            "telemetry initialized"
        );
        self
    }

    /// HTTP request tracing layer for the Axum router.
    pub fn http_tracing(&self) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
        TraceLayer::new_for_http()
    }
}
