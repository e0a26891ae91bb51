//! Configuration for the payment orchestrator.
//!
//! Fields are environment-driven; a handful of non-secret fields also carry
//! hardcoded defaults. Secrets (`DATABASE_URL`, Kafka credentials, provider
//! keys) are read from the environment only and are never logged.

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use url::Url;

/// CLI arguments for the payment orchestrator binary.
#[derive(Parser, Debug)]
#[command(name = "payment-orchestrator")]
#[command(about = "Payment orchestration service HTTP server")]
struct CliArgs {
    /// Bind host, overrides `HOST`.
    #[arg(long, env = "HOST")]
    host: Option<IpAddr>,
    /// Bind port, overrides `PORT`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable {0}: {1}")]
    InvalidVar(&'static str, String),
    #[error(transparent)]
    Cli(#[from] clap::Error),
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok()
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidVar(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Kafka producer configuration, per `KAFKA_*` environment variables.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

impl KafkaConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            brokers: required("KAFKA_BROKERS")?,
            ssl: parse_var("KAFKA_SSL", false)?,
            username: optional("KAFKA_USERNAME"),
            password: optional("KAFKA_PASSWORD"),
            client_id: env::var("KAFKA_CLIENT_ID")
                .unwrap_or_else(|_| "payment-orchestrator".to_string()),
        })
    }
}

/// ZaloPay merchant credentials, per `ZALOPAY_*` environment variables.
#[derive(Debug, Clone)]
pub struct ZaloPayConfig {
    pub app_id: String,
    pub key1: String,
    pub key2: String,
}

impl ZaloPayConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            app_id: required("ZALOPAY_APP_ID")?,
            key1: required("ZALOPAY_KEY1")?,
            key2: required("ZALOPAY_KEY2")?,
        })
    }
}

/// PayOS merchant credentials, per `PAYOS_*` environment variables.
#[derive(Debug, Clone)]
pub struct PayOsConfig {
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
}

impl PayOsConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required("PAYOS_CLIENT_ID")?,
            api_key: required("PAYOS_API_KEY")?,
            checksum_key: required("PAYOS_CHECKSUM_KEY")?,
        })
    }
}

/// Provider credentials bundle. VNPay carries no credentials: it is a stub.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub zalopay: ZaloPayConfig,
    pub payos: PayOsConfig,
}

/// Outbox publisher tunables, per `OUTBOX_*` environment variables.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: u32,
    pub max_retries: u32,
    pub retention_days: i64,
    pub tick_interval: Duration,
}

impl OutboxConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            batch_size: parse_var("OUTBOX_BATCH_SIZE", 100)?,
            max_retries: parse_var("OUTBOX_MAX_RETRIES", 5)?,
            retention_days: parse_var("OUTBOX_RETENTION_DAYS", 7)?,
            tick_interval: Duration::from_secs(parse_var("OUTBOX_TICK_INTERVAL_SECS", 5)?),
        })
    }
}

mod config_defaults {
    use std::net::{IpAddr, Ipv4Addr};

    pub fn default_port() -> u16 {
        8080
    }

    pub fn default_host() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
    }
}

/// Process-wide immutable configuration, assembled once at boot.
#[derive(Debug, Clone)]
pub struct Config {
    host: IpAddr,
    port: u16,
    database_url: String,
    webhook_base_url: Url,
    kafka: KafkaConfig,
    providers: ProvidersConfig,
    outbox: OutboxConfig,
}

impl Config {
    /// Loads configuration from CLI flags, then environment variables, then
    /// hardcoded defaults, in that priority order.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::try_parse()?;

        let host = match cli.host {
            Some(host) => host,
            None => parse_var("HOST", config_defaults::default_host())?,
        };
        let port = match cli.port {
            Some(port) => port,
            None => parse_var("PORT", config_defaults::default_port())?,
        };

        let webhook_base_url_raw = required("WEBHOOK_BASE_URL")?;
        let webhook_base_url = Url::parse(&webhook_base_url_raw)
            .map_err(|_| ConfigError::InvalidVar("WEBHOOK_BASE_URL", webhook_base_url_raw))?;

        Ok(Self {
            host,
            port,
            database_url: required("DATABASE_URL")?,
            webhook_base_url,
            kafka: KafkaConfig::load()?,
            providers: ProvidersConfig {
                zalopay: ZaloPayConfig::load()?,
                payos: PayOsConfig::load()?,
            },
            outbox: OutboxConfig::load()?,
        })
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn webhook_base_url(&self) -> &Url {
        &self.webhook_base_url
    }

    pub fn kafka(&self) -> &KafkaConfig {
        &self.kafka
    }

    pub fn providers(&self) -> &ProvidersConfig {
        &self.providers
    }

    pub fn outbox(&self) -> &OutboxConfig {
        &self.outbox
    }
}
