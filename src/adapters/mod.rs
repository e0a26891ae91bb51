//! Provider Adapters (C1): build provider-specific request bodies, verify
//! callback signatures, normalize callback outcomes (spec §4.1).
//!
//! Mirrors the teacher's chain-provider registry: one enum wraps the
//! provider-specific types and dispatches to whichever variant is
//! configured, so the rest of the service talks to a single type.

pub mod payos;
pub mod vnpay;
pub mod zalopay;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::ProvidersConfig;
use crate::domain::Provider;

use payos::PayOsAdapter;
use vnpay::VnPayAdapter;
use zalopay::ZaloPayAdapter;

/// Builds the per-provider webhook URL registered at link creation (spec
/// §6): `{webhook_base_url}/webhook/{provider_path}`.
fn build_webhook_url(webhook_base_url: &Url, provider_path: &str) -> String {
    format!("{}/webhook/{provider_path}", webhook_base_url.as_str().trim_end_matches('/'))
}

/// Input to [`ProviderAdapter::create_payment_link`] (spec §4.1).
#[derive(Debug, Clone)]
pub struct CreatePaymentLinkInput {
    pub amount_cents: i64,
    pub order_code: String,
    pub currency: crate::domain::Currency,
    pub idempotency_key: String,
    pub redirect_url: String,
    pub timeout_seconds: i32,
}

/// Result of [`ProviderAdapter::create_payment_link`]: the checkout URL and
/// the provider-scoped transaction id used to join a later webhook back to
/// this payment.
#[derive(Debug, Clone)]
pub struct PaymentLink {
    pub payment_url: String,
    pub provider_transaction_id: String,
}

/// Result of [`ProviderAdapter::handle_callback`]. `response_body` is sent
/// back to the provider verbatim, always under HTTP 200 (spec §4.6, §7).
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub success: bool,
    pub response_body: serde_json::Value,
    pub provider_transaction_id: Option<String>,
}

/// Errors an adapter can raise. Adapters never touch the store and never
/// construct business events (spec §4.1 "adapter contract edges").
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("callback verification failed: {0}")]
    VerificationFailed(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("unsupported provider")]
    UnsupportedProvider,
}

/// Uniform capability set implemented by every provider adapter.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn create_payment_link(
        &self,
        input: CreatePaymentLinkInput,
    ) -> Result<PaymentLink, AdapterError>;

    async fn handle_callback(&self, raw_body: &[u8]) -> Result<CallbackOutcome, AdapterError>;
}

/// Enum-dispatch registry over the three supported providers (spec §2
/// "Provider Adapters"). One variant per [`Provider`]; VNPay is always
/// present but every call fails with [`AdapterError::UnsupportedProvider`].
#[derive(Debug, Clone)]
pub enum AdapterHandle {
    ZaloPay(Arc<ZaloPayAdapter>),
    PayOs(Arc<PayOsAdapter>),
    VnPay(Arc<VnPayAdapter>),
}

#[async_trait]
impl ProviderAdapter for AdapterHandle {
    async fn create_payment_link(
        &self,
        input: CreatePaymentLinkInput,
    ) -> Result<PaymentLink, AdapterError> {
        match self {
            AdapterHandle::ZaloPay(adapter) => adapter.create_payment_link(input).await,
            AdapterHandle::PayOs(adapter) => adapter.create_payment_link(input).await,
            AdapterHandle::VnPay(adapter) => adapter.create_payment_link(input).await,
        }
    }

    async fn handle_callback(&self, raw_body: &[u8]) -> Result<CallbackOutcome, AdapterError> {
        match self {
            AdapterHandle::ZaloPay(adapter) => adapter.handle_callback(raw_body).await,
            AdapterHandle::PayOs(adapter) => adapter.handle_callback(raw_body).await,
            AdapterHandle::VnPay(adapter) => adapter.handle_callback(raw_body).await,
        }
    }
}

/// Holds one configured adapter per [`Provider`], built once at boot from
/// [`ProvidersConfig`] (spec §9 "prefer explicit constructor wiring").
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    zalopay: Arc<ZaloPayAdapter>,
    payos: Arc<PayOsAdapter>,
    vnpay: Arc<VnPayAdapter>,
}

impl AdapterRegistry {
    pub fn new(config: &ProvidersConfig, webhook_base_url: &Url) -> Self {
        Self {
            zalopay: Arc::new(ZaloPayAdapter::new(
                config.zalopay.clone(),
                build_webhook_url(webhook_base_url, "zalopay"),
            )),
            payos: Arc::new(PayOsAdapter::new(
                config.payos.clone(),
                build_webhook_url(webhook_base_url, "payos"),
            )),
            vnpay: Arc::new(VnPayAdapter::new()),
        }
    }

    pub fn get(&self, provider: Provider) -> AdapterHandle {
        match provider {
            Provider::Zalopay => AdapterHandle::ZaloPay(self.zalopay.clone()),
            Provider::Payos => AdapterHandle::PayOs(self.payos.clone()),
            Provider::Vnpay => AdapterHandle::VnPay(self.vnpay.clone()),
        }
    }

    /// Infers a provider from webhook body shape when the URL path alone
    /// doesn't carry it (spec §4.6): ZaloPay bodies have `{data, mac, type}`;
    /// PayOS bodies have `{code, desc, data, signature}`.
    pub fn infer_provider(body: &serde_json::Value) -> Option<Provider> {
        let object = body.as_object()?;
        if object.contains_key("mac") && object.contains_key("type") {
            Some(Provider::Zalopay)
        } else if object.contains_key("signature") && object.contains_key("code") {
            Some(Provider::Payos)
        } else {
            None
        }
    }
}
