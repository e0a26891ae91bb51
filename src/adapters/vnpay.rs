//! VNPay adapter stub (spec §4.1): reserved for a future integration.
//! Every call fails with [`AdapterError::UnsupportedProvider`].

use async_trait::async_trait;

use super::{AdapterError, CallbackOutcome, CreatePaymentLinkInput, PaymentLink, ProviderAdapter};

#[derive(Debug, Default)]
pub struct VnPayAdapter;

impl VnPayAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderAdapter for VnPayAdapter {
    async fn create_payment_link(
        &self,
        _input: CreatePaymentLinkInput,
    ) -> Result<PaymentLink, AdapterError> {
        Err(AdapterError::UnsupportedProvider)
    }

    async fn handle_callback(&self, _raw_body: &[u8]) -> Result<CallbackOutcome, AdapterError> {
        Err(AdapterError::UnsupportedProvider)
    }
}
