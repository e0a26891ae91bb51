//! PayOS provider adapter (spec §4.1).
//!
//! The provider's numeric `orderCode` is a lossy encoding of the caller's
//! alphanumeric order code (spec §9 "PayOS order code encoding is lossy"):
//! it cannot be reversed, so the adapter returns the provider-assigned
//! `paymentLinkId` as the provider transaction id and the lifecycle engine
//! looks payments up by that field rather than by `orderCode`.
//!
//! Callback validation (spec §4.1) verifies `signature`: an HMAC-SHA256
//! over the `data` object's fields, sorted by key and joined as
//! `key=value&...`, keyed by `checksum_key` — the same construction PayOS's
//! own SDK uses, reimplemented here since no SDK crate is available.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::PayOsConfig;

use super::{AdapterError, CallbackOutcome, CreatePaymentLinkInput, PaymentLink, ProviderAdapter};

type HmacSha256 = Hmac<Sha256>;

const CREATE_LINK_ENDPOINT: &str = "https://api-merchant.payos.vn/v2/payment-requests";

/// Numerically encodes the caller's order code as `YYMMDD * 10^8 +
/// f(orderCode)`, where `f` is the base-36 value of the alphanumeric tail
/// (last 5 characters) of `order_code`, reduced modulo `10^8`.
pub fn build_payos_order_code(order_code: &str) -> i64 {
    let date_component: i64 = Utc::now().format("%Y%m%d").to_string().parse().unwrap_or(0);
    let tail: String = order_code
        .chars()
        .rev()
        .take(5)
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    let base36_value = i64::from_str_radix(&tail.to_uppercase(), 36).unwrap_or(0);
    date_component * 100_000_000 + (base36_value % 100_000_000)
}

fn hmac_sha256_hex(key: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Renders a JSON object as PayOS's `key1=value1&key2=value2&...` signing
/// string: entries sorted alphabetically by key, string values taken
/// verbatim and everything else through its JSON representation.
fn sorted_field_string(data: &serde_json::Value) -> Option<String> {
    let object = data.as_object()?;
    let mut entries: Vec<(&String, &serde_json::Value)> = object.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Some(
        entries
            .into_iter()
            .map(|(key, value)| format!("{key}={}", field_value_string(value)))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

fn field_value_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct CreateLinkRequest {
    #[serde(rename = "orderCode")]
    order_code: i64,
    amount: i64,
    description: String,
    #[serde(rename = "cancelUrl")]
    cancel_url: String,
    #[serde(rename = "returnUrl")]
    return_url: String,
    #[serde(rename = "webhookUrl")]
    webhook_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    code: String,
    desc: String,
    data: Option<CreateLinkResponseData>,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponseData {
    #[serde(rename = "checkoutUrl")]
    checkout_url: String,
    #[serde(rename = "paymentLinkId")]
    payment_link_id: String,
}

/// Inner `data` object of a PayOS webhook callback.
#[derive(Debug, Deserialize)]
struct PayOsCallbackData {
    #[serde(rename = "orderCode")]
    #[allow(dead_code)]
    order_code: i64,
    #[serde(rename = "paymentLinkId")]
    payment_link_id: String,
}

#[derive(Debug, Deserialize)]
struct PayOsCallbackEnvelope {
    code: String,
    #[allow(dead_code)]
    desc: String,
    data: serde_json::Value,
    signature: String,
}

fn success_response() -> serde_json::Value {
    serde_json::json!({ "error": 0, "message": "Success", "data": null })
}

fn failure_response(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": -1, "message": message.into(), "data": null })
}

#[derive(Debug)]
pub struct PayOsAdapter {
    config: PayOsConfig,
    http: reqwest::Client,
    webhook_url: String,
}

impl PayOsAdapter {
    pub fn new(config: PayOsConfig, webhook_url: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(25))
            .build()
            .expect("static reqwest client configuration is always valid");
        Self {
            config,
            http,
            webhook_url,
        }
    }
}

#[async_trait]
impl ProviderAdapter for PayOsAdapter {
    async fn create_payment_link(
        &self,
        input: CreatePaymentLinkInput,
    ) -> Result<PaymentLink, AdapterError> {
        let order_code = build_payos_order_code(&input.order_code);

        let request_body = CreateLinkRequest {
            order_code,
            amount: input.amount_cents,
            description: input.order_code.clone(),
            cancel_url: input.redirect_url.clone(),
            return_url: input.redirect_url,
            webhook_url: self.webhook_url.clone(),
        };

        let response = self
            .http
            .post(CREATE_LINK_ENDPOINT)
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AdapterError::ProviderUnavailable(e.to_string()))?
            .json::<CreateLinkResponse>()
            .await
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

        if response.code != "00" {
            return Err(AdapterError::ProviderRejected(response.desc));
        }
        let data = response
            .data
            .ok_or_else(|| AdapterError::MalformedPayload("missing data field".into()))?;

        Ok(PaymentLink {
            payment_url: data.checkout_url,
            provider_transaction_id: data.payment_link_id,
        })
    }

    async fn handle_callback(&self, raw_body: &[u8]) -> Result<CallbackOutcome, AdapterError> {
        let envelope: PayOsCallbackEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

        let signing_string = sorted_field_string(&envelope.data)
            .ok_or_else(|| AdapterError::MalformedPayload("data is not an object".into()))?;
        let expected_signature = hmac_sha256_hex(&self.config.checksum_key, &signing_string);
        if expected_signature != envelope.signature {
            // Unauthenticated body: nothing in `data` can be trusted,
            // including `paymentLinkId`.
            return Ok(CallbackOutcome {
                success: false,
                response_body: failure_response("Invalid signature"),
                provider_transaction_id: None,
            });
        }

        let data: PayOsCallbackData = serde_json::from_value(envelope.data)
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

        if envelope.code != "00" {
            return Ok(CallbackOutcome {
                success: false,
                response_body: failure_response("Payment not successful"),
                provider_transaction_id: Some(data.payment_link_id),
            });
        }

        Ok(CallbackOutcome {
            success: true,
            response_body: success_response(),
            provider_transaction_id: Some(data.payment_link_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PayOsConfig {
        PayOsConfig {
            client_id: "client".into(),
            api_key: "key".into(),
            checksum_key: "checksum-secret".into(),
        }
    }

    fn test_adapter() -> PayOsAdapter {
        PayOsAdapter::new(test_config(), "https://example.com/webhook/payos".into())
    }

    #[test]
    fn order_code_is_deterministic_for_same_tail() {
        let a = build_payos_order_code("TB-TSE24-20251008-A3B7K9M2");
        let b = build_payos_order_code("TB-TSE24-20251008-A3B7K9M2");
        assert_eq!(a, b);
    }

    #[test]
    fn order_code_uses_base36_of_last_five_chars() {
        let expected_tail = i64::from_str_radix("7K9M2", 36).unwrap() % 100_000_000;
        let encoded = build_payos_order_code("TB-TSE24-20251008-A3B7K9M2");
        assert_eq!(encoded % 100_000_000, expected_tail);
    }

    #[tokio::test]
    async fn callback_with_valid_signature_and_code_00_is_success() {
        let adapter = test_adapter();
        let data = serde_json::json!({ "orderCode": 12345678, "paymentLinkId": "pl_1" });
        let signature = hmac_sha256_hex(
            "checksum-secret",
            &sorted_field_string(&data).unwrap(),
        );
        let body = serde_json::json!({
            "code": "00",
            "desc": "success",
            "data": data,
            "signature": signature,
        });

        let outcome = adapter
            .handle_callback(body.to_string().as_bytes())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.provider_transaction_id.as_deref(), Some("pl_1"));
    }

    #[tokio::test]
    async fn callback_with_nonzero_code_is_failure_but_still_carries_pid() {
        let adapter = test_adapter();
        let data = serde_json::json!({ "orderCode": 12345678, "paymentLinkId": "pl_2" });
        let signature = hmac_sha256_hex(
            "checksum-secret",
            &sorted_field_string(&data).unwrap(),
        );
        let body = serde_json::json!({
            "code": "01",
            "desc": "failed",
            "data": data,
            "signature": signature,
        });

        let outcome = adapter
            .handle_callback(body.to_string().as_bytes())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.provider_transaction_id.as_deref(), Some("pl_2"));
    }

    #[tokio::test]
    async fn callback_with_wrong_signature_is_rejected_without_pid() {
        let adapter = test_adapter();
        let data = serde_json::json!({ "orderCode": 12345678, "paymentLinkId": "pl_3" });
        let body = serde_json::json!({
            "code": "00",
            "desc": "success",
            "data": data,
            "signature": "not-the-real-signature",
        });

        let outcome = adapter
            .handle_callback(body.to_string().as_bytes())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.provider_transaction_id, None);
    }
}
