//! ZaloPay provider adapter (spec §4.1).
//!
//! `app_trans_id = YYMMDD_<orderCode>`; the create-link MAC covers
//! `app_id|app_trans_id|app_user|amount|app_time|embed_data|item` keyed by
//! `key1`; the callback MAC covers the raw `data` string keyed by `key2`.
//! Both levels of the provider's wire shape are JSON (spec §9 "callback
//! decoding"): the outer envelope, and `data` itself, which is a
//! JSON-encoded string.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use std::time::Duration;

use crate::config::ZaloPayConfig;

use super::{AdapterError, CallbackOutcome, CreatePaymentLinkInput, PaymentLink, ProviderAdapter};

type HmacSha256 = Hmac<Sha256>;

const CREATE_ORDER_ENDPOINT: &str = "https://sb-openapi.zalopay.vn/v2/create";

/// Outer envelope of a ZaloPay webhook callback.
#[derive(Debug, Deserialize)]
struct ZaloPayCallbackEnvelope {
    data: String,
    mac: String,
    #[serde(rename = "type")]
    callback_type: i32,
}

/// Inner, JSON-encoded-as-a-string payload of a ZaloPay callback.
#[derive(Debug, Deserialize)]
struct ZaloPayCallbackData {
    app_trans_id: String,
}

#[derive(Debug, Serialize)]
struct ZaloPaySuccessResponse {
    return_code: i32,
    return_message: &'static str,
}

fn success_response() -> serde_json::Value {
    serde_json::to_value(ZaloPaySuccessResponse {
        return_code: 1,
        return_message: "Success",
    })
    .expect("static response always serializes")
}

fn failure_response(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "return_code": -1, "return_message": message.into() })
}

fn hmac_sha256_hex(key: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct ZaloPayCreateOrderResponse {
    return_code: i32,
    return_message: String,
    #[serde(default)]
    order_url: String,
}

#[derive(Debug)]
pub struct ZaloPayAdapter {
    config: ZaloPayConfig,
    http: reqwest::Client,
    webhook_url: String,
}

impl ZaloPayAdapter {
    pub fn new(config: ZaloPayConfig, webhook_url: String) -> Self {
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

    fn build_app_trans_id(&self, order_code: &str) -> String {
        let date = Utc::now().format("%y%m%d");
        format!("{date}_{order_code}")
    }

    fn build_create_mac(
        &self,
        app_trans_id: &str,
        app_user: &str,
        amount: i64,
        app_time: i64,
        embed_data: &str,
        item: &str,
    ) -> String {
        let raw = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.config.app_id, app_trans_id, app_user, amount, app_time, embed_data, item
        );
        hmac_sha256_hex(&self.config.key1, &raw)
    }
}

#[async_trait]
impl ProviderAdapter for ZaloPayAdapter {
    async fn create_payment_link(
        &self,
        input: CreatePaymentLinkInput,
    ) -> Result<PaymentLink, AdapterError> {
        let app_trans_id = self.build_app_trans_id(&input.order_code);
        let app_time = Utc::now().timestamp_millis();
        let embed_data = "{}";
        let item = "[]";
        let mac = self.build_create_mac(
            &app_trans_id,
            &input.idempotency_key,
            input.amount_cents,
            app_time,
            embed_data,
            item,
        );

        let request_body = serde_json::json!({
            "app_id": self.config.app_id,
            "app_trans_id": app_trans_id,
            "app_user": input.idempotency_key,
            "amount": input.amount_cents,
            "app_time": app_time,
            "embed_data": embed_data,
            "item": item,
            "callback_url": self.webhook_url,
            "redirect_url": input.redirect_url,
            "mac": mac,
        });

        let response = self
            .http
            .post(CREATE_ORDER_ENDPOINT)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AdapterError::ProviderUnavailable(e.to_string()))?
            .json::<ZaloPayCreateOrderResponse>()
            .await
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

        if response.return_code != 1 {
            return Err(AdapterError::ProviderRejected(response.return_message));
        }

        Ok(PaymentLink {
            payment_url: response.order_url,
            provider_transaction_id: app_trans_id,
        })
    }

    async fn handle_callback(&self, raw_body: &[u8]) -> Result<CallbackOutcome, AdapterError> {
        let envelope: ZaloPayCallbackEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

        if envelope.callback_type != 1 {
            return Ok(CallbackOutcome {
                success: false,
                response_body: failure_response("Invalid type"),
                provider_transaction_id: None,
            });
        }

        let expected_mac = hmac_sha256_hex(&self.config.key2, &envelope.data);
        if expected_mac != envelope.mac {
            return Ok(CallbackOutcome {
                success: false,
                response_body: failure_response("Invalid mac"),
                provider_transaction_id: None,
            });
        }

        let data: ZaloPayCallbackData = serde_json::from_str(&envelope.data)
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

        Ok(CallbackOutcome {
            success: true,
            response_body: success_response(),
            provider_transaction_id: Some(data.app_trans_id),
        })
    }
}
