//! Webhook Ingress (C6): decodes a provider callback, dispatches to the
//! matching adapter, resolves the provider transaction id to a payment,
//! and drives the lifecycle engine (spec §4.6).
//!
//! Global rule (spec §7): handlers always respond HTTP 200 with a
//! provider-shaped body; failure is carried in the body, never the status,
//! because both providers retry on non-2xx.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::adapters::{AdapterError, AdapterRegistry, ProviderAdapter};
use crate::domain::Provider;
use crate::lifecycle::Store;
use crate::rpc::AppState;

fn provider_from_path(tag: &str) -> Option<Provider> {
    match tag {
        "zalopay" => Some(Provider::Zalopay),
        "payos" => Some(Provider::Payos),
        "vnpay" => Some(Provider::Vnpay),
        _ => None,
    }
}

/// `POST /webhook/{provider}`. Always answers HTTP 200; see module docs.
pub async fn handle_webhook<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(provider_tag): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let provider = match provider_from_path(&provider_tag) {
        Some(provider) => provider,
        None => {
            let inferred = serde_json::from_slice(&body)
                .ok()
                .and_then(|value| AdapterRegistry::infer_provider(&value));
            let Some(provider) = inferred else {
                tracing::warn!(provider_tag, "webhook for unknown provider path");
                return Json(serde_json::json!({ "error": -1, "message": "unknown provider" }));
            };
            provider
        }
    };

    let adapter = state.adapters.get(provider);
    let outcome = match adapter.handle_callback(&body).await {
        Ok(outcome) => outcome,
        Err(AdapterError::MalformedPayload(message)) => {
            tracing::warn!(provider = ?provider, error = %message, "malformed webhook payload");
            return Json(serde_json::json!({ "error": -1, "message": message }));
        }
        Err(error) => {
            tracing::error!(provider = ?provider, error = %error, "webhook adapter error");
            return Json(serde_json::json!({ "error": -1, "message": error.to_string() }));
        }
    };

    let Some(provider_transaction_id) = outcome.provider_transaction_id.clone() else {
        // Couldn't even validate the callback; log and return the failure
        // response without touching state (spec §4.6).
        if !outcome.success {
            tracing::warn!(provider = ?provider, "webhook callback could not be validated");
        }
        return Json(outcome.response_body);
    };

    if outcome.success {
        if let Err(error) = state
            .lifecycle
            .complete_by_provider_tx_id(&provider_transaction_id)
            .await
        {
            tracing::error!(
                provider = ?provider,
                provider_transaction_id,
                error = %error,
                "failed to apply completion from webhook"
            );
        }
    } else if let Err(error) = state
        .lifecycle
        .fail_by_provider_tx_id(&provider_transaction_id)
        .await
    {
        tracing::error!(
            provider = ?provider,
            provider_transaction_id,
            error = %error,
            "failed to apply failure from webhook"
        );
    }

    Json(outcome.response_body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tags_map_to_expected_providers() {
        assert_eq!(provider_from_path("zalopay"), Some(Provider::Zalopay));
        assert_eq!(provider_from_path("payos"), Some(Provider::Payos));
        assert_eq!(provider_from_path("vnpay"), Some(Provider::Vnpay));
        assert_eq!(provider_from_path("unknown"), None);
    }
}
